use serde::{Deserialize, Deserializer};
use uuid::Uuid;

const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub owner: Option<Uuid>,
}

fn default_limit() -> i64 {
    20
}

impl ListingQuery {
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_LIMIT), self.offset.max(0))
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub regular_price: Option<i64>,
    /// `null` clears the discount; an absent field keeps it.
    #[serde(default, deserialize_with = "present")]
    pub discount_price: Option<Option<i64>>,
    #[serde(alias = "beds")]
    pub bedrooms: Option<i32>,
    #[serde(alias = "baths")]
    pub bathrooms: Option<i32>,
    pub offer: Option<bool>,
    pub parking: Option<bool>,
    pub furnished: Option<bool>,
    pub sell: Option<bool>,
    pub rent: Option<bool>,
}

fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
