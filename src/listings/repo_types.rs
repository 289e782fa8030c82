use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::images::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub regular_price: i64,
    pub discount_price: Option<i64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub offer: bool,
    pub parking: bool,
    pub furnished: bool,
    pub sell: bool,
    pub rent: bool,
    pub images: Vec<ImageRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Listing row as stored; images live in a JSONB column.
#[derive(Debug, FromRow)]
pub struct ListingRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub address: String,
    pub regular_price: i64,
    pub discount_price: Option<i64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub offer: bool,
    pub parking: bool,
    pub furnished: bool,
    pub sell: bool,
    pub rent: bool,
    pub images: Json<Vec<ImageRef>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<ListingRow> for Listing {
    fn from(r: ListingRow) -> Self {
        Self {
            id: r.id,
            owner_id: r.owner_id,
            title: r.title,
            description: r.description,
            address: r.address,
            regular_price: r.regular_price,
            discount_price: r.discount_price,
            bedrooms: r.bedrooms,
            bathrooms: r.bathrooms,
            offer: r.offer,
            parking: r.parking,
            furnished: r.furnished,
            sell: r.sell,
            rent: r.rent,
            images: r.images.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListingFilter {
    pub owner: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}
