use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    error::AppError,
    images::{delete_images, upload_images, UploadItem},
    listings::{
        dto::UpdateListingRequest,
        repo_types::{Listing, ListingFilter},
    },
    state::AppState,
    users::Role,
};

const MAX_IMAGES: usize = 2;
const TITLE_LEN: std::ops::RangeInclusive<usize> = 10..=62;
const ROOMS: std::ops::RangeInclusive<i32> = 1..=10;
const REGULAR_PRICE: std::ops::RangeInclusive<i64> = 50..=10_000_000;
const DISCOUNT_PRICE: std::ops::RangeInclusive<i64> = 0..=10_000_000;

/// Listing attributes as submitted, before images and ids are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDraft {
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
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, AppError> {
    fields
        .get(name)
        .map(|s| s.trim())
        .ok_or_else(|| AppError::validation(format!("{name} is required")))
}

fn number<T: std::str::FromStr>(fields: &HashMap<String, String>, name: &str) -> Result<T, AppError> {
    required(fields, name)?
        .parse()
        .map_err(|_| AppError::validation(format!("{name} must be a number")))
}

/// Checkboxes arrive as "true"/"on"/"1"; a missing field is false.
fn flag(fields: &HashMap<String, String>, name: &str) -> bool {
    fields
        .get(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1"))
        .unwrap_or(false)
}

impl ListingDraft {
    /// Reads the multipart text fields of the create form.
    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self, AppError> {
        let discount_price = match fields.get("discountPrice").map(|s| s.trim()) {
            None | Some("") => None,
            Some(_) => Some(number(fields, "discountPrice")?),
        };
        Ok(Self {
            title: required(fields, "title")?.to_string(),
            description: required(fields, "description")?.to_string(),
            address: required(fields, "address")?.to_string(),
            regular_price: number(fields, "regularPrice")?,
            discount_price,
            bedrooms: number(fields, "beds")?,
            bathrooms: number(fields, "baths")?,
            offer: flag(fields, "offer"),
            parking: flag(fields, "parking"),
            furnished: flag(fields, "furnished"),
            sell: flag(fields, "sell"),
            rent: flag(fields, "rent"),
        })
    }

    fn from_listing(l: &Listing) -> Self {
        Self {
            title: l.title.clone(),
            description: l.description.clone(),
            address: l.address.clone(),
            regular_price: l.regular_price,
            discount_price: l.discount_price,
            bedrooms: l.bedrooms,
            bathrooms: l.bathrooms,
            offer: l.offer,
            parking: l.parking,
            furnished: l.furnished,
            sell: l.sell,
            rent: l.rent,
        }
    }

    fn merge(&mut self, patch: UpdateListingRequest) {
        if let Some(v) = patch.title {
            self.title = v.trim().to_string();
        }
        if let Some(v) = patch.description {
            self.description = v.trim().to_string();
        }
        if let Some(v) = patch.address {
            self.address = v.trim().to_string();
        }
        if let Some(v) = patch.regular_price {
            self.regular_price = v;
        }
        if let Some(v) = patch.discount_price {
            self.discount_price = v;
        }
        if let Some(v) = patch.bedrooms {
            self.bedrooms = v;
        }
        if let Some(v) = patch.bathrooms {
            self.bathrooms = v;
        }
        if let Some(v) = patch.offer {
            self.offer = v;
        }
        if let Some(v) = patch.parking {
            self.parking = v;
        }
        if let Some(v) = patch.furnished {
            self.furnished = v;
        }
        if let Some(v) = patch.sell {
            self.sell = v;
        }
        if let Some(v) = patch.rent {
            self.rent = v;
        }
    }

    /// Checks the form rules. A discount is only kept while `offer` is set.
    pub fn validate(mut self) -> Result<Self, AppError> {
        if !TITLE_LEN.contains(&self.title.chars().count()) {
            return Err(AppError::validation(
                "Title must be between 10 and 62 characters",
            ));
        }
        if self.description.is_empty() {
            return Err(AppError::validation("Description is required"));
        }
        if self.address.is_empty() {
            return Err(AppError::validation("Address is required"));
        }
        if !ROOMS.contains(&self.bedrooms) || !ROOMS.contains(&self.bathrooms) {
            return Err(AppError::validation(
                "Beds and baths must be between 1 and 10",
            ));
        }
        if !REGULAR_PRICE.contains(&self.regular_price) {
            return Err(AppError::validation(
                "Regular price must be between 50 and 10000000",
            ));
        }
        if !self.offer {
            self.discount_price = None;
        }
        if let Some(discount) = self.discount_price {
            if !DISCOUNT_PRICE.contains(&discount) {
                return Err(AppError::validation(
                    "Discount price must be between 0 and 10000000",
                ));
            }
            if discount > self.regular_price {
                return Err(AppError::validation(
                    "Discount price must be lower than regular price",
                ));
            }
        }
        Ok(self)
    }

    fn apply(self, l: &mut Listing) {
        l.title = self.title;
        l.description = self.description;
        l.address = self.address;
        l.regular_price = self.regular_price;
        l.discount_price = self.discount_price;
        l.bedrooms = self.bedrooms;
        l.bathrooms = self.bathrooms;
        l.offer = self.offer;
        l.parking = self.parking;
        l.furnished = self.furnished;
        l.sell = self.sell;
        l.rent = self.rent;
    }
}

pub fn check_image_count(n: usize) -> Result<(), AppError> {
    match n {
        0 => Err(AppError::validation("You must upload at least one image")),
        n if n > MAX_IMAGES => Err(AppError::validation("You can only upload up to 2 images")),
        _ => Ok(()),
    }
}

/// Validates, uploads the images, then inserts. A failed insert removes
/// the uploaded objects again.
#[instrument(skip(state, draft, files))]
pub async fn create_listing(
    state: &AppState,
    owner_id: Uuid,
    draft: ListingDraft,
    files: Vec<UploadItem>,
) -> Result<Listing, AppError> {
    let draft = draft.validate()?;
    check_image_count(files.len())?;

    let images = upload_images(state.storage.as_ref(), "listings", owner_id, files).await?;
    let now = OffsetDateTime::now_utc();
    let mut listing = Listing {
        id: Uuid::new_v4(),
        owner_id,
        title: String::new(),
        description: String::new(),
        address: String::new(),
        regular_price: 0,
        discount_price: None,
        bedrooms: 0,
        bathrooms: 0,
        offer: false,
        parking: false,
        furnished: false,
        sell: false,
        rent: false,
        images,
        created_at: now,
        updated_at: now,
    };
    draft.apply(&mut listing);

    match state.listings.insert(&listing).await {
        Ok(saved) => {
            info!(listing_id = %saved.id, %owner_id, "listing created");
            Ok(saved)
        }
        Err(e) => {
            delete_images(state.storage.as_ref(), &listing.images).await;
            Err(e)
        }
    }
}

pub async fn get_listing(state: &AppState, id: Uuid) -> Result<Listing, AppError> {
    state
        .listings
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Listing"))
}

pub async fn list_listings(state: &AppState, filter: ListingFilter) -> Result<Vec<Listing>, AppError> {
    state.listings.list(filter).await
}

/// Loads the listing and checks that `user_id` owns it or is an admin.
async fn load_for_write(state: &AppState, user_id: Uuid, id: Uuid) -> Result<Listing, AppError> {
    let listing = get_listing(state, id).await?;
    if listing.owner_id != user_id {
        let user = state.auth.users().get(user_id).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden);
        }
    }
    Ok(listing)
}

#[instrument(skip(state, patch))]
pub async fn update_listing(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    patch: UpdateListingRequest,
) -> Result<Listing, AppError> {
    let mut listing = load_for_write(state, user_id, id).await?;
    let mut draft = ListingDraft::from_listing(&listing);
    draft.merge(patch);
    draft.validate()?.apply(&mut listing);
    state.listings.update(&listing).await
}

#[instrument(skip(state))]
pub async fn delete_listing(state: &AppState, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let listing = load_for_write(state, user_id, id).await?;
    if !state.listings.delete(id).await? {
        return Err(AppError::NotFound("Listing"));
    }
    delete_images(state.storage.as_ref(), &listing.images).await;
    info!(listing_id = %id, %user_id, "listing deleted");
    Ok(())
}
