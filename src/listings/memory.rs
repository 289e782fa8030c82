use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    listings::{
        repo::ListingRepo,
        repo_types::{Listing, ListingFilter},
    },
};

#[derive(Default)]
pub struct MemoryListingRepo {
    listings: Mutex<HashMap<Uuid, Listing>>,
}

#[async_trait]
impl ListingRepo for MemoryListingRepo {
    async fn insert(&self, listing: &Listing) -> Result<Listing, AppError> {
        self.listings
            .lock()
            .await
            .insert(listing.id, listing.clone());
        Ok(listing.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Listing>, AppError> {
        Ok(self.listings.lock().await.get(&id).cloned())
    }

    async fn list(&self, filter: ListingFilter) -> Result<Vec<Listing>, AppError> {
        let mut all: Vec<Listing> = self
            .listings
            .lock()
            .await
            .values()
            .filter(|l| filter.owner.map_or(true, |o| l.owner_id == o))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update(&self, listing: &Listing) -> Result<Listing, AppError> {
        let mut listings = self.listings.lock().await;
        if !listings.contains_key(&listing.id) {
            return Err(AppError::NotFound("Listing"));
        }
        let mut stored = listing.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        listings.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.listings.lock().await.remove(&id).is_some())
    }
}
