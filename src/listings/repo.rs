use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    error::AppError,
    listings::repo_types::{Listing, ListingFilter, ListingRow},
};

#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn insert(&self, listing: &Listing) -> Result<Listing, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Listing>, AppError>;
    /// Newest first.
    async fn list(&self, filter: ListingFilter) -> Result<Vec<Listing>, AppError>;
    async fn update(&self, listing: &Listing) -> Result<Listing, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PgListingRepo {
    db: PgPool,
}

impl PgListingRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingRepo for PgListingRepo {
    async fn insert(&self, l: &Listing) -> Result<Listing, AppError> {
        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            INSERT INTO listings (id, owner_id, title, description, address, regular_price,
                                  discount_price, bedrooms, bathrooms, offer, parking, furnished,
                                  sell, rent, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, owner_id, title, description, address, regular_price, discount_price,
                      bedrooms, bathrooms, offer, parking, furnished, sell, rent, images,
                      created_at, updated_at
            "#,
        )
        .bind(l.id)
        .bind(l.owner_id)
        .bind(&l.title)
        .bind(&l.description)
        .bind(&l.address)
        .bind(l.regular_price)
        .bind(l.discount_price)
        .bind(l.bedrooms)
        .bind(l.bathrooms)
        .bind(l.offer)
        .bind(l.parking)
        .bind(l.furnished)
        .bind(l.sell)
        .bind(l.rent)
        .bind(Json(&l.images))
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Listing>, AppError> {
        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, owner_id, title, description, address, regular_price, discount_price,
                   bedrooms, bathrooms, offer, parking, furnished, sell, rent, images,
                   created_at, updated_at
              FROM listings
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Listing::from))
    }

    async fn list(&self, filter: ListingFilter) -> Result<Vec<Listing>, AppError> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, owner_id, title, description, address, regular_price, discount_price,
                   bedrooms, bathrooms, offer, parking, furnished, sell, rent, images,
                   created_at, updated_at
              FROM listings
             WHERE ($1::uuid IS NULL OR owner_id = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.owner)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn update(&self, l: &Listing) -> Result<Listing, AppError> {
        sqlx::query_as::<_, ListingRow>(
            r#"
            UPDATE listings
               SET title = $2,
                   description = $3,
                   address = $4,
                   regular_price = $5,
                   discount_price = $6,
                   bedrooms = $7,
                   bathrooms = $8,
                   offer = $9,
                   parking = $10,
                   furnished = $11,
                   sell = $12,
                   rent = $13,
                   images = $14,
                   updated_at = now()
             WHERE id = $1
            RETURNING id, owner_id, title, description, address, regular_price, discount_price,
                      bedrooms, bathrooms, offer, parking, furnished, sell, rent, images,
                      created_at, updated_at
            "#,
        )
        .bind(l.id)
        .bind(&l.title)
        .bind(&l.description)
        .bind(&l.address)
        .bind(l.regular_price)
        .bind(l.discount_price)
        .bind(l.bedrooms)
        .bind(l.bathrooms)
        .bind(l.offer)
        .bind(l.parking)
        .bind(l.furnished)
        .bind(l.sell)
        .bind(l.rent)
        .bind(Json(&l.images))
        .fetch_optional(&self.db)
        .await?
        .map(Listing::from)
        .ok_or(AppError::NotFound("Listing"))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
