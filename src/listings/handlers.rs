use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::get,
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    extract::{Json, Path, Query},
    images::FormData,
    listings::{
        dto::{ListingQuery, UpdateListingRequest},
        repo_types::{Listing, ListingFilter},
        services::{self, ListingDraft},
    },
    response::{ok, ApiResponse},
    state::AppState,
};

type JsonResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/properties", get(list_listings).post(create_listing))
        .route(
            "/properties/:id",
            get(get_listing).patch(update_listing).delete(delete_listing),
        )
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

/// POST /properties (multipart): text fields plus `property` files.
#[instrument(skip(state, who, form))]
pub async fn create_listing(
    State(state): State<AppState>,
    who: AuthUser,
    mut form: FormData,
) -> Result<(StatusCode, Json<ApiResponse<Listing>>), AppError> {
    let draft = ListingDraft::from_form(&form.fields)?;
    let files = form.take_files("property");
    let listing = services::create_listing(&state, who.id, draft, files).await?;
    Ok((StatusCode::CREATED, ok(listing)))
}

#[instrument(skip(state))]
pub async fn list_listings(
    State(state): State<AppState>,
    Query(q): Query<ListingQuery>,
) -> JsonResult<Vec<Listing>> {
    let (limit, offset) = q.clamped();
    let listings = services::list_listings(
        &state,
        ListingFilter {
            owner: q.owner,
            limit,
            offset,
        },
    )
    .await?;
    Ok(ok(listings))
}

#[instrument(skip(state))]
pub async fn get_listing(State(state): State<AppState>, Path(id): Path<Uuid>) -> JsonResult<Listing> {
    Ok(ok(services::get_listing(&state, id).await?))
}

#[instrument(skip(state, who, payload))]
pub async fn update_listing(
    State(state): State<AppState>,
    who: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateListingRequest>,
) -> JsonResult<Listing> {
    Ok(ok(services::update_listing(&state, who.id, id, payload).await?))
}

#[instrument(skip(state, who))]
pub async fn delete_listing(
    State(state): State<AppState>,
    who: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_listing(&state, who.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
