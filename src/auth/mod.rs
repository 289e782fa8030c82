use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
mod handlers;
pub mod jwt;
pub mod notifier;
pub mod password;
pub mod reset;
pub mod services;

pub use extractors::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
