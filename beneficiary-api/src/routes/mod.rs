//! API route definitions

mod health;
mod resolve;

use axum::Router;
use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(resolve::routes())
        .merge(health::routes())
}
