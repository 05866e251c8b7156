//! Route definitions for the HTTP API.

pub mod auth;
pub mod events;
pub mod health;
pub mod notebooks;
pub mod sharing;
pub mod tags;

use axum::Router;

use crate::state::AppState;

/// Build the complete router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(notebooks::routes())
        .merge(sharing::routes())
        .merge(tags::routes())
        .merge(events::routes())
        .with_state(state)
}
