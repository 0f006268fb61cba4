use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod logger;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::activity_routes()
}
