use crate::state::AppState;
use axum::Router;

mod dto;
pub mod generator;
pub mod handlers;
pub mod repo;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::image_routes()
}
