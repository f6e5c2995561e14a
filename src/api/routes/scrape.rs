// src/api/routes/scrape.rs
use axum::{routing::post, Router};

use crate::api::{handlers::scrape, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/scrape", post(scrape::trigger_scrape))
}
