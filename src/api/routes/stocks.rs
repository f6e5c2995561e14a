// src/api/routes/stocks.rs
use axum::{routing::get, Router};

use crate::api::{handlers::quotes, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stocks", get(quotes::list_stocks))
        .route("/stocks/latest", get(quotes::latest_stocks))
        .route("/stocks/summary", get(quotes::market_summary))
        .route("/stocks/search", get(quotes::search_stocks))
        .route("/stocks/{symbol}", get(quotes::stock_by_symbol))
        .route("/stocks/{symbol}/history", get(quotes::stock_history))
}
