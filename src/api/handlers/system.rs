use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::api::state::AppState;
use crate::storage::repository::QuoteRepository;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: i64,
    database: String,
    scrape_running: bool,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.query.repository().ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!("資料庫健康檢查失敗: {:#}", e);
            "unavailable".to_string()
        }
    };

    let health_response = HealthResponse {
        status: if database == "ok" { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        database,
        scrape_running: state.cycle.is_running(),
    };

    Json(health_response)
}
