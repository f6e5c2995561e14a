use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::data_ingestion::ScrapeCycle;
use crate::query::QuoteQueryService;

/// 處理器共用狀態
#[derive(Clone)]
pub struct AppState {
    pub query: QuoteQueryService,
    pub cycle: Arc<ScrapeCycle>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(query: QuoteQueryService, cycle: Arc<ScrapeCycle>) -> Self {
        Self {
            query,
            cycle,
            started_at: Utc::now(),
        }
    }
}
