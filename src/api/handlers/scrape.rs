use axum::extract::State;

use crate::api::{
    response::{ApiError, ApiResponse, ApiResult},
    state::AppState,
};
use crate::data_ingestion::{ScrapeReport, Trigger};

/// 執行一次抓取週期並等待結果
///
/// 週期在獨立任務中執行，客戶端中斷或請求逾時不會中止進行中的寫入。
pub async fn trigger_scrape(State(state): State<AppState>) -> ApiResult<ApiResponse<ScrapeReport>> {
    let cycle = state.cycle.clone();
    let report = tokio::spawn(async move { cycle.run(Trigger::Manual).await })
        .await
        .map_err(|e| ApiError::Internal(format!("抓取任務異常結束: {}", e)))??;
    let message = format!("Scraped {} stocks, stored {}", report.extracted, report.stored);
    Ok(ApiResponse::ok(report).with_message(message))
}
