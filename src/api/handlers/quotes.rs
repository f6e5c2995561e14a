use axum::extract::{Path, Query, State};

use crate::api::{
    response::{ApiError, ApiResponse, ApiResult, QuoteView},
    state::AppState,
};
use crate::domain_types::MarketSummary;
use crate::query::{HistoryRequest, LatestRequest, ListRequest, SearchRequest, SummaryRequest};
use crate::storage::models::{QuoteHistoryPoint, StoredQuote};

type QuoteList = ApiResponse<Vec<QuoteView<StoredQuote>>>;

pub async fn list_stocks(State(state): State<AppState>, Query(request): Query<ListRequest>) -> ApiResult<QuoteList> {
    let page = state.query.list_filtered(&request).await?;
    Ok(ApiResponse::paged(page, QuoteView::new))
}

pub async fn latest_stocks(State(state): State<AppState>, Query(request): Query<LatestRequest>) -> ApiResult<QuoteList> {
    let quotes = state.query.latest(&request).await?;
    Ok(ApiResponse::list(quotes.into_iter().map(QuoteView::new).collect()))
}

pub async fn market_summary(
    State(state): State<AppState>,
    Query(request): Query<SummaryRequest>,
) -> ApiResult<ApiResponse<MarketSummary>> {
    let summary = state.query.summary(&request).await?;
    Ok(ApiResponse::ok(summary))
}

pub async fn search_stocks(State(state): State<AppState>, Query(request): Query<SearchRequest>) -> ApiResult<QuoteList> {
    let quotes = state.query.search(&request).await?;
    Ok(ApiResponse::list(quotes.into_iter().map(QuoteView::new).collect()))
}

pub async fn stock_by_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResult<ApiResponse<QuoteView<StoredQuote>>> {
    let quote = state
        .query
        .by_symbol(&symbol)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Stock {} not found", symbol)))?;
    Ok(ApiResponse::ok(QuoteView::new(quote)))
}

pub async fn stock_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(request): Query<HistoryRequest>,
) -> ApiResult<ApiResponse<Vec<QuoteView<QuoteHistoryPoint>>>> {
    let points = state.query.history(&symbol, &request).await?;
    Ok(ApiResponse::list(points.into_iter().map(QuoteView::new).collect()))
}
