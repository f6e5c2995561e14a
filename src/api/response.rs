use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, warn};

use crate::data_ingestion::ScrapeError;
use crate::domain_types::{FormattedQuote, QuoteValues};
use crate::query::QueryError;
use crate::storage::repository::Page;

/// 錯誤回應是否附帶完整錯誤鏈（正式環境關閉）
static EXPOSE_ERROR_DETAILS: AtomicBool = AtomicBool::new(true);

pub fn set_expose_error_details(expose: bool) {
    EXPOSE_ERROR_DETAILS.store(expose, Ordering::Relaxed);
}

fn expose_error_details() -> bool {
    EXPOSE_ERROR_DETAILS.load(Ordering::Relaxed)
}

/// 分頁資訊
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

/// 成功回應封套
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            count: None,
            pagination: None,
            message: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// 列表回應，附帶筆數
    pub fn list(data: Vec<T>) -> Self {
        let count = data.len();
        Self::ok(data).with_count(count)
    }

    /// 分頁回應
    pub fn paged<U>(page: Page<U>, f: impl FnMut(U) -> T) -> Self {
        let pagination = Pagination {
            page: page.page,
            limit: page.page_size,
            total: page.total,
            pages: page.total_pages,
        };
        let mut response = Self::list(page.data.into_iter().map(f).collect());
        response.pagination = Some(pagination);
        response
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 回應用的報價：原始欄位加上讀取時計算的漲跌幅與格式化字串
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView<Q> {
    #[serde(flatten)]
    pub quote: Q,
    pub change_percent: Decimal,
    pub formatted: FormattedQuote,
}

impl<Q: QuoteValues> QuoteView<Q> {
    pub fn new(quote: Q) -> Self {
        Self {
            change_percent: quote.change_percent(),
            formatted: FormattedQuote::of(&quote),
            quote,
        }
    }
}

/// API 錯誤
#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    Scrape(ScrapeError),
    NotFound(String),
    Internal(String),
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError::Query(e)
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        ApiError::Scrape(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<Vec<String>>,
}

fn error_chain(err: &(dyn StdError + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Query(QueryError::InvalidParameter { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Query(QueryError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scrape(ScrapeError::CycleInProgress) => StatusCode::CONFLICT,
            ApiError::Scrape(ScrapeError::SessionClosed) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Scrape(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (message, kind, parameter, stack) = match self {
            ApiError::Query(e) => {
                let parameter = match e {
                    QueryError::InvalidParameter { name, .. } => Some(*name),
                    QueryError::Storage(_) => None,
                };
                let stack = match e {
                    QueryError::Storage(inner) => inner.chain().map(ToString::to_string).collect(),
                    other => error_chain(other),
                };
                (e.to_string(), Some("QueryFailure"), parameter, stack)
            }
            ApiError::Scrape(e) => (e.to_string(), Some(e.kind()), None, error_chain(e)),
            ApiError::NotFound(message) => (message.clone(), None, None, Vec::new()),
            ApiError::Internal(message) => (message.clone(), Some("InternalError"), None, Vec::new()),
        };

        ErrorBody {
            success: false,
            error: message,
            kind,
            parameter,
            stack: (expose_error_details() && !stack.is_empty()).then_some(stack),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("請求失敗 ({}): {:?}", status, self);
        } else if status != StatusCode::NOT_FOUND {
            warn!("請求被拒絕 ({}): {:?}", status, self);
        }

        (status, Json(self.body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// 未定義路由
pub async fn route_not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::Scrape(ScrapeError::CycleInProgress), StatusCode::CONFLICT)]
    #[case(ApiError::Scrape(ScrapeError::navigation("https://a.example", "timeout")), StatusCode::BAD_GATEWAY)]
    #[case(
        ApiError::Scrape(ScrapeError::ExtractionEmpty { rows_seen: 1, malformed: 1, rejected: 0 }),
        StatusCode::BAD_GATEWAY
    )]
    #[case(
        ApiError::Query(QueryError::InvalidParameter { name: "limit", reason: "x".to_string() }),
        StatusCode::BAD_REQUEST
    )]
    #[case(ApiError::Query(QueryError::Storage(anyhow::anyhow!("db down"))), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ApiError::NotFound("Route not found".to_string()), StatusCode::NOT_FOUND)]
    #[case(ApiError::Internal("task panicked".to_string()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] error: ApiError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
    }

    #[test]
    fn test_error_body_fields() {
        let error = ApiError::Query(QueryError::InvalidParameter {
            name: "page",
            reason: "必須大於等於 1".to_string(),
        });
        let body = serde_json::to_value(error.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "QueryFailure");
        assert_eq!(body["parameter"], "page");
    }

    #[test]
    fn test_paged_response_shape() {
        let page = Page::new(vec![1, 2, 3], 23, 1, 3);
        let response = ApiResponse::paged(page, |n: i32| n * 10);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], serde_json::json!([10, 20, 30]));
        assert_eq!(json["count"], 3);
        assert_eq!(json["pagination"]["total"], 23);
        assert_eq!(json["pagination"]["pages"], 8);
        assert!(json.get("message").is_none());
    }
}
