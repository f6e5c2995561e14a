use std::time::Duration;
use thiserror::Error;

/// 抓取週期錯誤
///
/// 「表格出現但沒有有效列」與「抓取失敗」是不同的結果，呼叫端可依變體區分。
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("無法載入頁面 {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("等待表格逾時: {url} 在 {waited:?} 內只出現 {rows} 列")]
    ExtractionTimeout {
        url: String,
        rows: usize,
        waited: Duration,
    },

    #[error("表格已載入但沒有有效報價: 共 {rows_seen} 列，{malformed} 列格式不符，{rejected} 列被過濾")]
    ExtractionEmpty {
        rows_seen: usize,
        malformed: usize,
        rejected: usize,
    },

    #[error("已有抓取週期正在執行")]
    CycleInProgress,

    #[error("抓取工作階段已關閉")]
    SessionClosed,
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        ScrapeError::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// 錯誤種類名稱，用於回應與日誌
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::Navigation { .. } => "NavigationFailure",
            ScrapeError::ExtractionTimeout { .. } => "ExtractionTimeout",
            ScrapeError::ExtractionEmpty { .. } => "ExtractionEmpty",
            ScrapeError::CycleInProgress => "CycleInProgress",
            ScrapeError::SessionClosed => "SessionClosed",
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
