//! 報價查詢與彙總
//!
//! 查詢參數以字串接收，在此統一驗證，錯誤回傳 InvalidParameter 而不是交給框架拒絕。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::data_ingestion::normalizer::clean_symbol;
use crate::domain_types::MarketSummary;
use crate::storage::models::{QuoteHistoryPoint, StoredQuote};
use crate::storage::repository::{Page, PageQuery, QuoteFilter, QuoteRepository, QuoteSort, TimeRange};
use crate::utils::time_utils::{parse_date_param, DateBound};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;
pub const DEFAULT_LATEST_LIMIT: i64 = 100;
pub const MAX_LATEST_LIMIT: i64 = 500;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const MAX_SEARCH_LIMIT: i64 = 100;
pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 365;
pub const DEFAULT_SUMMARY_WINDOW: i64 = 200;
pub const MAX_SUMMARY_WINDOW: i64 = 10_000;

/// 查詢錯誤
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("無效的參數 {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl QueryError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 正整數參數；未提供時用預設值，超過上限時截到上限
fn parse_count(name: &'static str, raw: &Option<String>, default: i64, max: i64) -> QueryResult<i64> {
    let Some(raw) = non_empty(raw) else {
        return Ok(default);
    };
    let value: i64 = raw
        .parse()
        .map_err(|_| QueryError::invalid(name, format!("不是整數: {}", raw)))?;
    if value < 1 {
        return Err(QueryError::invalid(name, "必須大於等於 1"));
    }
    Ok(value.min(max))
}

fn parse_decimal(name: &'static str, raw: &Option<String>) -> QueryResult<Option<Decimal>> {
    non_empty(raw)
        .map(|v| Decimal::from_str(v).map_err(|_| QueryError::invalid(name, format!("不是數字: {}", v))))
        .transpose()
}

fn parse_date(name: &'static str, raw: &Option<String>, bound: DateBound) -> QueryResult<Option<DateTime<Utc>>> {
    non_empty(raw)
        .map(|v| parse_date_param(v, bound).map_err(|reason| QueryError::invalid(name, reason)))
        .transpose()
}

fn parse_range(start: &Option<String>, end: &Option<String>) -> QueryResult<TimeRange> {
    let range = TimeRange::bounded(
        parse_date("startDate", start, DateBound::Start)?,
        parse_date("endDate", end, DateBound::End)?,
    );
    if !range.is_valid() {
        return Err(QueryError::invalid("startDate", "不可晚於 endDate"));
    }
    Ok(range)
}

fn parse_symbol(raw: &str) -> QueryResult<String> {
    let symbol = clean_symbol(raw);
    if symbol.is_empty() {
        return Err(QueryError::invalid("symbol", "不可為空"));
    }
    Ok(symbol)
}

/// 列表查詢參數
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub symbol: Option<String>,
    pub security_name: Option<String>,
    pub min_close: Option<String>,
    pub max_close: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// 驗證後的列表查詢
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: QuoteFilter,
    pub sort: QuoteSort,
    pub page: PageQuery,
}

impl ListRequest {
    pub fn parse(&self) -> QueryResult<ListQuery> {
        let min_close = parse_decimal("minClose", &self.min_close)?;
        let max_close = parse_decimal("maxClose", &self.max_close)?;
        if let (Some(min), Some(max)) = (min_close, max_close) {
            if min > max {
                return Err(QueryError::invalid("minClose", "不可大於 maxClose"));
            }
        }

        let filter = QuoteFilter {
            symbol: non_empty(&self.symbol).map(str::to_string),
            security_name: non_empty(&self.security_name).map(str::to_string),
            min_close,
            max_close,
            scraped: parse_range(&self.start_date, &self.end_date)?,
        };

        let page = PageQuery::new(
            parse_count("page", &self.page, 1, i64::MAX)?,
            parse_count("limit", &self.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?,
        );
        if page.checked_offset().is_none() {
            return Err(QueryError::invalid("page", format!("頁碼過大: {}", page.page)));
        }

        Ok(ListQuery {
            filter,
            sort: QuoteSort::from_params(non_empty(&self.sort_by), non_empty(&self.sort_order)),
            page,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestRequest {
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    /// 彙總的記錄筆數
    pub window: Option<String>,
    /// 只計入此時間（含）之前的記錄
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub q: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
}

/// 查詢服務；只讀，可與寫入同時進行
#[derive(Clone)]
pub struct QuoteQueryService {
    repository: Arc<dyn QuoteRepository>,
    summary_window: i64,
}

impl QuoteQueryService {
    pub fn new(repository: Arc<dyn QuoteRepository>) -> Self {
        Self {
            repository,
            summary_window: DEFAULT_SUMMARY_WINDOW,
        }
    }

    pub fn with_summary_window(mut self, window: i64) -> Self {
        self.summary_window = window.clamp(1, MAX_SUMMARY_WINDOW);
        self
    }

    pub fn repository(&self) -> &Arc<dyn QuoteRepository> {
        &self.repository
    }

    /// 篩選、排序、分頁
    pub async fn list_filtered(&self, request: &ListRequest) -> QueryResult<Page<StoredQuote>> {
        let query = request.parse()?;
        debug!(?query, "列表查詢");
        Ok(self.repository.list(&query.filter, query.sort, query.page).await?)
    }

    /// 每個代碼最新的一筆
    pub async fn latest(&self, request: &LatestRequest) -> QueryResult<Vec<StoredQuote>> {
        let limit = parse_count("limit", &request.limit, DEFAULT_LATEST_LIMIT, MAX_LATEST_LIMIT)?;
        Ok(self.repository.latest_per_symbol(limit).await?)
    }

    /// 最近 N 筆記錄的市場概要（不依代碼去重）
    pub async fn summary(&self, request: &SummaryRequest) -> QueryResult<MarketSummary> {
        let window = parse_count("window", &request.window, self.summary_window, MAX_SUMMARY_WINDOW)?;
        let as_of = parse_date("asOf", &request.as_of, DateBound::End)?;
        let recent = self.repository.recent(window, as_of).await?;
        Ok(MarketSummary::from_quotes(&recent))
    }

    /// 代碼的最新一筆；不存在時回傳 None
    pub async fn by_symbol(&self, symbol: &str) -> QueryResult<Option<StoredQuote>> {
        let symbol = parse_symbol(symbol)?;
        Ok(self.repository.latest_for_symbol(&symbol).await?)
    }

    /// 代碼的歷史，由新到舊
    pub async fn history(&self, symbol: &str, request: &HistoryRequest) -> QueryResult<Vec<QuoteHistoryPoint>> {
        let symbol = parse_symbol(symbol)?;
        let range = parse_range(&request.start_date, &request.end_date)?;
        let limit = parse_count("limit", &request.limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)?;

        let rows = self.repository.history(&symbol, range, limit).await?;
        Ok(rows.into_iter().map(QuoteHistoryPoint::from).collect())
    }

    /// 代碼或名稱的子字串搜尋
    pub async fn search(&self, request: &SearchRequest) -> QueryResult<Vec<StoredQuote>> {
        let term = non_empty(&request.q).ok_or_else(|| QueryError::invalid("q", "搜尋字串不可為空"))?;
        let limit = parse_count("limit", &request.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT)?;
        Ok(self.repository.search(term, limit).await?)
    }
}
