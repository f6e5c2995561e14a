use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::utils::time_utils::{end_of_day, start_of_day};

// 重新導出子模塊
pub mod memory;
pub mod quote;

// 重新導出常用類型
pub use memory::InMemoryQuoteRepository;
pub use quote::{
    BatchWriteReport, PersistenceFailure, PgQuoteRepository, QuoteFilter, QuoteRepository, QuoteSort,
    QuoteSortField, SortOrder,
};

/// 分頁結果
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            data,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    pub fn empty(page: i64, page_size: i64) -> Self {
        Self::new(Vec::new(), 0, page, page_size)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

/// 查詢分頁參數
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: i64,
    pub page_size: i64,
}

impl PageQuery {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// skip = (page - 1) * page_size；溢位時回傳 None
    pub fn checked_offset(&self) -> Option<i64> {
        (self.page.max(1) - 1).checked_mul(self.page_size.max(0))
    }

    /// 同 checked_offset，溢位時取 i64::MAX（結果必為空頁）
    pub fn offset(&self) -> i64 {
        self.checked_offset().unwrap_or(i64::MAX)
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

/// 時間範圍查詢，任一端為 None 表示不設限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn bounded(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// 起日 00:00:00 至迄日 23:59:59.999；迄日超出可表示範圍時不設上限
    pub fn from_date_range(start: NaiveDate, end: NaiveDate) -> Self {
        Self::bounded(Some(start_of_day(start)), end_of_day(end))
    }

    /// 返回一個表示無限時間範圍的 TimeRange
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }

    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// 通用的數據庫操作特性
pub trait DbExecutor {
    fn get_pool(&self) -> &PgPool;
}
