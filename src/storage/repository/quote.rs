use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};

use crate::storage::{
    models::quote::{QuoteInsert, StoredQuote},
    repository::{DbExecutor, Page, PageQuery, TimeRange},
};

const QUOTE_COLUMNS: &str = "id, symbol, security_name, open, high, low, close, change, \
                             daily_volume, daily_value, scraped_at, bucket_start, created_at, updated_at";

/// 單筆寫入失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceFailure {
    pub symbol: String,
    pub error: String,
}

/// 批次寫入結果：失敗的記錄不影響其他記錄
#[derive(Debug, Clone, Default)]
pub struct BatchWriteReport {
    pub stored: Vec<StoredQuote>,
    pub failures: Vec<PersistenceFailure>,
}

impl BatchWriteReport {
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 列表篩選條件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteFilter {
    /// 代碼子字串（不分大小寫）
    pub symbol: Option<String>,
    /// 名稱子字串（不分大小寫）
    pub security_name: Option<String>,
    pub min_close: Option<Decimal>,
    pub max_close: Option<Decimal>,
    pub scraped: TimeRange,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl QuoteFilter {
    pub fn matches(&self, quote: &StoredQuote) -> bool {
        self.symbol
            .as_deref()
            .map_or(true, |s| contains_ignore_case(&quote.symbol, s))
            && self
                .security_name
                .as_deref()
                .map_or(true, |s| contains_ignore_case(&quote.security_name, s))
            && self.min_close.map_or(true, |min| quote.close >= min)
            && self.max_close.map_or(true, |max| quote.close <= max)
            && self.scraped.contains(quote.scraped_at)
    }
}

/// 可排序欄位（白名單）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteSortField {
    #[default]
    Symbol,
    SecurityName,
    Open,
    High,
    Low,
    Close,
    Change,
    DailyVolume,
    DailyValue,
    ScrapedAt,
}

impl QuoteSortField {
    /// 查詢參數名稱（camelCase 或 snake_case）
    pub fn from_param(value: &str) -> Option<Self> {
        let field = match value.trim() {
            "symbol" => Self::Symbol,
            "securityName" | "security_name" => Self::SecurityName,
            "open" => Self::Open,
            "high" => Self::High,
            "low" => Self::Low,
            "close" => Self::Close,
            "change" => Self::Change,
            "dailyVolume" | "daily_volume" => Self::DailyVolume,
            "dailyValue" | "daily_value" => Self::DailyValue,
            "scrapedAt" | "scraped_at" => Self::ScrapedAt,
            _ => return None,
        };
        Some(field)
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::SecurityName => "security_name",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Change => "change",
            Self::DailyVolume => "daily_volume",
            Self::DailyValue => "daily_value",
            Self::ScrapedAt => "scraped_at",
        }
    }

    fn compare(&self, a: &StoredQuote, b: &StoredQuote) -> Ordering {
        match self {
            Self::Symbol => a.symbol.cmp(&b.symbol),
            Self::SecurityName => a.security_name.cmp(&b.security_name),
            Self::Open => a.open.cmp(&b.open),
            Self::High => a.high.cmp(&b.high),
            Self::Low => a.low.cmp(&b.low),
            Self::Close => a.close.cmp(&b.close),
            Self::Change => a.change.cmp(&b.change),
            Self::DailyVolume => a.daily_volume.cmp(&b.daily_volume),
            Self::DailyValue => a.daily_value.cmp(&b.daily_value),
            Self::ScrapedAt => a.scraped_at.cmp(&b.scraped_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_param(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// 排序設定；同值時以 id 同方向排序，使分頁結果穩定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuoteSort {
    pub field: QuoteSortField,
    pub order: SortOrder,
}

impl QuoteSort {
    pub fn new(field: QuoteSortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// 未知欄位退回代碼遞增
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        let Some(field) = sort_by.map_or(Some(QuoteSortField::Symbol), QuoteSortField::from_param) else {
            return Self::default();
        };
        let order = sort_order.and_then(SortOrder::from_param).unwrap_or_default();
        Self { field, order }
    }

    pub fn compare(&self, a: &StoredQuote, b: &StoredQuote) -> Ordering {
        let ordering = self.field.compare(a, b).then_with(|| a.id.cmp(&b.id));
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }

    fn order_by_clause(&self) -> String {
        let direction = self.order.keyword();
        format!(" ORDER BY {} {}, id {}", self.field.column(), direction, direction)
    }
}

/// 報價存取接口
#[async_trait::async_trait]
pub trait QuoteRepository: Send + Sync {
    /// 依 (symbol, bucket_start) 寫入或覆寫
    async fn upsert(&self, quote: &QuoteInsert) -> Result<StoredQuote>;

    /// 逐筆寫入；單筆失敗記錄下來後繼續
    async fn upsert_all(&self, quotes: &[QuoteInsert]) -> BatchWriteReport {
        let mut report = BatchWriteReport::default();

        for quote in quotes {
            let result = match quote.validate() {
                Ok(()) => self.upsert(quote).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(stored) => report.stored.push(stored),
                Err(e) => {
                    warn!("寫入 {} 失敗: {:#}", quote.symbol, e);
                    report.failures.push(PersistenceFailure {
                        symbol: quote.symbol.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        report
    }

    /// 篩選、排序、分頁；total 為符合條件的總數
    async fn list(&self, filter: &QuoteFilter, sort: QuoteSort, page: PageQuery) -> Result<Page<StoredQuote>>;

    /// 每個代碼最新的一筆，依代碼遞增
    async fn latest_per_symbol(&self, limit: i64) -> Result<Vec<StoredQuote>>;

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<StoredQuote>>;

    /// 依抓取時間由新到舊的最近記錄（不去重）
    async fn recent(&self, limit: i64, as_of: Option<DateTime<Utc>>) -> Result<Vec<StoredQuote>>;

    /// 單一代碼的歷史，由新到舊
    async fn history(&self, symbol: &str, range: TimeRange, limit: i64) -> Result<Vec<StoredQuote>>;

    /// 在各代碼最新記錄中比對代碼或名稱
    async fn search(&self, term: &str, limit: i64) -> Result<Vec<StoredQuote>>;

    /// 刪除早於 cutoff 的記錄，回傳刪除筆數
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<i64>;

    async fn ping(&self) -> Result<()>;
}

/// LIKE 模式：跳脫萬用字元後前後加上 %
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &QuoteFilter) {
    builder.push(" WHERE TRUE");

    if let Some(symbol) = &filter.symbol {
        builder.push(" AND symbol ILIKE ").push_bind(like_pattern(symbol));
    }
    if let Some(name) = &filter.security_name {
        builder.push(" AND security_name ILIKE ").push_bind(like_pattern(name));
    }
    if let Some(min) = filter.min_close {
        builder.push(" AND close >= ").push_bind(min);
    }
    if let Some(max) = filter.max_close {
        builder.push(" AND close <= ").push_bind(max);
    }
    if let Some(start) = filter.scraped.start {
        builder.push(" AND scraped_at >= ").push_bind(start);
    }
    if let Some(end) = filter.scraped.end {
        builder.push(" AND scraped_at <= ").push_bind(end);
    }
}

/// PostgreSQL 報價存取實現
pub struct PgQuoteRepository {
    pool: PgPool,
}

impl PgQuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DbExecutor for PgQuoteRepository {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl QuoteRepository for PgQuoteRepository {
    async fn upsert(&self, quote: &QuoteInsert) -> Result<StoredQuote> {
        let sql = format!(
            r#"
            INSERT INTO quote_records (
                symbol, security_name, open, high, low, close, change,
                daily_volume, daily_value, scraped_at, bucket_start
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (symbol, bucket_start) DO UPDATE SET
                security_name = EXCLUDED.security_name,
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                change = EXCLUDED.change,
                daily_volume = EXCLUDED.daily_volume,
                daily_value = EXCLUDED.daily_value,
                scraped_at = EXCLUDED.scraped_at,
                updated_at = NOW()
            RETURNING {}
            "#,
            QUOTE_COLUMNS
        );

        let stored = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(&quote.symbol)
            .bind(&quote.security_name)
            .bind(quote.open)
            .bind(quote.high)
            .bind(quote.low)
            .bind(quote.close)
            .bind(quote.change)
            .bind(quote.daily_volume)
            .bind(quote.daily_value)
            .bind(quote.scraped_at)
            .bind(quote.bucket_start)
            .fetch_one(&self.pool)
            .await?;

        Ok(stored)
    }

    async fn list(&self, filter: &QuoteFilter, sort: QuoteSort, page: PageQuery) -> Result<Page<StoredQuote>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM quote_records");
        push_filters(&mut count_query, filter);
        let total = count_query.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        if total == 0 {
            return Ok(Page::empty(page.page, page.page_size));
        }

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM quote_records", QUOTE_COLUMNS));
        push_filters(&mut query, filter);
        query.push(sort.order_by_clause());
        query.push(" LIMIT ").push_bind(page.page_size);
        query.push(" OFFSET ").push_bind(page.offset());

        debug!("列表查詢: {}", query.sql());
        let data = query.build_query_as::<StoredQuote>().fetch_all(&self.pool).await?;

        Ok(Page::new(data, total, page.page, page.page_size))
    }

    async fn latest_per_symbol(&self, limit: i64) -> Result<Vec<StoredQuote>> {
        let sql = format!(
            r#"
            SELECT DISTINCT ON (symbol) {}
            FROM quote_records
            ORDER BY symbol ASC, scraped_at DESC, id DESC
            LIMIT $1
            "#,
            QUOTE_COLUMNS
        );

        let rows = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<StoredQuote>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM quote_records
            WHERE symbol = $1
            ORDER BY scraped_at DESC, id DESC
            LIMIT 1
            "#,
            QUOTE_COLUMNS
        );

        let row = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn recent(&self, limit: i64, as_of: Option<DateTime<Utc>>) -> Result<Vec<StoredQuote>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM quote_records
            WHERE ($2::timestamptz IS NULL OR scraped_at <= $2)
            ORDER BY scraped_at DESC, id DESC
            LIMIT $1
            "#,
            QUOTE_COLUMNS
        );

        let rows = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(limit)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn history(&self, symbol: &str, range: TimeRange, limit: i64) -> Result<Vec<StoredQuote>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM quote_records
            WHERE symbol = $1
              AND ($2::timestamptz IS NULL OR scraped_at >= $2)
              AND ($3::timestamptz IS NULL OR scraped_at <= $3)
            ORDER BY scraped_at DESC, id DESC
            LIMIT $4
            "#,
            QUOTE_COLUMNS
        );

        let rows = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(symbol)
            .bind(range.start)
            .bind(range.end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn search(&self, term: &str, limit: i64) -> Result<Vec<StoredQuote>> {
        let sql = format!(
            r#"
            SELECT {columns}
            FROM (
                SELECT DISTINCT ON (symbol) {columns}
                FROM quote_records
                ORDER BY symbol ASC, scraped_at DESC, id DESC
            ) latest
            WHERE symbol ILIKE $1 OR security_name ILIKE $1
            ORDER BY symbol ASC
            LIMIT $2
            "#,
            columns = QUOTE_COLUMNS
        );

        let rows = sqlx::query_as::<_, StoredQuote>(&sql)
            .bind(like_pattern(term))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM quote_records WHERE scraped_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quote_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
