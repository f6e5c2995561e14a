use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Decimal;

use crate::data_ingestion::normalizer::clean_symbol;
use crate::domain_types::{HistoryBucket, QuoteRecord, QuoteValues};

/// 已儲存的報價記錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuote {
    pub id: i64,
    pub symbol: String,
    pub security_name: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub change: Decimal,
    pub daily_volume: i64,
    pub daily_value: Decimal,
    pub scraped_at: DateTime<Utc>,
    #[serde(skip)]
    pub bucket_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteValues for StoredQuote {
    fn close(&self) -> Decimal {
        self.close
    }
    fn change(&self) -> Decimal {
        self.change
    }
    fn daily_volume(&self) -> i64 {
        self.daily_volume
    }
    fn daily_value(&self) -> Decimal {
        self.daily_value
    }
}

/// 歷史查詢的投影：只含報價欄位與抓取時間
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteHistoryPoint {
    pub symbol: String,
    pub security_name: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub change: Decimal,
    pub daily_volume: i64,
    pub daily_value: Decimal,
    pub scraped_at: DateTime<Utc>,
}

impl From<StoredQuote> for QuoteHistoryPoint {
    fn from(quote: StoredQuote) -> Self {
        Self {
            symbol: quote.symbol,
            security_name: quote.security_name,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            change: quote.change,
            daily_volume: quote.daily_volume,
            daily_value: quote.daily_value,
            scraped_at: quote.scraped_at,
        }
    }
}

impl QuoteValues for QuoteHistoryPoint {
    fn close(&self) -> Decimal {
        self.close
    }
    fn change(&self) -> Decimal {
        self.change
    }
    fn daily_volume(&self) -> i64 {
        self.daily_volume
    }
    fn daily_value(&self) -> Decimal {
        self.daily_value
    }
}

/// 報價寫入模型 (不包含自動生成的字段)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteInsert {
    pub symbol: String,
    pub security_name: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub change: Decimal,
    pub daily_volume: i64,
    pub daily_value: Decimal,
    pub scraped_at: DateTime<Utc>,
    pub bucket_start: DateTime<Utc>,
}

impl QuoteInsert {
    /// 依歷史粒度計算時間桶；代碼統一正規化
    pub fn new(record: QuoteRecord, bucket: HistoryBucket) -> Self {
        Self {
            symbol: clean_symbol(&record.symbol),
            security_name: record.security_name,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            change: record.change,
            daily_volume: record.daily_volume,
            daily_value: record.daily_value,
            scraped_at: record.scraped_at,
            bucket_start: bucket.bucket_start(record.scraped_at),
        }
    }

    /// 寫入前的最後檢查
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            bail!("代碼不可為空");
        }
        if self.close <= Decimal::ZERO {
            bail!("{} 收盤價必須為正數: {}", self.symbol, self.close);
        }
        Ok(())
    }
}
