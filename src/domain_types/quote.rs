use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 報價數值存取介面，供衍生欄位與概要統計共用
pub trait QuoteValues {
    fn close(&self) -> Decimal;
    fn change(&self) -> Decimal;
    fn daily_volume(&self) -> i64;
    fn daily_value(&self) -> Decimal;

    /// 漲跌幅百分比 = change / (close - change) * 100，分母為 0 或超出 Decimal 範圍時為 0
    fn change_percent(&self) -> Decimal {
        change_percent(self.change(), self.close())
    }

    fn direction(&self) -> PriceDirection {
        PriceDirection::of(self.change())
    }
}

pub fn change_percent(change: Decimal, close: Decimal) -> Decimal {
    close
        .checked_sub(change)
        .filter(|previous_close| !previous_close.is_zero())
        .and_then(|previous_close| change.checked_div(previous_close))
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .map(|percent| percent.round_dp(4))
        .unwrap_or(Decimal::ZERO)
}

/// 以漲跌值分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Gainer,
    Loser,
    Unchanged,
}

impl PriceDirection {
    pub fn of(change: Decimal) -> Self {
        if change > Decimal::ZERO {
            PriceDirection::Gainer
        } else if change < Decimal::ZERO {
            PriceDirection::Loser
        } else {
            PriceDirection::Unchanged
        }
    }
}

/// 從表格一列解析出的報價（尚未標記抓取時間）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuote {
    pub symbol: String,
    pub security_name: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub change: Decimal,
    pub daily_volume: i64,
    pub daily_value: Decimal,
}

impl RawQuote {
    /// 代碼非空且收盤價為正才可寫入
    pub fn is_storable(&self) -> bool {
        !self.symbol.is_empty() && self.close > Decimal::ZERO
    }

    /// 標記抓取時間，產生一筆報價記錄
    pub fn observed_at(self, scraped_at: DateTime<Utc>) -> QuoteRecord {
        QuoteRecord {
            symbol: self.symbol,
            security_name: self.security_name,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            change: self.change,
            daily_volume: self.daily_volume,
            daily_value: self.daily_value,
            scraped_at,
        }
    }
}

impl QuoteValues for RawQuote {
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

/// 單一代碼在單次抓取時觀察到的報價
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
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

impl QuoteValues for QuoteRecord {
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

/// 歷史保留粒度：同一代碼在同一時間桶內只保留最後一次寫入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBucket {
    /// 每次抓取都是新的歷史點
    Scrape,
    Hour,
    #[default]
    Day,
}

impl HistoryBucket {
    /// 計算時間所屬時間桶的起點（UTC）
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let unit = match self {
            HistoryBucket::Scrape => return ts,
            HistoryBucket::Hour => TimeDelta::hours(1),
            HistoryBucket::Day => TimeDelta::days(1),
        };
        ts.duration_trunc(unit).unwrap_or(ts)
    }
}
