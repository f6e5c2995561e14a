//! 報價表格的欄位定義
//!
//! 欄位順序、寬度檢查與解析共用同一份定義，列寬不足時產生診斷而不是默默截斷。

use thiserror::Error;

use crate::data_ingestion::normalizer::{clean_symbol, clean_text, parse_number, parse_volume};
use crate::domain_types::RawQuote;

/// 報價欄位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteField {
    Symbol,
    SecurityName,
    Open,
    High,
    Low,
    Close,
    Change,
    DailyVolume,
    DailyValue,
}

impl QuoteField {
    pub fn name(&self) -> &'static str {
        match self {
            QuoteField::Symbol => "symbol",
            QuoteField::SecurityName => "securityName",
            QuoteField::Open => "open",
            QuoteField::High => "high",
            QuoteField::Low => "low",
            QuoteField::Close => "close",
            QuoteField::Change => "change",
            QuoteField::DailyVolume => "dailyVolume",
            QuoteField::DailyValue => "dailyValue",
        }
    }
}

type CellParser = fn(&mut RawQuote, &str);

/// 單一欄位：對應的報價欄位、解析函數、缺格時的預設值
#[derive(Clone, Copy)]
pub struct Column {
    pub field: QuoteField,
    pub default: Option<&'static str>,
    parse: CellParser,
}

impl Column {
    fn required(field: QuoteField, parse: CellParser) -> Self {
        Self { field, default: None, parse }
    }

    fn optional(field: QuoteField, default: &'static str, parse: CellParser) -> Self {
        Self { field, default: Some(default), parse }
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("field", &self.field)
            .field("default", &self.default)
            .finish()
    }
}

/// 列寬度不符
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(rename_all = "camelCase")]
#[error("列寬度不符: 需要至少 {expected} 格，實際 {actual} 格")]
pub struct RowShapeError {
    pub expected: usize,
    pub actual: usize,
}

/// 依序排列的欄位定義
#[derive(Debug, Clone)]
pub struct RowSchema {
    columns: Vec<Column>,
}

impl RowSchema {
    /// 價格列表的欄位：代碼、名稱、開高低收、漲跌、成交量、成交值（可缺，預設 0）
    pub fn listing() -> Self {
        Self {
            columns: vec![
                Column::required(QuoteField::Symbol, |q, raw| q.symbol = clean_symbol(raw)),
                Column::required(QuoteField::SecurityName, |q, raw| q.security_name = clean_text(raw)),
                Column::required(QuoteField::Open, |q, raw| q.open = parse_number(raw)),
                Column::required(QuoteField::High, |q, raw| q.high = parse_number(raw)),
                Column::required(QuoteField::Low, |q, raw| q.low = parse_number(raw)),
                Column::required(QuoteField::Close, |q, raw| q.close = parse_number(raw)),
                Column::required(QuoteField::Change, |q, raw| q.change = parse_number(raw)),
                Column::required(QuoteField::DailyVolume, |q, raw| q.daily_volume = parse_volume(raw)),
                Column::optional(QuoteField::DailyValue, "0", |q, raw| q.daily_value = parse_number(raw)),
            ],
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// 最少需要的儲存格數：到最後一個必填欄位為止
    pub fn min_arity(&self) -> usize {
        self.columns
            .iter()
            .rposition(|c| c.default.is_none())
            .map_or(0, |idx| idx + 1)
    }

    /// 把一列儲存格依欄位定義解析為報價；多出的儲存格忽略
    pub fn decode<S: AsRef<str>>(&self, cells: &[S]) -> Result<RawQuote, RowShapeError> {
        let expected = self.min_arity();
        if cells.len() < expected {
            return Err(RowShapeError {
                expected,
                actual: cells.len(),
            });
        }

        let mut quote = RawQuote::default();
        for (idx, column) in self.columns.iter().enumerate() {
            let raw = cells
                .get(idx)
                .map(AsRef::as_ref)
                .or(column.default)
                .unwrap_or_default();
            (column.parse)(&mut quote, raw);
        }

        Ok(quote)
    }
}

impl Default for RowSchema {
    fn default() -> Self {
        Self::listing()
    }
}
