//! 儲存格文字正規化
//!
//! 來源表格可能以 `-`、`N/A` 或空白當作佔位符，所有數值解析都是全函數：
//! 無法解析時回傳 0，不會回傳錯誤。

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// 只保留 ASCII 英數字並轉為大寫
pub fn clean_symbol(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// 去除前後空白
pub fn clean_text(raw: &str) -> String {
    raw.trim().to_string()
}

/// 解析數值；佔位符、空白或無法解析的內容一律為 0
pub fn parse_number(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if is_placeholder(trimmed) {
        return Decimal::ZERO;
    }

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    Decimal::from_str(&digits).unwrap_or(Decimal::ZERO)
}

/// 解析整數型數量（成交量），小數部分捨去
pub fn parse_volume(raw: &str) -> i64 {
    parse_number(raw).trunc().to_i64().unwrap_or(0)
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || value == "-" || value.eq_ignore_ascii_case("n/a")
}
