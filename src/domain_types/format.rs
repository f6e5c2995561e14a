//! 呈現用格式化字串，僅在讀取時產生，不寫入資料庫

use rust_decimal::Decimal;
use serde::Serialize;

use super::quote::QuoteValues;

pub const CURRENCY_SYMBOL: &str = "₦";

/// 報價的格式化呈現
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedQuote {
    pub close: String,
    pub change: String,
    pub change_percent: String,
    pub daily_volume: String,
    pub daily_value: String,
}

impl FormattedQuote {
    pub fn of<T: QuoteValues>(quote: &T) -> Self {
        Self {
            close: format_currency(quote.close()),
            change: format_signed(quote.change()),
            change_percent: format_percent(quote.change_percent()),
            daily_volume: group_thousands(&quote.daily_volume().to_string()),
            daily_value: format_currency(quote.daily_value()),
        }
    }
}

/// 1234.5 -> "₦1,234.50"
pub fn format_currency(value: Decimal) -> String {
    let text = fixed_2(value);
    match text.strip_prefix('-') {
        Some(abs) => format!("-{}{}", CURRENCY_SYMBOL, group_thousands(abs)),
        None => format!("{}{}", CURRENCY_SYMBOL, group_thousands(&text)),
    }
}

/// 1.234 -> "+1.23%"
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", format_signed(value))
}

/// 帶正負號、兩位小數
pub fn format_signed(value: Decimal) -> String {
    let text = group_thousands(&fixed_2(value));
    if value.round_dp(2) > Decimal::ZERO {
        format!("+{}", text)
    } else {
        text
    }
}

fn fixed_2(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    // -0.00 顯示為 0.00
    if rounded.is_zero() {
        return "0.00".to_string();
    }
    format!("{:.2}", rounded)
}

/// 為整數部分加上千分位
fn group_thousands(text: &str) -> String {
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(1234.5), "₦1,234.50")]
    #[case(dec!(0), "₦0.00")]
    #[case(dec!(999), "₦999.00")]
    #[case(dec!(1234567.891), "₦1,234,567.89")]
    #[case(dec!(-1500), "-₦1,500.00")]
    fn test_format_currency(#[case] value: Decimal, #[case] expected: &str) {
        assert_eq!(format_currency(value), expected);
    }

    #[rstest]
    #[case(dec!(1.234), "+1.23%")]
    #[case(dec!(-0.5), "-0.50%")]
    #[case(dec!(0), "0.00%")]
    #[case(dec!(-0.001), "0.00%")]
    fn test_format_percent(#[case] value: Decimal, #[case] expected: &str) {
        assert_eq!(format_percent(value), expected);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567"), "1,234,567");
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("-1000.5"), "-1,000.5");
    }
}
