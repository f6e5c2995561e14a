use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quote::{PriceDirection, QuoteValues};

/// 市場概要：對最近一批記錄（不依代碼去重）的彙總
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub total_stocks: i64,
    pub total_volume: i64,
    pub total_value: Decimal,
    pub avg_price: Decimal,
    pub gainers: i64,
    pub losers: i64,
    pub unchanged: i64,
}

impl MarketSummary {
    /// 彙總記錄；沒有記錄時回傳全零，金額加總超出範圍時停在 Decimal::MAX
    pub fn from_quotes<'a, T, I>(quotes: I) -> Self
    where
        T: QuoteValues + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut summary = MarketSummary::default();
        let mut close_sum = Decimal::ZERO;

        for quote in quotes {
            summary.total_stocks += 1;
            summary.total_volume = summary.total_volume.saturating_add(quote.daily_volume());
            summary.total_value = saturating_add(summary.total_value, quote.daily_value());
            close_sum = saturating_add(close_sum, quote.close());

            match quote.direction() {
                PriceDirection::Gainer => summary.gainers += 1,
                PriceDirection::Loser => summary.losers += 1,
                PriceDirection::Unchanged => summary.unchanged += 1,
            }
        }

        if summary.total_stocks > 0 {
            summary.avg_price = close_sum
                .checked_div(Decimal::from(summary.total_stocks))
                .unwrap_or(Decimal::ZERO)
                .round_dp(2);
        }

        summary
    }
}

fn saturating_add(total: Decimal, value: Decimal) -> Decimal {
    total.checked_add(value).unwrap_or(if value.is_sign_negative() {
        Decimal::MIN
    } else {
        Decimal::MAX
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::RawQuote;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str, close: Decimal, change: Decimal, volume: i64, value: Decimal) -> RawQuote {
        RawQuote {
            symbol: symbol.to_string(),
            security_name: format!("{} PLC", symbol),
            open: close,
            high: close,
            low: close,
            close,
            change,
            daily_volume: volume,
            daily_value: value,
        }
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = MarketSummary::from_quotes(Vec::<RawQuote>::new().iter());
        assert_eq!(summary, MarketSummary::default());
        assert_eq!(summary.total_stocks, 0);
        assert_eq!(summary.avg_price, Decimal::ZERO);
    }

    #[test]
    fn test_classifies_by_change_sign() {
        let quotes = vec![
            quote("ZENITHBANK", dec!(36), dec!(1), 100, dec!(3600)),
            quote("GTCO", dec!(40), dec!(-1), 200, dec!(8000)),
            quote("MTNN", dec!(200), dec!(0), 300, dec!(60000)),
        ];
        let summary = MarketSummary::from_quotes(&quotes);

        assert_eq!(summary.gainers, 1);
        assert_eq!(summary.losers, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.total_stocks, 3);
        assert_eq!(summary.total_volume, 600);
        assert_eq!(summary.total_value, dec!(71600));
        assert_eq!(summary.avg_price, dec!(92));
    }

    #[test]
    fn test_duplicate_symbols_are_counted_individually() {
        let quotes = vec![
            quote("MTNN", dec!(200), dec!(2), 10, dec!(2000)),
            quote("MTNN", dec!(198), dec!(-2), 10, dec!(1980)),
        ];
        let summary = MarketSummary::from_quotes(&quotes);
        assert_eq!(summary.total_stocks, 2);
        assert_eq!(summary.avg_price, dec!(199));
    }

    #[test]
    fn test_sums_saturate_at_decimal_max() {
        let quotes = vec![
            quote("BIG", Decimal::MAX, dec!(0), i64::MAX, Decimal::MAX),
            quote("BIG", Decimal::MAX, dec!(0), i64::MAX, Decimal::MAX),
        ];
        let summary = MarketSummary::from_quotes(&quotes);
        assert_eq!(summary.total_stocks, 2);
        assert_eq!(summary.total_volume, i64::MAX);
        assert_eq!(summary.total_value, Decimal::MAX);
        assert!(summary.avg_price > Decimal::ZERO);
    }
}
