// time_utils.rs
//
// 查詢參數的日期解析與日界線計算。
// 日期參數接受 YYYY-MM-DD 或 RFC3339；純日期依用途解讀為當日起點或終點（UTC）。

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};

/// 純日期參數代表的日界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

/// 當日 00:00:00 (UTC)
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// 當日最後一毫秒 (UTC)；超出 chrono 可表示範圍時回傳 None
pub fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    start_of_day(date)
        .checked_add_signed(TimeDelta::days(1))?
        .checked_sub_signed(TimeDelta::milliseconds(1))
}

/// 解析日期查詢參數
pub fn parse_date_param(raw: &str, bound: DateBound) -> Result<DateTime<Utc>, String> {
    let value = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let resolved = match bound {
            DateBound::Start => Some(start_of_day(date)),
            DateBound::End => end_of_day(date),
        };
        return resolved.ok_or_else(|| format!("日期超出可表示範圍: {}", raw));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("無法解析日期: {}（需為 YYYY-MM-DD 或 RFC3339）", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plain_date_bounds() {
        let start = parse_date_param("2024-06-03", DateBound::Start).unwrap();
        let end = parse_date_param("2024-06-03", DateBound::End).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 3, 23, 59, 59).unwrap() + TimeDelta::milliseconds(999));
    }

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        let parsed = parse_date_param("2024-06-03T10:00:00+01:00", DateBound::Start).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_dates_at_range_limit_are_errors_not_panics() {
        let last = NaiveDate::MAX.format("%Y-%m-%d").to_string();
        assert!(end_of_day(NaiveDate::MAX).is_none());
        assert!(parse_date_param(&last, DateBound::End).is_err());
        assert!(parse_date_param(&last, DateBound::Start).is_ok());
        assert!(parse_date_param("+262142-12-31", DateBound::End).is_err());
    }

    #[test]
    fn test_invalid_dates() {
        assert!(parse_date_param("03/06/2024", DateBound::Start).is_err());
        assert!(parse_date_param("2024-02-30", DateBound::End).is_err());
        assert!(parse_date_param("", DateBound::End).is_err());
    }
}
