use std::cmp::Reverse;
use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::storage::{
    models::quote::{QuoteInsert, StoredQuote},
    repository::{
        quote::{QuoteFilter, QuoteRepository, QuoteSort},
        Page, PageQuery, TimeRange,
    },
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<StoredQuote>,
}

/// 記憶體內的報價存取實現，語意與 PostgreSQL 版本一致
#[derive(Default)]
pub struct InMemoryQuoteRepository {
    state: RwLock<MemoryState>,
}

fn newest_first(rows: &mut [StoredQuote]) {
    rows.sort_by_key(|q| Reverse((q.scraped_at, q.id)));
}

fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

impl InMemoryQuoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每個代碼最新的一筆（抓取時間最大，同時間取 id 最大），依代碼遞增
    fn latest_snapshot(&self) -> Vec<StoredQuote> {
        let state = self.state.read();
        let mut latest: HashMap<&str, &StoredQuote> = HashMap::new();

        for row in &state.rows {
            latest
                .entry(row.symbol.as_str())
                .and_modify(|current| {
                    if (row.scraped_at, row.id) > (current.scraped_at, current.id) {
                        *current = row;
                    }
                })
                .or_insert(row);
        }

        let mut snapshot: Vec<StoredQuote> = latest.into_values().cloned().collect();
        snapshot.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshot
    }
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn upsert(&self, quote: &QuoteInsert) -> Result<StoredQuote> {
        let now = Utc::now();
        let mut state = self.state.write();

        if let Some(existing) = state
            .rows
            .iter_mut()
            .find(|row| row.symbol == quote.symbol && row.bucket_start == quote.bucket_start)
        {
            existing.security_name = quote.security_name.clone();
            existing.open = quote.open;
            existing.high = quote.high;
            existing.low = quote.low;
            existing.close = quote.close;
            existing.change = quote.change;
            existing.daily_volume = quote.daily_volume;
            existing.daily_value = quote.daily_value;
            existing.scraped_at = quote.scraped_at;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let stored = StoredQuote {
            id: state.next_id,
            symbol: quote.symbol.clone(),
            security_name: quote.security_name.clone(),
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            change: quote.change,
            daily_volume: quote.daily_volume,
            daily_value: quote.daily_value,
            scraped_at: quote.scraped_at,
            bucket_start: quote.bucket_start,
            created_at: now,
            updated_at: now,
        };
        state.rows.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, filter: &QuoteFilter, sort: QuoteSort, page: PageQuery) -> Result<Page<StoredQuote>> {
        let mut matched: Vec<StoredQuote> = self
            .state
            .read()
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        matched.sort_by(|a, b| sort.compare(a, b));

        let total = matched.len() as i64;
        let data = matched
            .into_iter()
            .skip(clamp_limit(page.offset()))
            .take(clamp_limit(page.page_size))
            .collect();

        Ok(Page::new(data, total, page.page, page.page_size))
    }

    async fn latest_per_symbol(&self, limit: i64) -> Result<Vec<StoredQuote>> {
        let mut snapshot = self.latest_snapshot();
        snapshot.truncate(clamp_limit(limit));
        Ok(snapshot)
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<StoredQuote>> {
        let state = self.state.read();
        Ok(state
            .rows
            .iter()
            .filter(|row| row.symbol == symbol)
            .max_by_key(|row| (row.scraped_at, row.id))
            .cloned())
    }

    async fn recent(&self, limit: i64, as_of: Option<DateTime<Utc>>) -> Result<Vec<StoredQuote>> {
        let range = TimeRange::bounded(None, as_of);
        let mut rows: Vec<StoredQuote> = self
            .state
            .read()
            .rows
            .iter()
            .filter(|row| range.contains(row.scraped_at))
            .cloned()
            .collect();
        newest_first(&mut rows);
        rows.truncate(clamp_limit(limit));
        Ok(rows)
    }

    async fn history(&self, symbol: &str, range: TimeRange, limit: i64) -> Result<Vec<StoredQuote>> {
        let mut rows: Vec<StoredQuote> = self
            .state
            .read()
            .rows
            .iter()
            .filter(|row| row.symbol == symbol && range.contains(row.scraped_at))
            .cloned()
            .collect();
        newest_first(&mut rows);
        rows.truncate(clamp_limit(limit));
        Ok(rows)
    }

    async fn search(&self, term: &str, limit: i64) -> Result<Vec<StoredQuote>> {
        let needle = term.to_lowercase();
        let mut rows: Vec<StoredQuote> = self
            .latest_snapshot()
            .into_iter()
            .filter(|row| {
                row.symbol.to_lowercase().contains(&needle) || row.security_name.to_lowercase().contains(&needle)
            })
            .collect();
        rows.truncate(clamp_limit(limit));
        Ok(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write();
        let before = state.rows.len();
        state.rows.retain(|row| row.scraped_at >= cutoff);
        Ok((before - state.rows.len()) as u64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.read().rows.len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{HistoryBucket, QuoteRecord};
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn insert(symbol: &str, close: Decimal, scraped_at: DateTime<Utc>, bucket: HistoryBucket) -> QuoteInsert {
        QuoteInsert::new(
            QuoteRecord {
                symbol: symbol.to_string(),
                security_name: format!("{} PLC", symbol),
                open: close,
                high: close,
                low: close,
                close,
                change: dec!(0),
                daily_volume: 100,
                daily_value: close * dec!(100),
                scraped_at,
            },
            bucket,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_overwrites_within_bucket() {
        let repo = InMemoryQuoteRepository::new();
        let first = repo.upsert(&insert("MTNN", dec!(200), t0(), HistoryBucket::Day)).await.unwrap();
        let second = repo
            .upsert(&insert("MTNN", dec!(205), t0() + TimeDelta::hours(2), HistoryBucket::Day))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.close, dec!(205));
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_bucket_adds_history_point() {
        let repo = InMemoryQuoteRepository::new();
        repo.upsert(&insert("MTNN", dec!(200), t0(), HistoryBucket::Day)).await.unwrap();
        repo.upsert(&insert("MTNN", dec!(210), t0() + TimeDelta::days(1), HistoryBucket::Day))
            .await
            .unwrap();

        let history = repo.history("MTNN", TimeRange::all_time(), 10).await.unwrap();
        let closes: Vec<_> = history.iter().map(|q| q.close).collect();
        assert_eq!(closes, vec![dec!(210), dec!(200)]);
    }

    #[tokio::test]
    async fn test_latest_tie_break_prefers_highest_id() {
        let repo = InMemoryQuoteRepository::new();
        repo.upsert(&insert("GTCO", dec!(40), t0(), HistoryBucket::Scrape)).await.unwrap();
        // 同一時間、不同時間桶設定下產生第二筆
        let mut dup = insert("GTCO", dec!(41), t0(), HistoryBucket::Scrape);
        dup.bucket_start = t0() - TimeDelta::seconds(1);
        repo.upsert(&dup).await.unwrap();

        let latest = repo.latest_for_symbol("GTCO").await.unwrap().unwrap();
        assert_eq!(latest.close, dec!(41));
        assert_eq!(repo.latest_per_symbol(10).await.unwrap()[0].close, dec!(41));
    }

    #[tokio::test]
    async fn test_delete_before_cutoff() {
        let repo = InMemoryQuoteRepository::new();
        repo.upsert(&insert("OLD", dec!(1), t0() - TimeDelta::days(400), HistoryBucket::Day))
            .await
            .unwrap();
        repo.upsert(&insert("NEW", dec!(1), t0(), HistoryBucket::Day)).await.unwrap();

        assert_eq!(repo.delete_before(t0() - TimeDelta::days(365)).await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.latest_for_symbol("OLD").await.unwrap().is_none());
    }
}
