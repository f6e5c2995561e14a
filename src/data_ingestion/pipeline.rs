//! 抓取週期：取得報價、寫入儲存、依保留期限清理
//!
//! 同一時間只允許一個週期執行，手動與排程觸發共用同一把鎖。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::data_ingestion::database_writer::write_quotes;
use crate::data_ingestion::error::{ScrapeError, ScrapeResult};
use crate::data_ingestion::extractor::{Extraction, ExtractionDiagnostics};
use crate::domain_types::{HistoryBucket, QuoteRecord};
use crate::storage::models::StoredQuote;
use crate::storage::repository::{PersistenceFailure, QuoteRepository};

/// 回報中附帶的樣本筆數
pub const SAMPLE_SIZE: usize = 5;

/// 報價來源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// 來源描述（通常是網址），用於日誌
    fn describe(&self) -> String;

    async fn fetch(&self) -> ScrapeResult<Extraction>;
}

/// 觸發方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// 單次抓取週期的結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub source_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub extracted: usize,
    pub stored: usize,
    pub diagnostics: ExtractionDiagnostics,
    pub failures: Vec<PersistenceFailure>,
    pub purged: u64,
    pub sample: Vec<StoredQuote>,
}

/// 抓取週期
pub struct ScrapeCycle {
    source: Arc<dyn QuoteSource>,
    repository: Arc<dyn QuoteRepository>,
    history_bucket: HistoryBucket,
    retention: Option<TimeDelta>,
    guard: Mutex<()>,
}

impl ScrapeCycle {
    pub fn new(source: Arc<dyn QuoteSource>, repository: Arc<dyn QuoteRepository>) -> Self {
        Self {
            source,
            repository,
            history_bucket: HistoryBucket::default(),
            retention: None,
            guard: Mutex::new(()),
        }
    }

    pub fn with_history_bucket(mut self, bucket: HistoryBucket) -> Self {
        self.history_bucket = bucket;
        self
    }

    pub fn with_retention(mut self, retention: Option<TimeDelta>) -> Self {
        self.retention = retention;
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn run(&self, trigger: Trigger) -> ScrapeResult<ScrapeReport> {
        self.run_at(trigger, Utc::now()).await
    }

    /// 以指定的抓取時間執行一次週期；已有週期執行中時回傳 CycleInProgress
    pub async fn run_at(&self, trigger: Trigger, scraped_at: DateTime<Utc>) -> ScrapeResult<ScrapeReport> {
        let Ok(_running) = self.guard.try_lock() else {
            warn!("{} 觸發被拒絕: 已有抓取週期正在執行", trigger);
            return Err(ScrapeError::CycleInProgress);
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_cycle", %run_id, %trigger);
        self.execute(run_id, trigger, scraped_at).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, trigger: Trigger, scraped_at: DateTime<Utc>) -> ScrapeResult<ScrapeReport> {
        let started_at = Utc::now();
        info!("開始抓取: {}", self.source.describe());

        let extraction = match self.source.fetch().await {
            Ok(extraction) => extraction,
            Err(e) => {
                error!(kind = e.kind(), "抓取週期中止: {}", e);
                return Err(e);
            }
        };

        let Extraction {
            source_url,
            records,
            diagnostics,
        } = extraction;
        let extracted = records.len();

        let observed: Vec<QuoteRecord> = records
            .into_iter()
            .map(|raw| raw.observed_at(scraped_at))
            .collect();
        let written = write_quotes(self.repository.as_ref(), observed, self.history_bucket).await;

        let purged = self.purge_expired(scraped_at).await;
        let stored = written.stored_count();
        let sample = written.stored.into_iter().take(SAMPLE_SIZE).collect();

        let report = ScrapeReport {
            run_id,
            trigger,
            source_url,
            started_at,
            finished_at: Utc::now(),
            scraped_at,
            extracted,
            stored,
            diagnostics,
            failures: written.failures,
            purged,
            sample,
        };

        info!(
            extracted = report.extracted,
            stored = report.stored,
            failed = report.failures.len(),
            purged = report.purged,
            "抓取週期完成"
        );
        Ok(report)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> u64 {
        let Some(retention) = self.retention else {
            return 0;
        };

        let cutoff = now - retention;
        match self.repository.delete_before(cutoff).await {
            Ok(purged) => {
                if purged > 0 {
                    info!("清除 {} 筆早於 {} 的記錄", purged, cutoff);
                }
                purged
            }
            Err(e) => {
                warn!("清除過期記錄失敗: {:#}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::RawQuote;
    use crate::storage::models::QuoteInsert;
    use crate::storage::repository::memory::InMemoryQuoteRepository;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Notify;

    fn raw(symbol: &str, close: Decimal, change: Decimal) -> RawQuote {
        RawQuote {
            symbol: symbol.to_string(),
            security_name: format!("{} PLC", symbol),
            open: close,
            high: close,
            low: close,
            close,
            change,
            daily_volume: 1_000,
            daily_value: close * dec!(1000),
        }
    }

    fn extraction(count: usize) -> Extraction {
        Extraction {
            source_url: "https://doclib.example/equities-price-listing/".to_string(),
            records: (0..count)
                .map(|i| raw(&format!("SYM{:02}", i), dec!(10) + Decimal::from(i), dec!(0.5)))
                .collect(),
            diagnostics: ExtractionDiagnostics::default(),
        }
    }

    fn mock_source(result: ScrapeResult<Extraction>) -> Arc<dyn QuoteSource> {
        let mut source = MockQuoteSource::new();
        source.expect_describe().returning(|| "mock".to_string());
        source.expect_fetch().returning(move || result.clone());
        Arc::new(source)
    }

    fn scraped_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_stores_records_and_samples() {
        let repo = Arc::new(InMemoryQuoteRepository::new());
        let cycle = ScrapeCycle::new(mock_source(Ok(extraction(8))), repo.clone());

        let report = cycle.run_at(Trigger::Manual, scraped_at()).await.unwrap();

        assert_eq!(report.extracted, 8);
        assert_eq!(report.stored, 8);
        assert_eq!(report.sample.len(), SAMPLE_SIZE);
        assert!(report.failures.is_empty());
        assert_eq!(report.scraped_at, scraped_at());
        assert_eq!(repo.count().await.unwrap(), 8);
        assert!(!cycle.is_running());
    }

    #[tokio::test]
    async fn test_rerun_in_same_bucket_is_idempotent() {
        let repo = Arc::new(InMemoryQuoteRepository::new());
        let cycle = ScrapeCycle::new(mock_source(Ok(extraction(3))), repo.clone())
            .with_history_bucket(HistoryBucket::Day);

        cycle.run_at(Trigger::Manual, scraped_at()).await.unwrap();
        cycle
            .run_at(Trigger::Scheduled, scraped_at() + TimeDelta::hours(1))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_an_empty_success() {
        let repo = Arc::new(InMemoryQuoteRepository::new());
        let failure = ScrapeError::ExtractionEmpty {
            rows_seen: 12,
            malformed: 12,
            rejected: 0,
        };
        let cycle = ScrapeCycle::new(mock_source(Err(failure)), repo.clone());

        let err = cycle.run(Trigger::Scheduled).await.unwrap_err();
        assert_matches!(err, ScrapeError::ExtractionEmpty { rows_seen: 12, .. });
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retention_purges_old_rows() {
        let repo = Arc::new(InMemoryQuoteRepository::new());
        let old = raw("OLDCO", dec!(3), dec!(0)).observed_at(scraped_at() - TimeDelta::days(40));
        repo.upsert(&QuoteInsert::new(old, HistoryBucket::Day)).await.unwrap();

        let cycle = ScrapeCycle::new(mock_source(Ok(extraction(2))), repo.clone())
            .with_retention(Some(TimeDelta::days(30)));
        let report = cycle.run_at(Trigger::Scheduled, scraped_at()).await.unwrap();

        assert_eq!(report.purged, 1);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    struct GatedSource {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl QuoteSource for GatedSource {
        fn describe(&self) -> String {
            "gated".to_string()
        }

        async fn fetch(&self) -> ScrapeResult<Extraction> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(extraction(1))
        }
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_rejected() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let source = Arc::new(GatedSource {
            started: started.clone(),
            release: release.clone(),
        });
        let cycle = Arc::new(ScrapeCycle::new(source, Arc::new(InMemoryQuoteRepository::new())));

        let running = {
            let cycle = cycle.clone();
            tokio::spawn(async move { cycle.run(Trigger::Scheduled).await })
        };
        started.notified().await;

        assert!(cycle.is_running());
        assert_matches!(cycle.run(Trigger::Manual).await, Err(ScrapeError::CycleInProgress));

        release.notify_one();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.stored, 1);
        assert!(!cycle.is_running());
    }
}
