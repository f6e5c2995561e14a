use tracing::{info, warn};

use crate::domain_types::{HistoryBucket, QuoteRecord};
use crate::storage::{
    models::quote::QuoteInsert,
    repository::quote::{BatchWriteReport, QuoteRepository},
};

/// 將報價記錄寫入資料庫；單筆失敗不影響其他記錄
pub async fn write_quotes(
    repo: &dyn QuoteRepository,
    records: Vec<QuoteRecord>,
    bucket: HistoryBucket,
) -> BatchWriteReport {
    let inserts: Vec<QuoteInsert> = records
        .into_iter()
        .map(|record| QuoteInsert::new(record, bucket))
        .collect();

    let report = repo.upsert_all(&inserts).await;

    if report.is_complete() {
        info!("寫入 {} 筆報價記錄到資料庫", report.stored_count());
    } else {
        warn!(
            "寫入 {} 筆報價記錄，{} 筆失敗",
            report.stored_count(),
            report.failures.len()
        );
    }
    report
}
