//! 每日排程
//!
//! 在指定時區的固定時間執行抓取週期，結果只寫入日誌。

use std::sync::Arc;

use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{SchedulerConfig, ValidationError};
use crate::data_ingestion::{ScrapeCycle, ScrapeError, Trigger};

/// 每日固定時間的排程器
#[derive(Debug, Clone, Copy)]
pub struct DailyScheduler {
    run_at: NaiveTime,
    tz: Tz,
}

impl DailyScheduler {
    pub fn new(run_at: NaiveTime, tz: Tz) -> Self {
        Self { run_at, tz }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(config.run_at_time()?, config.tz()?))
    }

    /// 當地日期的執行時間；夏令時間跳過的時刻往後順延一小時，重複的時刻取較早者
    fn occurrence_on(&self, date: chrono::NaiveDate) -> Option<DateTime<Tz>> {
        let local = date.and_time(self.run_at);
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => self.tz.from_local_datetime(&(local + TimeDelta::hours(1))).earliest(),
        }
    }

    /// now 之後的下一次執行時間
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();

        (0..=2u64)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .filter_map(|date| self.occurrence_on(date))
            .map(|t| t.with_timezone(&Utc))
            .find(|t| *t > now)
            .unwrap_or(now + TimeDelta::days(1))
    }

    /// 啟動排程任務，shutdown 變更時結束
    pub fn spawn(self, cycle: Arc<ScrapeCycle>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("排程已啟動: 每日 {} ({})", self.run_at.format("%H:%M"), self.tz);

            loop {
                let now = Utc::now();
                let next = self.next_run_after(now);
                let delay = (next - now).to_std().unwrap_or_default();
                info!(
                    "下一次抓取於 {}（{} 小時 {} 分鐘後）",
                    next.with_timezone(&self.tz),
                    delay.as_secs() / 3600,
                    (delay.as_secs() % 3600) / 60
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.changed() => {
                        info!("排程已停止");
                        break;
                    }
                }

                match cycle.run(Trigger::Scheduled).await {
                    Ok(report) => info!(
                        "排程抓取完成: 抽取 {} 筆，寫入 {} 筆，失敗 {} 筆",
                        report.extracted,
                        report.stored,
                        report.failures.len()
                    ),
                    Err(ScrapeError::CycleInProgress) => warn!("已有抓取週期正在執行，略過本次排程"),
                    Err(e) => error!("排程抓取失敗 [{}]: {}", e.kind(), e),
                }
            }
        })
    }
}
