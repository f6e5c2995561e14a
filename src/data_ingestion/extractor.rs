use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::data_ingestion::error::{ScrapeError, ScrapeResult};
use crate::data_ingestion::schema::{RowSchema, RowShapeError};
use crate::domain_types::RawQuote;

/// 可讀取表格的渲染環境（主文件或內嵌框架）
#[async_trait]
pub trait RenderingContext: Send + Sync {
    /// 用於辨識此環境的網址
    fn url(&self) -> &str;

    /// 目前的資料列數
    async fn count_rows(&self) -> ScrapeResult<usize>;

    /// 讀取每一列的儲存格文字
    async fn read_rows(&self) -> ScrapeResult<Vec<Vec<String>>>;
}

/// 格式不符的列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedRow {
    pub row_index: usize,
    #[serde(flatten)]
    pub error: RowShapeError,
}

/// 被過濾的列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    pub row_index: usize,
    pub symbol: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    EmptySymbol,
    NonPositiveClose,
}

/// 抽取過程的診斷資訊
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    /// 讀到的列數（含沒有資料格的標題列）
    pub rows_seen: usize,
    /// 沒有任何資料格的列
    pub skipped_rows: usize,
    pub malformed: Vec<MalformedRow>,
    pub rejected: Vec<RejectedRow>,
}

impl ExtractionDiagnostics {
    /// 出現格式不符的列代表表格結構可能已改變
    pub fn is_low_confidence(&self) -> bool {
        !self.malformed.is_empty()
    }
}

/// 一次抽取的結果，依表格列順序排列
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub source_url: String,
    pub records: Vec<RawQuote>,
    pub diagnostics: ExtractionDiagnostics,
}

/// 抽取器設定
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub frame_marker: String,
    pub min_rows: usize,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&ScraperConfig> for ExtractorSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            frame_marker: config.frame_marker.clone(),
            min_rows: config.min_rows,
            wait_timeout: config.row_wait_timeout(),
            poll_interval: config.row_poll_interval(),
        }
    }
}

/// 表格抽取器：選擇渲染環境、等待表格出現、逐列解析
#[derive(Debug, Clone)]
pub struct TableExtractor {
    settings: ExtractorSettings,
    schema: RowSchema,
}

impl TableExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self {
            settings,
            schema: RowSchema::listing(),
        }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// 有多個環境時選擇第一個網址含標記者，否則退回主文件（第一個）
    pub fn locate<'a>(&self, contexts: &'a [Box<dyn RenderingContext>]) -> Option<&'a dyn RenderingContext> {
        let main = contexts.first()?;
        if contexts.len() > 1 {
            if let Some(frame) = contexts
                .iter()
                .find(|ctx| ctx.url().contains(&self.settings.frame_marker))
            {
                debug!("使用內嵌框架: {}", frame.url());
                return Some(frame.as_ref());
            }
        }
        Some(main.as_ref())
    }

    /// 等待列數超過門檻；逾時回傳 ExtractionTimeout
    pub async fn wait_for_rows(&self, ctx: &dyn RenderingContext) -> ScrapeResult<usize> {
        let started = Instant::now();
        let deadline = started + self.settings.wait_timeout;

        loop {
            let rows = ctx.count_rows().await?;
            if rows > self.settings.min_rows {
                debug!("表格已載入: {} 列，等待 {:?}", rows, started.elapsed());
                return Ok(rows);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ScrapeError::ExtractionTimeout {
                    url: ctx.url().to_string(),
                    rows,
                    waited: started.elapsed(),
                });
            }
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// 解析已讀出的列並套用過濾條件（代碼非空、收盤價為正）
    pub fn decode_rows(&self, source_url: &str, rows: Vec<Vec<String>>) -> Extraction {
        let mut diagnostics = ExtractionDiagnostics {
            rows_seen: rows.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(rows.len());

        for (row_index, cells) in rows.iter().enumerate() {
            if cells.is_empty() {
                diagnostics.skipped_rows += 1;
                continue;
            }

            let quote = match self.schema.decode(cells) {
                Ok(quote) => quote,
                Err(error) => {
                    diagnostics.malformed.push(MalformedRow { row_index, error });
                    continue;
                }
            };

            let reason = if quote.symbol.is_empty() {
                Some(RejectReason::EmptySymbol)
            } else if !quote.is_storable() {
                Some(RejectReason::NonPositiveClose)
            } else {
                None
            };

            match reason {
                Some(reason) => diagnostics.rejected.push(RejectedRow {
                    row_index,
                    symbol: quote.symbol,
                    reason,
                }),
                None => records.push(quote),
            }
        }

        Extraction {
            source_url: source_url.to_string(),
            records,
            diagnostics,
        }
    }

    /// 完整抽取流程；零筆有效報價回傳 ExtractionEmpty
    pub async fn extract(&self, contexts: &[Box<dyn RenderingContext>]) -> ScrapeResult<Extraction> {
        let ctx = self
            .locate(contexts)
            .ok_or_else(|| ScrapeError::navigation("", "沒有可用的渲染環境"))?;

        self.wait_for_rows(ctx).await?;
        let rows = ctx.read_rows().await?;
        let extraction = self.decode_rows(ctx.url(), rows);
        let diagnostics = &extraction.diagnostics;

        if diagnostics.is_low_confidence() {
            warn!(
                malformed = diagnostics.malformed.len(),
                rows_seen = diagnostics.rows_seen,
                "部分列格式不符，表格結構可能已改變"
            );
        }

        if extraction.records.is_empty() {
            return Err(ScrapeError::ExtractionEmpty {
                rows_seen: diagnostics.rows_seen,
                malformed: diagnostics.malformed.len(),
                rejected: diagnostics.rejected.len(),
            });
        }

        info!(
            "從 {} 抽取 {} 筆報價（共 {} 列）",
            extraction.source_url,
            extraction.records.len(),
            diagnostics.rows_seen
        );
        Ok(extraction)
    }
}
