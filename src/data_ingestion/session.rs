//! 頁面工作階段
//!
//! 以 HTTP 取得目標頁面與其內嵌框架，每個文件各自成為一個可輪詢的渲染環境。
//! 工作階段結束時一定會釋放，重複關閉不會出錯。

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::data_ingestion::error::{ScrapeError, ScrapeResult};
use crate::data_ingestion::extractor::{Extraction, RenderingContext, TableExtractor};
use crate::data_ingestion::pipeline::QuoteSource;

/// 子資源類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Image,
    Stylesheet,
    Font,
    Media,
    Other,
}

impl ResourceKind {
    /// 以副檔名判斷資源類型；沒有副檔名視為文件
    pub fn classify(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();
        let file = path.rsplit('/').next().unwrap_or_default();
        let Some((_, ext)) = file.rsplit_once('.') else {
            return ResourceKind::Document;
        };

        match ext {
            "html" | "htm" | "php" | "asp" | "aspx" | "jsp" => ResourceKind::Document,
            "js" | "mjs" => ResourceKind::Script,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" => ResourceKind::Image,
            "css" => ResourceKind::Stylesheet,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => ResourceKind::Font,
            "mp4" | "webm" | "mp3" | "ogg" | "wav" | "m3u8" | "mov" => ResourceKind::Media,
            _ => ResourceKind::Other,
        }
    }
}

/// 子資源封鎖策略
#[derive(Debug, Clone, Default)]
pub struct ResourcePolicy {
    blocked: Vec<ResourceKind>,
}

impl ResourcePolicy {
    pub fn new(blocked: Vec<ResourceKind>) -> Self {
        Self { blocked }
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.allows_kind(ResourceKind::classify(url))
    }

    pub fn allows_kind(&self, kind: ResourceKind) -> bool {
        !self.blocked.contains(&kind)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn table_rows(table: ElementRef<'_>, tr: &Selector, td: &Selector) -> Vec<Vec<String>> {
    table
        .select(tr)
        .map(|row| row.select(td).map(cell_text).collect())
        .collect()
}

/// 取出資料列最多的表格的所有列；標題列（只有 th）回傳空列
pub fn parse_table_rows(html: &str) -> Vec<Vec<String>> {
    let (Some(table_sel), Some(tr), Some(td)) = (selector("table"), selector("tr"), selector("td")) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&table_sel)
        .map(|table| table_rows(table, &tr, &td))
        .max_by_key(|rows| rows.iter().filter(|cells| !cells.is_empty()).count())
        .unwrap_or_default()
}

/// 目前可見的資料列數
pub fn count_data_rows(html: &str) -> usize {
    parse_table_rows(html)
        .iter()
        .filter(|cells| !cells.is_empty())
        .count()
}

/// 找出內嵌框架的網址（只接受 http/https）
pub fn discover_frames(html: &str, base: &Url) -> Vec<Url> {
    let Some(frame_sel) = selector("iframe[src], frame[src]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&frame_sel)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect()
}

async fn fetch_document(client: &Client, url: &Url) -> ScrapeResult<String> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| ScrapeError::navigation(url.as_str(), e))?;

    let response = response
        .error_for_status()
        .map_err(|e| ScrapeError::navigation(url.as_str(), e))?;

    response
        .text()
        .await
        .map_err(|e| ScrapeError::navigation(url.as_str(), e))
}

struct Snapshot {
    html: String,
    stale: bool,
}

/// 單一 HTML 文件的渲染環境
///
/// 第一次輪詢使用載入時的內容，之後每次輪詢重新取得文件。
pub struct HtmlContext {
    client: Client,
    url: Url,
    snapshot: Mutex<Snapshot>,
}

impl HtmlContext {
    pub fn new(client: Client, url: Url, html: String) -> Self {
        Self {
            client,
            url,
            snapshot: Mutex::new(Snapshot { html, stale: false }),
        }
    }
}

#[async_trait]
impl RenderingContext for HtmlContext {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn count_rows(&self) -> ScrapeResult<usize> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.stale {
            snapshot.html = fetch_document(&self.client, &self.url).await?;
        }
        snapshot.stale = true;
        Ok(count_data_rows(&snapshot.html))
    }

    async fn read_rows(&self) -> ScrapeResult<Vec<Vec<String>>> {
        let snapshot = self.snapshot.lock().await;
        Ok(parse_table_rows(&snapshot.html))
    }
}

/// 一次抓取所使用的頁面工作階段
pub struct PageSession {
    target: Url,
    contexts: Vec<Box<dyn RenderingContext>>,
    closed: bool,
}

impl PageSession {
    /// 載入目標頁面及允許的內嵌框架；主文件載入失敗回傳 Navigation
    ///
    /// 主文件與所有框架共用同一個導覽時限，框架同時載入，逾時未完成的框架直接略過。
    pub async fn open(config: &ScraperConfig) -> ScrapeResult<Self> {
        let target = Url::parse(&config.target_url)
            .map_err(|e| ScrapeError::navigation(config.target_url.as_str(), e))?;
        let deadline = Instant::now() + config.navigation_timeout();

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.navigation_timeout())
            .build()
            .map_err(|e| ScrapeError::navigation(target.as_str(), e))?;

        let policy = ResourcePolicy::new(config.blocked_resources.clone());
        let html = timeout_at(deadline, fetch_document(&client, &target))
            .await
            .map_err(|_| ScrapeError::navigation(target.as_str(), "導覽逾時"))??;

        let frames: Vec<Url> = discover_frames(&html, &target)
            .into_iter()
            .filter(|frame| {
                let allowed = policy.allows(frame);
                if !allowed {
                    debug!("略過被封鎖的框架資源: {}", frame);
                }
                allowed
            })
            .collect();
        debug!("{} 含 {} 個可載入的內嵌框架", target, frames.len());

        let mut pending: FuturesUnordered<_> = frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| {
                let client = client.clone();
                async move {
                    let loaded = fetch_document(&client, &frame).await;
                    (index, frame, loaded)
                }
            })
            .collect();

        let mut loaded_frames = Vec::new();
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some((index, frame, Ok(frame_html)))) => {
                    loaded_frames.push((index, HtmlContext::new(client.clone(), frame, frame_html)));
                }
                Ok(Some((_, _, Err(e)))) => warn!("內嵌框架載入失敗，略過: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!("{} 個內嵌框架超過導覽時限，略過", pending.len());
                    break;
                }
            }
        }
        loaded_frames.sort_by_key(|(index, _)| *index);

        let mut contexts: Vec<Box<dyn RenderingContext>> =
            vec![Box::new(HtmlContext::new(client.clone(), target.clone(), html))];
        contexts.extend(
            loaded_frames
                .into_iter()
                .map(|(_, ctx)| Box::new(ctx) as Box<dyn RenderingContext>),
        );

        info!("已開啟頁面工作階段: {}（{} 個渲染環境）", target, contexts.len());
        Ok(Self {
            target,
            contexts,
            closed: false,
        })
    }

    /// 以既有的渲染環境建立工作階段
    pub fn from_contexts(target: Url, contexts: Vec<Box<dyn RenderingContext>>) -> Self {
        Self {
            target,
            contexts,
            closed: false,
        }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 各渲染環境的網址，主文件在前
    pub fn context_urls(&self) -> Vec<&str> {
        self.contexts.iter().map(|ctx| ctx.url()).collect()
    }

    pub async fn extract(&self, extractor: &TableExtractor) -> ScrapeResult<Extraction> {
        if self.closed {
            return Err(ScrapeError::SessionClosed);
        }
        extractor.extract(&self.contexts).await
    }

    /// 釋放所有渲染環境；可重複呼叫
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.contexts.clear();
        debug!("已關閉頁面工作階段: {}", self.target);
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// 透過 HTTP 抓取價格列表的報價來源
pub struct HttpQuoteSource {
    config: ScraperConfig,
    extractor: TableExtractor,
}

impl HttpQuoteSource {
    pub fn new(config: ScraperConfig) -> Self {
        let extractor = TableExtractor::new((&config).into());
        Self { config, extractor }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    fn describe(&self) -> String {
        self.config.target_url.clone()
    }

    async fn fetch(&self) -> ScrapeResult<Extraction> {
        let mut session = PageSession::open(&self.config).await?;
        let result = session.extract(&self.extractor).await;
        session.close();
        result
    }
}
