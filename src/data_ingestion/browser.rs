//! 無頭瀏覽器工作階段
//!
//! 以 Chrome DevTools Protocol 載入目標頁面：攔截子資源請求依策略封鎖，
//! 等待網路閒置後才視為載入完成。主文件與每個允許的內嵌框架各開一個分頁，
//! 表格列數與儲存格文字都在頁面內以腳本讀取，因此腳本產生的表格也讀得到。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::join_all;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::data_ingestion::error::{ScrapeError, ScrapeResult};
use crate::data_ingestion::extractor::{Extraction, RenderingContext, TableExtractor};
use crate::data_ingestion::pipeline::QuoteSource;
use crate::data_ingestion::session::{PageSession, ResourceKind, ResourcePolicy};

const NETWORK_IDLE: &str = "networkIdle";

/// 資料列最多的表格的所有列；只有 th 的列回傳空陣列
const TABLE_ROWS_SCRIPT: &str = r#"(() => {
    let best = [];
    let bestCount = -1;
    for (const table of document.querySelectorAll('table')) {
        const rows = Array.from(table.querySelectorAll('tr')).map((tr) =>
            Array.from(tr.querySelectorAll('td')).map((td) =>
                (td.textContent || '').split(/\s+/).filter(Boolean).join(' ')));
        const count = rows.filter((cells) => cells.length > 0).length;
        if (count >= bestCount) {
            best = rows;
            bestCount = count;
        }
    }
    return best;
})()"#;

const FRAME_URLS_SCRIPT: &str = r#"Array.from(document.querySelectorAll('iframe[src], frame[src]')).map((f) => f.src)"#;

/// CDP 資源類型對應
pub fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        _ => ResourceKind::Other,
    }
}

/// 瀏覽器分頁的渲染環境
pub struct BrowserContext {
    page: Page,
    url: Url,
}

impl BrowserContext {
    fn new(page: Page, url: Url) -> Self {
        Self { page, url }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> ScrapeResult<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::navigation(self.url.as_str(), e))?
            .into_value::<T>()
            .map_err(|e| ScrapeError::navigation(self.url.as_str(), e))
    }

    /// 頁面中的內嵌框架網址（只接受 http/https）
    async fn frame_urls(&self) -> ScrapeResult<Vec<Url>> {
        let sources: Vec<String> = self.evaluate(FRAME_URLS_SCRIPT).await?;
        Ok(sources
            .iter()
            .filter_map(|src| self.url.join(src.trim()).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .collect())
    }
}

#[async_trait]
impl RenderingContext for BrowserContext {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn count_rows(&self) -> ScrapeResult<usize> {
        let rows = self.read_rows().await?;
        Ok(rows.iter().filter(|cells| !cells.is_empty()).count())
    }

    async fn read_rows(&self) -> ScrapeResult<Vec<Vec<String>>> {
        self.evaluate(TABLE_ROWS_SCRIPT).await
    }
}

/// 依策略放行或封鎖暫停的請求，直到分頁關閉
async fn intercept_requests(page: &Page, policy: ResourcePolicy) -> Result<JoinHandle<()>, CdpError> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    let interceptor = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let kind = resource_kind(&event.resource_type);
            let outcome = if policy.allows_kind(kind) {
                interceptor
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            } else {
                debug!("封鎖 {:?} 資源: {}", kind, event.request.url);
                interceptor
                    .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("處理攔截請求失敗: {}", e);
            }
        }
    });

    let enable = EnableParams::builder()
        .pattern(RequestPattern::builder().url_pattern("*").build())
        .build();
    if let Err(e) = page.execute(enable).await {
        task.abort();
        return Err(e);
    }
    Ok(task)
}

/// 開一個分頁並導覽到 url，等待網路閒置
async fn open_page(
    browser: &Browser,
    url: &Url,
    config: &ScraperConfig,
    policy: &ResourcePolicy,
    deadline: Instant,
) -> ScrapeResult<(BrowserContext, JoinHandle<()>)> {
    let failed = |e: CdpError| ScrapeError::navigation(url.as_str(), e);

    let page = browser.new_page("about:blank").await.map_err(failed)?;
    page.execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
        .await
        .map_err(failed)?;
    page.execute(SetLifecycleEventsEnabledParams::new(true))
        .await
        .map_err(failed)?;
    let mut lifecycle = page.event_listener::<EventLifecycleEvent>().await.map_err(failed)?;
    let interceptor = intercept_requests(&page, policy.clone()).await.map_err(failed)?;

    let navigated = timeout_at(deadline, async {
        page.goto(url.as_str()).await?;
        while let Some(event) = lifecycle.next().await {
            if event.name == NETWORK_IDLE {
                break;
            }
        }
        Ok::<_, CdpError>(())
    })
    .await;

    match navigated {
        Ok(Ok(())) => {
            debug!("分頁已達網路閒置: {}", url);
            Ok((BrowserContext::new(page, url.clone()), interceptor))
        }
        Ok(Err(e)) => {
            interceptor.abort();
            Err(failed(e))
        }
        Err(_) => {
            interceptor.abort();
            Err(ScrapeError::navigation(url.as_str(), "等待網路閒置逾時"))
        }
    }
}

/// 一次抓取所使用的瀏覽器工作階段
///
/// 關閉時結束所有分頁與瀏覽器程序；可重複呼叫。
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    interceptors: Vec<JoinHandle<()>>,
    pages: PageSession,
}

impl BrowserSession {
    /// 啟動瀏覽器並載入目標頁面與允許的內嵌框架；主文件載入失敗回傳 Navigation
    pub async fn open(config: &ScraperConfig) -> ScrapeResult<Self> {
        let target = Url::parse(&config.target_url)
            .map_err(|e| ScrapeError::navigation(config.target_url.as_str(), e))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(config.navigation_timeout())
            .arg("--disable-dev-shm-usage");
        if let Some(path) = &config.browser_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| ScrapeError::navigation(target.as_str(), format!("瀏覽器設定錯誤: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::navigation(target.as_str(), format!("無法啟動瀏覽器: {}", e)))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("瀏覽器事件處理錯誤: {}", e);
                }
            }
        });

        let mut session = Self {
            browser: Some(browser),
            handler: Some(handler),
            interceptors: Vec::new(),
            pages: PageSession::from_contexts(target.clone(), Vec::new()),
        };

        match session.load(config, target).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn load(&mut self, config: &ScraperConfig, target: Url) -> ScrapeResult<()> {
        let browser = self.browser.as_ref().ok_or(ScrapeError::SessionClosed)?;
        let deadline = Instant::now() + config.navigation_timeout();
        let policy = ResourcePolicy::new(config.blocked_resources.clone());

        let (main, interceptor) = open_page(browser, &target, config, &policy, deadline).await?;
        self.interceptors.push(interceptor);

        let frames: Vec<Url> = main
            .frame_urls()
            .await?
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

        let loaded = join_all(
            frames
                .iter()
                .map(|frame| open_page(browser, frame, config, &policy, deadline)),
        )
        .await;

        let mut contexts: Vec<Box<dyn RenderingContext>> = vec![Box::new(main)];
        for result in loaded {
            match result {
                Ok((ctx, interceptor)) => {
                    self.interceptors.push(interceptor);
                    contexts.push(Box::new(ctx));
                }
                Err(e) => warn!("內嵌框架載入失敗，略過: {}", e),
            }
        }

        info!("已開啟瀏覽器工作階段: {}（{} 個渲染環境）", target, contexts.len());
        self.pages = PageSession::from_contexts(target, contexts);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.browser.is_none()
    }

    pub fn context_urls(&self) -> Vec<&str> {
        self.pages.context_urls()
    }

    pub async fn extract(&self, extractor: &TableExtractor) -> ScrapeResult<Extraction> {
        if self.is_closed() {
            return Err(ScrapeError::SessionClosed);
        }
        self.pages.extract(extractor).await
    }

    /// 關閉分頁與瀏覽器；可重複呼叫
    pub async fn close(&mut self) {
        self.pages.close();
        for interceptor in self.interceptors.drain(..) {
            interceptor.abort();
        }

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("關閉瀏覽器失敗: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("等待瀏覽器程序結束失敗: {}", e);
            }
            debug!("已關閉瀏覽器工作階段: {}", self.pages.target());
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        for interceptor in self.interceptors.drain(..) {
            interceptor.abort();
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

/// 透過無頭瀏覽器抓取價格列表的報價來源
pub struct BrowserQuoteSource {
    config: ScraperConfig,
    extractor: TableExtractor,
}

impl BrowserQuoteSource {
    pub fn new(config: ScraperConfig) -> Self {
        let extractor = TableExtractor::new((&config).into());
        Self { config, extractor }
    }
}

#[async_trait]
impl QuoteSource for BrowserQuoteSource {
    fn describe(&self) -> String {
        format!("{} (browser)", self.config.target_url)
    }

    async fn fetch(&self) -> ScrapeResult<Extraction> {
        let mut session = BrowserSession::open(&self.config).await?;
        let result = session.extract(&self.extractor).await;
        session.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ResourceType::Document, ResourceKind::Document)]
    #[case(ResourceType::Script, ResourceKind::Script)]
    #[case(ResourceType::Image, ResourceKind::Image)]
    #[case(ResourceType::Stylesheet, ResourceKind::Stylesheet)]
    #[case(ResourceType::Font, ResourceKind::Font)]
    #[case(ResourceType::Media, ResourceKind::Media)]
    #[case(ResourceType::Xhr, ResourceKind::Other)]
    #[case(ResourceType::Fetch, ResourceKind::Other)]
    fn test_resource_kind(#[case] resource_type: ResourceType, #[case] expected: ResourceKind) {
        assert_eq!(resource_kind(&resource_type), expected);
    }

    #[test]
    fn test_default_policy_blocks_heavy_resources() {
        let policy = ResourcePolicy::new(ScraperConfig::default().blocked_resources);
        assert!(policy.allows_kind(resource_kind(&ResourceType::Document)));
        assert!(policy.allows_kind(resource_kind(&ResourceType::Script)));
        assert!(policy.allows_kind(resource_kind(&ResourceType::Xhr)));
        assert!(!policy.allows_kind(resource_kind(&ResourceType::Image)));
        assert!(!policy.allows_kind(resource_kind(&ResourceType::Font)));
    }

    #[tokio::test]
    async fn test_invalid_target_is_navigation_failure() {
        let config = ScraperConfig {
            target_url: "not a url".to_string(),
            ..Default::default()
        };
        let err = BrowserSession::open(&config).await.err().unwrap();
        assert!(matches!(err, ScrapeError::Navigation { .. }));
    }
}
