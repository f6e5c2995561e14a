use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::api::{response::set_expose_error_details, AppState, RestApi};
use crate::config::{ApplicationConfig, Environment, ScrapeEngine, ScraperConfig, StorageBackend};
use crate::data_ingestion::{BrowserQuoteSource, HttpQuoteSource, QuoteSource, ScrapeCycle};
use crate::query::QuoteQueryService;
use crate::scheduler::DailyScheduler;
use crate::server::{ServerError, ServerResult, ServerState};
use crate::storage::{
    database::init_db_pool,
    migrations::run_migrations,
    repository::{InMemoryQuoteRepository, PgQuoteRepository, QuoteRepository},
};

/// 伺服器實例
pub struct Server {
    /// 伺服器狀態
    state: Arc<RwLock<ServerState>>,
    rest_api: RestApi,
    app_state: AppState,
    scheduler: Option<DailyScheduler>,
}

impl Server {
    /// 處理器共用狀態
    pub fn app_state(&self) -> &AppState {
        &self.app_state
    }

    /// 獲取伺服器狀態
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// 啟動排程與 REST API，直到 shutdown 完成
    pub async fn run<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.rest_api.addr().map_err(|e| ServerError::Config(format!("{:#}", e)))?;
        let listener = TcpListener::bind(addr).await?;
        self.run_on(listener, shutdown).await
    }

    /// 在既有的 listener 上執行
    pub async fn run_on<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let scheduler = self
            .scheduler
            .map(|scheduler| scheduler.spawn(self.app_state.cycle.clone(), stop_rx));

        *self.state.write().await = ServerState::Running;

        let state = self.state.clone();
        let on_shutdown = async move {
            shutdown.await;
            info!("接收到關閉信號，正在退出...");
            *state.write().await = ServerState::ShuttingDown;
            let _ = stop_tx.send(true);
        };

        let served = self.rest_api.serve_on(listener, on_shutdown).await;

        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                warn!("排程任務異常結束: {}", e);
            }
        }
        *self.state.write().await = ServerState::Stopped;

        served.map_err(|e| ServerError::Runtime(format!("{:#}", e)))
    }
}

/// 伺服器構建器
pub struct ServerBuilder {
    config: Option<ApplicationConfig>,
    environment: Environment,
    repository: Option<Arc<dyn QuoteRepository>>,
    source: Option<Arc<dyn QuoteSource>>,
}

impl ServerBuilder {
    /// 創建新的伺服器構建器
    pub fn new() -> Self {
        Self {
            config: None,
            environment: Environment::from_env(),
            repository: None,
            source: None,
        }
    }

    pub fn with_config(mut self, config: ApplicationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// 指定儲存實作，不再依配置建立
    pub fn with_repository(mut self, repository: Arc<dyn QuoteRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// 指定報價來源，不再依 scraper.engine 建立
    pub fn with_source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.source = Some(source);
        self
    }

    async fn build_repository(config: &ApplicationConfig) -> ServerResult<Arc<dyn QuoteRepository>> {
        match config.storage.backend {
            StorageBackend::Postgres => {
                let pool = init_db_pool(&config.database)
                    .await
                    .map_err(|e| ServerError::Initialization(format!("無法連接資料庫: {:#}", e)))?;
                run_migrations(&pool)
                    .await
                    .map_err(|e| ServerError::Initialization(format!("資料庫遷移失敗: {:#}", e)))?;
                Ok(Arc::new(PgQuoteRepository::new(pool)))
            }
            StorageBackend::Memory => {
                warn!("使用記憶體儲存，重新啟動後資料將遺失");
                Ok(Arc::new(InMemoryQuoteRepository::new()))
            }
        }
    }

    fn build_source(config: &ScraperConfig) -> Arc<dyn QuoteSource> {
        match config.engine {
            ScrapeEngine::Browser => Arc::new(BrowserQuoteSource::new(config.clone())),
            ScrapeEngine::Http => {
                info!("使用 HTTP 抓取，頁面腳本不會執行");
                Arc::new(HttpQuoteSource::new(config.clone()))
            }
        }
    }

    /// 構建伺服器
    pub async fn build(self) -> ServerResult<Server> {
        let config = self
            .config
            .ok_or_else(|| ServerError::Config("未提供應用程序配置".to_string()))?;

        set_expose_error_details(!self.environment.is_production());

        let repository = match self.repository {
            Some(repository) => repository,
            None => Self::build_repository(&config).await?,
        };
        let source = self
            .source
            .unwrap_or_else(|| Self::build_source(&config.scraper));

        let cycle = Arc::new(
            ScrapeCycle::new(source, repository.clone())
                .with_history_bucket(config.storage.history_bucket)
                .with_retention(config.storage.retention()),
        );
        let query = QuoteQueryService::new(repository).with_summary_window(config.storage.summary_window);

        let scheduler = if config.scheduler.enabled {
            Some(DailyScheduler::from_config(&config.scheduler)?)
        } else {
            info!("排程已停用，只接受手動觸發");
            None
        };

        let app_state = AppState::new(query, cycle);
        let rest_api = RestApi::new(config.server.clone(), app_state.clone());

        Ok(Server {
            state: Arc::new(RwLock::new(ServerState::Initializing)),
            rest_api,
            app_state,
            scheduler,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
