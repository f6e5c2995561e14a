use crate::config::{self, DatabaseConfig};
use anyhow::{anyhow, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::info;

/// 全局報價資料庫連接池
static QUOTE_DB_POOL: OnceCell<PgPool> = OnceCell::const_new();

/// 資料庫池類型
pub type DatabasePool = PgPool;

/// 連線參數：設定 url 時優先使用，否則由各欄位組成
fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = match &config.url {
        Some(url) => PgConnectOptions::from_str(url)?,
        None => PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database),
    };

    Ok(options.disable_statement_logging())
}

/// 初始化報價資料庫連接池
pub async fn init_db_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect_with(connect_options(config)?)
        .await?;

    // 測試連接
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("資料庫連接池已建立 (max_connections = {})", config.max_connections);

    Ok(pool)
}

/// 獲取全局資料庫連接池，第一次呼叫時依全局配置建立
pub async fn get_db_pool() -> Result<&'static PgPool> {
    QUOTE_DB_POOL
        .get_or_try_init(|| async {
            let app_config = config::get_config().ok_or_else(|| anyhow!("配置尚未初始化"))?;
            init_db_pool(&app_config.database).await
        })
        .await
}
