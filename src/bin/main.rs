use anyhow::{anyhow, Result};
use equities_listing_server::config::{self, Environment};
use equities_listing_server::monitor::init_logging;
use equities_listing_server::server::ServerBuilder;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化配置
    let app_config = config::init_config()?;

    // 初始化日誌系統，guard 需保留到程式結束
    let _log_guard = init_logging(&app_config.log)?;

    let environment = Environment::from_env();
    info!("以 {:?} 環境啟動，抓取目標: {}", environment, app_config.scraper.target_url);

    let server = ServerBuilder::new()
        .with_config(app_config.clone())
        .with_environment(environment)
        .build()
        .await?;

    info!("伺服器初始化完成，監聽 {}:{}", app_config.server.host, app_config.server.port);

    server
        .run(async {
            if let Err(err) = signal::ctrl_c().await {
                error!("無法監聽關閉信號: {}", err);
            }
        })
        .await
        .map_err(|e| anyhow!("伺服器異常結束: {}", e))?;

    info!("伺服器已停止");
    Ok(())
}
