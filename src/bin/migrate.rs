use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use equities_listing_server::{config, storage};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "migrate", about = "equities-listing-server 數據庫遷移工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 運行所有未應用的遷移
    Run,

    /// 檢查遷移狀態
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日誌系統
    tracing_subscriber::fmt()
        .with_env_filter("equities_listing_server=info,migrate=info")
        .with_span_events(FmtSpan::CLOSE)
        .init();

    // 解析命令行參數
    let cli = Cli::parse();

    config::init_config().context("無法載入配置")?;
    let pool = storage::database::get_db_pool()
        .await
        .context("無法初始化資料庫連接池")?;

    match cli.command {
        Commands::Run => {
            info!("開始運行資料庫遷移...");
            storage::run_migrations(pool).await.context("資料庫遷移執行失敗")?;
            info!("資料庫遷移完成！");
        }
        Commands::Status => {
            info!("檢查資料庫遷移狀態...");
            let states = storage::migration_status(pool).await.context("無法讀取遷移狀態")?;
            let pending = states.iter().filter(|s| !s.applied).count();
            for state in &states {
                let mark = if state.applied { "已應用" } else { "待執行" };
                println!("{:>16}  {:<6}  {}", state.version, mark, state.description);
            }
            info!("共 {} 個遷移，{} 個待執行", states.len(), pending);
        }
    }

    Ok(())
}
