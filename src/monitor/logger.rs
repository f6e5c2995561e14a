// monitor/logger.rs - 日誌記錄模組
//
// 安裝全域 tracing subscriber。RUST_LOG 優先於配置檔的等級；
// 設定 directory 時另外輸出每日輪替的檔案。

use std::str::FromStr;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogConfig;
use crate::monitor::{MonitorError, MonitorResult};

/// 日誌輸出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(MonitorError::LoggerError(format!("不支援的日誌格式: {}", other))),
        }
    }
}

/// 日誌檔名前綴
const LOG_FILE_PREFIX: &str = "equities-listing.log";

/// 建立過濾器：RUST_LOG 存在時優先使用
pub fn build_filter(level: &str) -> MonitorResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(format!("{},sqlx=warn,hyper=info,tower_http=info", level))
            .map_err(|e| MonitorError::LoggerError(format!("無效的日誌等級 {}: {}", level, e))),
    }
}

/// 初始化日誌系統；回傳的 guard 需持有到程式結束，否則檔案日誌會遺失
pub fn init_logging(config: &LogConfig) -> MonitorResult<Option<WorkerGuard>> {
    let format = LogFormat::from_str(&config.format)?;
    let filter = build_filter(&config.level)?;

    let console = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| MonitorError::InitializationError(format!("設置日誌系統失敗: {}", e)))?;

    info!("日誌系統初始化完成 (level = {}, format = {})", config.level, config.format);
    Ok(guard)
}
