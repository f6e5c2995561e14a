use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use crate::data_ingestion::session::ResourceKind;
use crate::domain_types::HistoryBucket;

/// 應用程序配置結構
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證各個部分的配置
        if self.storage.backend == StorageBackend::Postgres {
            self.database.validate()?;
        }
        self.log.validate()?;
        self.server.validate()?;
        self.scraper.validate()?;
        self.scheduler.validate()?;
        self.storage.validate()?;

        Ok(())
    }
}

/// 數據庫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 完整連線字串，設定時優先於個別欄位
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

fn default_pg_port() -> u16 {
    5432
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match &self.url {
            Some(url) => {
                ValidationUtils::not_empty(url, "database.url")?;
                if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                    return Err(ValidationError::InvalidValue(format!(
                        "database.url 必須是 PostgreSQL 連線字串: {}",
                        url
                    )));
                }
            }
            None => {
                ValidationUtils::not_empty(&self.host, "database.host")?;
                ValidationUtils::not_empty(&self.username, "database.username")?;
                ValidationUtils::not_empty(&self.database, "database.database")?;
                ValidationUtils::in_range(self.port, 1, 65535, "database.port")?;
            }
        }
        ValidationUtils::in_range(
            self.max_connections,
            self.min_connections.max(1),
            1000,
            "database.max_connections",
        )?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// 獲取最大生命週期持續時間
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// 獲取獲取連接超時持續時間
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// 獲取閒置超時持續時間
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    /// 設定後額外寫入按日輪替的日誌檔
    #[serde(default)]
    pub directory: Option<String>,
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;
        ValidationUtils::one_of(
            &self.format.to_lowercase().as_str(),
            &["pretty", "json"],
            "log.format",
        )?;

        Ok(())
    }
}

/// 伺服器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// 空列表代表允許任何來源
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Validator for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.host, "server.host")?;
        ValidationUtils::in_range(self.port, 1, 65535, "server.port")?;
        ValidationUtils::in_range(self.request_timeout_secs, 1, 600, "server.request_timeout_secs")?;

        for origin in &self.cors_allowed_origins {
            if origin.parse::<axum::http::HeaderValue>().is_err() {
                return Err(ValidationError::InvalidValue(format!(
                    "server.cors_allowed_origins 含有無效來源: {}",
                    origin
                )));
            }
        }

        Ok(())
    }
}

/// 頁面取得方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeEngine {
    /// 無頭 Chrome，執行頁面腳本並等待網路閒置
    #[default]
    Browser,
    /// 直接以 HTTP 取得靜態 HTML，不執行腳本
    Http,
}

/// 抓取配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub engine: ScrapeEngine,
    /// Chrome 執行檔路徑；未設定時自動尋找
    pub browser_executable: Option<String>,
    pub target_url: String,
    /// 內嵌框架網址需包含的標記
    pub frame_marker: String,
    pub user_agent: String,
    pub navigation_timeout_secs: u64,
    pub row_wait_timeout_secs: u64,
    pub row_poll_interval_ms: u64,
    /// 表格列數需超過此值才視為已載入
    pub min_rows: usize,
    pub blocked_resources: Vec<ResourceKind>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            engine: ScrapeEngine::Browser,
            browser_executable: None,
            target_url: "https://ngxgroup.com/exchange/data/equities-price-list/".to_string(),
            frame_marker: "equities-price-listing".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            navigation_timeout_secs: 60,
            row_wait_timeout_secs: 30,
            row_poll_interval_ms: 500,
            min_rows: 5,
            blocked_resources: vec![
                ResourceKind::Image,
                ResourceKind::Stylesheet,
                ResourceKind::Font,
                ResourceKind::Media,
            ],
        }
    }
}

impl Validator for ScraperConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.target_url, "scraper.target_url")?;
        if url::Url::parse(&self.target_url).is_err() {
            return Err(ValidationError::InvalidValue(format!(
                "scraper.target_url 不是有效網址: {}",
                self.target_url
            )));
        }
        ValidationUtils::not_empty(&self.frame_marker, "scraper.frame_marker")?;
        ValidationUtils::not_empty(&self.user_agent, "scraper.user_agent")?;
        ValidationUtils::in_range(self.navigation_timeout_secs, 1, 600, "scraper.navigation_timeout_secs")?;
        ValidationUtils::in_range(self.row_wait_timeout_secs, 1, 600, "scraper.row_wait_timeout_secs")?;
        ValidationUtils::in_range(self.row_poll_interval_ms, 10, 60_000, "scraper.row_poll_interval_ms")?;
        if let Some(path) = &self.browser_executable {
            ValidationUtils::not_empty(path, "scraper.browser_executable")?;
        }

        Ok(())
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn row_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.row_wait_timeout_secs)
    }

    pub fn row_poll_interval(&self) -> Duration {
        Duration::from_millis(self.row_poll_interval_ms)
    }
}

/// 排程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 每日執行時間，格式 HH:MM
    pub run_at: String,
    /// IANA 時區名稱
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "15:30".to_string(),
            timezone: "Africa/Lagos".to_string(),
        }
    }
}

impl Validator for SchedulerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.run_at_time()?;
        self.tz()?;
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn run_at_time(&self) -> Result<NaiveTime, ValidationError> {
        NaiveTime::parse_from_str(self.run_at.trim(), "%H:%M").map_err(|_| {
            ValidationError::InvalidValue(format!(
                "scheduler.run_at 必須為 HH:MM 格式: {}",
                self.run_at
            ))
        })
    }

    pub fn tz(&self) -> Result<Tz, ValidationError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            ValidationError::InvalidValue(format!(
                "scheduler.timezone 不是有效的 IANA 時區: {}",
                self.timezone
            ))
        })
    }
}

/// 儲存後端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

/// 儲存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub history_bucket: HistoryBucket,
    /// 未設定時永久保留
    pub retention_days: Option<u32>,
    /// 市場概要統計使用的最近記錄數
    pub summary_window: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            history_bucket: HistoryBucket::Day,
            retention_days: None,
            summary_window: 200,
        }
    }
}

impl Validator for StorageConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(days) = self.retention_days {
            ValidationUtils::in_range(days, 1, 36_500, "storage.retention_days")?;
        }
        ValidationUtils::in_range(self.summary_window, 1, 100_000, "storage.summary_window")?;
        Ok(())
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_parsing() {
        let cfg = SchedulerConfig {
            enabled: true,
            run_at: "09:05".to_string(),
            timezone: "Africa/Lagos".to_string(),
        };
        assert_eq!(cfg.run_at_time().unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Africa::Lagos);

        let bad = SchedulerConfig {
            run_at: "25:00".to_string(),
            ..cfg.clone()
        };
        assert!(bad.validate().is_err());

        let bad_tz = SchedulerConfig {
            timezone: "Mars/Olympus".to_string(),
            ..cfg
        };
        assert!(bad_tz.validate().is_err());
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let cfg = DatabaseConfig {
            url: Some("postgres://user:pw@localhost/listing".to_string()),
            host: String::new(),
            port: 5432,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            max_connections: 5,
            min_connections: 1,
            max_lifetime_secs: 1800,
            acquire_timeout_secs: 3,
            idle_timeout_secs: 600,
        };
        assert!(cfg.validate().is_ok());

        let bad = DatabaseConfig {
            url: Some("mysql://localhost/listing".to_string()),
            ..cfg.clone()
        };
        assert!(bad.validate().is_err());

        let missing_host = DatabaseConfig { url: None, ..cfg };
        assert!(missing_host.validate().is_err());
    }

    #[test]
    fn test_scraper_defaults_are_valid() {
        let cfg = ScraperConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.min_rows, 5);
        assert_eq!(cfg.row_wait_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.navigation_timeout(), Duration::from_secs(60));
        assert!(cfg.blocked_resources.contains(&ResourceKind::Font));
        assert_eq!(cfg.engine, ScrapeEngine::Browser);
    }

    #[test]
    fn test_blank_browser_executable_is_rejected() {
        let cfg = ScraperConfig {
            browser_executable: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
