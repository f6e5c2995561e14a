use thiserror::Error;

use crate::config::ValidationError;

/// 伺服器錯誤類型
#[derive(Error, Debug)]
pub enum ServerError {
    /// 配置錯誤
    #[error("配置錯誤: {0}")]
    Config(String),

    /// 配置驗證錯誤
    #[error("配置驗證錯誤: {0}")]
    Validation(#[from] ValidationError),

    /// IO 錯誤
    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),

    /// 初始化錯誤
    #[error("初始化錯誤: {0}")]
    Initialization(String),

    /// 運行時錯誤
    #[error("運行時錯誤: {0}")]
    Runtime(String),
}

/// 伺服器結果類型別名
pub type ServerResult<T> = Result<T, ServerError>;
