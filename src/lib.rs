// 模組定義
pub mod api;
pub mod config;
pub mod data_ingestion;
pub mod domain_types;
pub mod monitor;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;
