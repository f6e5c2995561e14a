// api.rs - API服務模組，宣告子模組
//
// API服務模組提供外部接口，實現：
// - 報價查詢與彙總的 RESTful API
// - 手動觸發抓取週期
// - 統一的回應封套與錯誤格式

/// REST API實現
pub mod rest;
/// API路由定義
pub mod routes;
/// API處理器模組
pub mod handlers;
/// 回應封套與錯誤
pub mod response;
/// 處理器共用狀態
pub mod state;

pub use response::{ApiError, ApiResponse, ApiResult, QuoteView};
pub use rest::RestApi;
pub use state::AppState;
