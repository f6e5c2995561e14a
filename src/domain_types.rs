// domain_types.rs - 領域模型
//
// 報價記錄、衍生欄位（漲跌幅）、市場概要與呈現格式。

pub mod format;
pub mod quote;
pub mod summary;

pub use format::{format_currency, format_percent, FormattedQuote};
pub use quote::{change_percent, HistoryBucket, PriceDirection, QuoteRecord, QuoteValues, RawQuote};
pub use summary::MarketSummary;
