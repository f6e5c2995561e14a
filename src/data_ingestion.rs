//! 報價抓取流程
//!
//! 頁面工作階段（無頭瀏覽器或 HTTP）→ 表格抽取（使用欄位正規化）→ 原始報價 → 寫入儲存

pub mod browser;
pub mod database_writer;
pub mod error;
pub mod extractor;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod session;

pub use browser::{BrowserQuoteSource, BrowserSession};
pub use database_writer::write_quotes;
pub use error::{ScrapeError, ScrapeResult};
pub use extractor::{
    Extraction, ExtractionDiagnostics, ExtractorSettings, MalformedRow, RejectReason, RejectedRow, RenderingContext,
    TableExtractor,
};
pub use normalizer::{clean_symbol, clean_text, parse_number, parse_volume};
pub use pipeline::{QuoteSource, ScrapeCycle, ScrapeReport, Trigger, SAMPLE_SIZE};
pub use schema::{QuoteField, RowSchema, RowShapeError};
pub use session::{HtmlContext, HttpQuoteSource, PageSession, ResourceKind, ResourcePolicy};
