pub mod quote;

pub use quote::{QuoteHistoryPoint, QuoteInsert, StoredQuote};
