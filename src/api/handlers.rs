pub mod quotes;
pub mod scrape;
pub mod system;
