mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use equities_listing_server::data_ingestion::{
    ExtractorSettings, RenderingContext, ScrapeError, ScrapeResult, TableExtractor,
};
use equities_listing_server::data_ingestion::session::parse_table_rows;
use rust_decimal_macros::dec;

use common::{full_row, listing_table};

struct StaticContext {
    url: String,
    rows: Vec<Vec<String>>,
}

impl StaticContext {
    fn boxed(url: &str, html: &str) -> Box<dyn RenderingContext> {
        Box::new(Self {
            url: url.to_string(),
            rows: parse_table_rows(html),
        })
    }
}

#[async_trait]
impl RenderingContext for StaticContext {
    fn url(&self) -> &str {
        &self.url
    }

    async fn count_rows(&self) -> ScrapeResult<usize> {
        Ok(self.rows.iter().filter(|cells| !cells.is_empty()).count())
    }

    async fn read_rows(&self) -> ScrapeResult<Vec<Vec<String>>> {
        Ok(self.rows.clone())
    }
}

fn extractor() -> TableExtractor {
    TableExtractor::new(ExtractorSettings {
        frame_marker: "equities-price-listing".to_string(),
        min_rows: 5,
        wait_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
    })
}

#[test]
fn test_short_row_is_dropped_from_three_row_table() {
    let html = listing_table(&[
        full_row("ZENITHBANK", "ZENITH BANK PLC", "36.75"),
        vec!["MTNN", "MTN NIGERIA", "200", "201", "199", "200"],
        full_row("GTCO", "GUARANTY TRUST", "40.50"),
    ]);

    let extraction = extractor().decode_rows("https://a.example/", parse_table_rows(&html));

    let symbols: Vec<&str> = extraction.records.iter().map(|q| q.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["ZENITHBANK", "GTCO"]);
    assert_eq!(extraction.diagnostics.rows_seen, 4);
    assert_eq!(extraction.diagnostics.skipped_rows, 1);
    assert_eq!(extraction.diagnostics.malformed.len(), 1);
    assert_eq!(extraction.diagnostics.malformed[0].row_index, 2);
}

#[test]
fn test_cell_values_are_normalized() {
    let html = listing_table(&[vec![
        " dangcem* ",
        "  DANGOTE CEMENT PLC ",
        "480.00",
        "482.10",
        "479.00",
        "481.50",
        "-",
        "1,234,567",
    ]]);

    let extraction = extractor().decode_rows("https://a.example/", parse_table_rows(&html));
    let quote = &extraction.records[0];

    assert_eq!(quote.symbol, "DANGCEM");
    assert_eq!(quote.security_name, "DANGOTE CEMENT PLC");
    assert_eq!(quote.close, dec!(481.50));
    assert_eq!(quote.change, dec!(0));
    assert_eq!(quote.daily_volume, 1_234_567);
    assert_eq!(quote.daily_value, dec!(0));
}

#[tokio::test]
async fn test_extracts_from_listing_frame() {
    let main = listing_table(&[
        full_row("AAA", "NOT THE LISTING", "1"),
        full_row("BBB", "NOT THE LISTING", "1"),
    ]);
    let rows: Vec<Vec<&str>> = ["ACCESS", "FBNH", "GTCO", "MTNN", "UBA", "ZENITHBANK"]
        .iter()
        .map(|s| full_row(s, "LISTED PLC", "10.00"))
        .collect();
    let frame = listing_table(&rows);

    let contexts = vec![
        StaticContext::boxed("https://ngx.example/exchange/data/", &main),
        StaticContext::boxed("https://doclib.example/equities-price-listing/", &frame),
    ];

    let extraction = extractor().extract(&contexts).await.unwrap();
    assert_eq!(extraction.source_url, "https://doclib.example/equities-price-listing/");
    assert_eq!(extraction.records.len(), 6);
    assert_eq!(extraction.records[0].symbol, "ACCESS");
    assert_eq!(extraction.records[5].symbol, "ZENITHBANK");
}

#[tokio::test]
async fn test_small_table_times_out() {
    let rows: Vec<Vec<&str>> = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|s| full_row(s, "FIVE ROWS", "1.00"))
        .collect();
    let contexts = vec![StaticContext::boxed("https://a.example/", &listing_table(&rows))];

    let err = extractor().extract(&contexts).await.unwrap_err();
    assert_matches!(err, ScrapeError::ExtractionTimeout { rows: 5, .. });
}

#[tokio::test]
async fn test_table_without_valid_rows_is_empty_not_success() {
    let rows: Vec<Vec<&str>> = ["A", "B", "C", "D", "E", "F"]
        .iter()
        .map(|s| full_row(s, "ZERO CLOSE", "0"))
        .collect();
    let contexts = vec![StaticContext::boxed("https://a.example/", &listing_table(&rows))];

    let err = extractor().extract(&contexts).await.unwrap_err();
    assert_matches!(
        err,
        ScrapeError::ExtractionEmpty {
            rows_seen: 7,
            malformed: 0,
            rejected: 6
        }
    );
}
