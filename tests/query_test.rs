mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::TimeDelta;
use equities_listing_server::domain_types::MarketSummary;
use equities_listing_server::query::{
    HistoryRequest, LatestRequest, ListRequest, QueryError, QuoteQueryService, SearchRequest, SummaryRequest,
};
use equities_listing_server::storage::InMemoryQuoteRepository;
use rust_decimal_macros::dec;

use common::{base_time, raw_quote, seeded_repository, store};

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

async fn service() -> QuoteQueryService {
    QuoteQueryService::new(seeded_repository().await)
}

#[tokio::test]
async fn test_list_filters_by_symbol_and_sorts_by_close_desc() {
    let service = service().await;
    let request = ListRequest {
        symbol: some("ZEN"),
        sort_by: some("close"),
        sort_order: some("desc"),
        limit: some("10"),
        ..Default::default()
    };

    let page = service.list_filtered(&request).await.unwrap();

    assert_eq!(page.total, 15);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.data.len(), 10);
    assert!(page.data.iter().all(|q| q.symbol.starts_with("ZEN")));
    assert!(page.data.iter().any(|q| q.symbol == "ZENITHBANK"));
    assert!(page.data.iter().any(|q| q.symbol == "ZENON"));
    assert!(!page.data.iter().any(|q| q.symbol == "MTN" || q.symbol == "DANGCEM"));
    assert_eq!(page.data[0].symbol, "ZENITHBANK");
    assert_eq!(page.data[0].close, dec!(34));
    assert!(page.data.windows(2).all(|w| w[0].close >= w[1].close));
}

#[tokio::test]
async fn test_list_second_page_holds_remainder() {
    let service = service().await;
    let request = ListRequest {
        symbol: some("zen"),
        sort_by: some("close"),
        sort_order: some("desc"),
        limit: some("10"),
        page: some("2"),
        ..Default::default()
    };

    let page = service.list_filtered(&request).await.unwrap();
    assert_eq!(page.page, 2);
    assert_eq!(page.data.len(), 5);
    assert!(page.data.iter().all(|q| q.symbol.starts_with("ZEN")));
    assert_eq!(page.data.last().unwrap().close, dec!(20));
}

#[tokio::test]
async fn test_list_rejects_bad_parameters() {
    let service = service().await;

    let err = service
        .list_filtered(&ListRequest {
            page: some("0"),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, QueryError::InvalidParameter { name: "page", .. });

    let err = service
        .list_filtered(&ListRequest {
            start_date: some("2024-06-05"),
            end_date: some("2024-06-01"),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, QueryError::InvalidParameter { name: "startDate", .. });
}

#[tokio::test]
async fn test_history_is_range_bounded_newest_first_and_limited() {
    let repo = Arc::new(InMemoryQuoteRepository::new());
    for day in 0..8i64 {
        store(
            repo.as_ref(),
            raw_quote("MTN", "MTN NIGERIA", dec!(200) + rust_decimal::Decimal::from(day), dec!(1)),
            base_time() + TimeDelta::days(day),
        )
        .await;
    }
    let service = QuoteQueryService::new(repo);

    let history = service
        .history(
            "mtn",
            &HistoryRequest {
                start_date: some("2024-06-04"),
                end_date: some("2024-06-09"),
                limit: some("5"),
            },
        )
        .await
        .unwrap();

    // 06-03 與 06-10 落在範圍外，06-04 因 limit 被截掉
    let expected: Vec<_> = (2..=6).rev().map(|day| base_time() + TimeDelta::days(day)).collect();
    let scraped: Vec<_> = history.iter().map(|point| point.scraped_at).collect();
    assert_eq!(scraped, expected);

    let lower = base_time() + TimeDelta::days(1) - TimeDelta::hours(14) - TimeDelta::minutes(30);
    let upper = base_time() + TimeDelta::days(7) - TimeDelta::hours(14) - TimeDelta::minutes(30);
    assert!(history.iter().all(|point| point.scraped_at >= lower && point.scraped_at < upper));

    let in_range = service
        .history(
            "MTN",
            &HistoryRequest {
                start_date: some("2024-06-04"),
                end_date: some("2024-06-09"),
                limit: some("50"),
            },
        )
        .await
        .unwrap();
    assert_eq!(in_range.len(), 6);
    assert_eq!(in_range.last().unwrap().scraped_at, base_time() + TimeDelta::days(1));
}

#[tokio::test]
async fn test_latest_returns_one_row_per_symbol() {
    let service = service().await;
    let latest = service.latest(&LatestRequest::default()).await.unwrap();

    let symbols: Vec<&str> = latest.iter().map(|q| q.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["DANGCEM", "MTN", "ZENITHBANK", "ZENON"]);

    let zenith = latest.iter().find(|q| q.symbol == "ZENITHBANK").unwrap();
    assert_eq!(zenith.close, dec!(34));
    assert_eq!(zenith.scraped_at, base_time() + TimeDelta::hours(14));

    let zenon = latest.iter().find(|q| q.symbol == "ZENON").unwrap();
    assert_eq!(zenon.close, dec!(33));
    assert_eq!(zenon.scraped_at, base_time() + TimeDelta::hours(13));
}

#[tokio::test]
async fn test_by_symbol_missing_is_none() {
    let service = service().await;
    assert!(service.by_symbol("NOPE").await.unwrap().is_none());
    assert_eq!(service.by_symbol("dangcem").await.unwrap().unwrap().close, dec!(480));
}

#[tokio::test]
async fn test_summary_counts_directions() {
    let repo = Arc::new(InMemoryQuoteRepository::new());
    store(repo.as_ref(), raw_quote("UP", "UP PLC", dec!(11), dec!(1)), base_time()).await;
    store(repo.as_ref(), raw_quote("DOWN", "DOWN PLC", dec!(9), dec!(-1)), base_time()).await;
    store(repo.as_ref(), raw_quote("FLAT", "FLAT PLC", dec!(10), dec!(0)), base_time()).await;
    let service = QuoteQueryService::new(repo);

    let summary = service.summary(&SummaryRequest::default()).await.unwrap();

    assert_eq!(summary.total_stocks, 3);
    assert_eq!(summary.gainers, 1);
    assert_eq!(summary.losers, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.total_volume, 30_000);
    assert_eq!(summary.avg_price, dec!(10));
}

#[tokio::test]
async fn test_summary_does_not_deduplicate_symbols() {
    let service = service().await;
    let summary = service
        .summary(&SummaryRequest {
            window: some("10"),
            ..Default::default()
        })
        .await
        .unwrap();

    // 最近十筆全是 ZENITHBANK 與 ZENON 的歷史
    assert_eq!(summary.total_stocks, 10);
    assert_eq!(summary.gainers, 10);
}

#[tokio::test]
async fn test_summary_of_empty_store_is_all_zero() {
    let service = QuoteQueryService::new(Arc::new(InMemoryQuoteRepository::new()));
    let summary = service.summary(&SummaryRequest::default()).await.unwrap();
    assert_eq!(summary, MarketSummary::default());
}

#[tokio::test]
async fn test_search_matches_symbol_or_name() {
    let service = service().await;

    let by_name = service
        .search(&SearchRequest {
            q: some("cement"),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].symbol, "DANGCEM");

    let by_symbol = service
        .search(&SearchRequest {
            q: some("N"),
            limit: None,
        })
        .await
        .unwrap();
    let symbols: Vec<&str> = by_symbol.iter().map(|q| q.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["DANGCEM", "MTN", "ZENITHBANK", "ZENON"]);

    let err = service.search(&SearchRequest::default()).await.unwrap_err();
    assert_matches!(err, QueryError::InvalidParameter { name: "q", .. });
}
