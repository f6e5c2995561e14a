use axum::Router;

use crate::api::{response::route_not_found, state::AppState};

pub mod scrape;
pub mod stocks;
pub mod system;

pub fn api_routes(state: AppState) -> Router {
    let api = Router::new().merge(stocks::routes()).merge(scrape::routes());

    Router::new()
        .merge(system::routes())
        .nest("/api", api)
        .fallback(route_not_found)
        .with_state(state)
}
