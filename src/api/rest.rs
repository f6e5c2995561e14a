// src/api/rest.rs
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use super::{routes::api_routes, state::AppState};
use crate::config::ServerConfig;

pub struct RestApi {
    server_config: ServerConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(server_config: ServerConfig, state: AppState) -> Self {
        Self { server_config, state }
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let ip = self
            .server_config
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("無效的監聽位址: {}", self.server_config.host))?;
        Ok(SocketAddr::from((ip, self.server_config.port)))
    }

    /// 啟動服務器，shutdown 完成時停止接受新連線
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("無法綁定 {}", addr))?;
        self.serve_on(listener, shutdown).await
    }

    /// 在既有的 listener 上提供服務
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.build_app()?;
        info!("Starting REST API server on {}", listener.local_addr()?);

        axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

        info!("REST API server stopped");
        Ok(())
    }

    pub fn build_app(&self) -> Result<Router> {
        let app = api_routes(self.state.clone())
            // 追蹤層
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            // CORS
            .layer(self.build_cors_layer()?)
            // 超時設置
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.server_config.request_timeout_secs,
            )));

        Ok(app)
    }

    fn build_cors_layer(&self) -> Result<CorsLayer> {
        let cors = CorsLayer::new()
            .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(vec![header::CONTENT_TYPE, header::ACCEPT]);

        // 根據配置設置允許的來源
        let origins = &self.server_config.cors_allowed_origins;
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            return Ok(cors.allow_origin(Any));
        }

        let origins = origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("無效的 CORS 來源: {}", origin))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(cors.allow_origin(origins))
    }
}
