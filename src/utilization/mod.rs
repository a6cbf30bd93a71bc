pub mod cache;
pub mod conn;
pub mod dimension;
pub mod handler;
pub mod mapper;
pub mod queries;
pub mod repository;
pub mod template;
pub mod types;

use crate::config::{UtilizationConfig, WarehouseConfig};
use axum::routing::{get, post};
use axum::Router;
use cache::UtilizationCache;
use conn::DuckDbConn;
use std::sync::Arc;

/// Shared state for utilization endpoints.
pub struct UtilizationState {
    pub conn: DuckDbConn,
    pub cache: UtilizationCache,
    pub config: UtilizationConfig,
}

impl UtilizationState {
    pub fn new(warehouse: &WarehouseConfig, config: UtilizationConfig) -> Result<Self, String> {
        let conn = DuckDbConn::new(warehouse)?;
        Ok(Self::with_conn(conn, config))
    }

    pub fn with_conn(conn: DuckDbConn, config: UtilizationConfig) -> Self {
        let cache = UtilizationCache::new(config.cache_ttl_secs, config.cache_capacity);
        Self {
            conn,
            cache,
            config,
        }
    }
}

pub fn router(state: Arc<UtilizationState>) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route(
            "/v1/utilization/monthly",
            post(handler::monthly_utilization),
        )
        .route("/v1/utilization/counts", post(handler::group_counts))
        .route("/v1/utilization/lessors", post(handler::lessors))
        .route("/v1/utilization/options", get(handler::filter_options))
        .fallback(handler::not_found)
        .with_state(state)
}
