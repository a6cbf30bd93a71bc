use crate::error::{AppError, AppResult, LoggedJson, LoggedQuery};
use crate::utilization::cache::UtilizationCache;
use crate::utilization::repository;
use crate::utilization::types::*;
use crate::utilization::UtilizationState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

/// Macro to handle cache hit/miss pattern. Errors returned from `$compute`
/// short-circuit before anything is stored. A zero TTL disables the cache.
macro_rules! cached_or_compute {
    ($state:expr, $endpoint:expr, $request:expr, $compute:expr) => {{
        let key = if $state.config.cache_ttl_secs > 0 {
            Some(
                UtilizationCache::cache_key($endpoint, &$request)
                    .map_err(|e| AppError::Internal(format!("cache key: {e}")))?,
            )
        } else {
            None
        };
        if let Some(cached) = key.as_deref().and_then(|k| $state.cache.get(k)) {
            let val: serde_json::Value = serde_json::from_str(&cached)
                .map_err(|e| AppError::Internal(format!("cache deserialize: {e}")))?;
            return Ok(Json(val));
        }
        let result = $compute;
        let val = serde_json::to_value(&result)
            .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
        if let Some(key) = key {
            $state.cache.insert(key, val.to_string());
        }
        Ok(Json(val))
    }};
}

/// POST /v1/utilization/monthly
pub async fn monthly_utilization(
    State(state): State<Arc<UtilizationState>>,
    LoggedJson(request): LoggedJson<MonthlyUtilizationRequest>,
) -> AppResult<Json<serde_json::Value>> {
    request.validate().map_err(AppError::Validation)?;

    cached_or_compute!(state, "monthly", request, {
        let groups =
            repository::fetch_monthly_utilization(&state.conn, &request, chrono::Utc::now())
                .await?;
        MonthlyUtilizationResponse::from(groups)
    })
}

/// POST /v1/utilization/counts
pub async fn group_counts(
    State(state): State<Arc<UtilizationState>>,
    LoggedJson(request): LoggedJson<MonthlyUtilizationRequest>,
) -> AppResult<Json<serde_json::Value>> {
    request.validate().map_err(AppError::Validation)?;

    cached_or_compute!(state, "counts", request, {
        let groups =
            repository::fetch_group_counts(&state.conn, &request, chrono::Utc::now()).await?;
        MonthlyUtilizationResponse::from(groups)
    })
}

/// POST /v1/utilization/lessors
pub async fn lessors(
    State(state): State<Arc<UtilizationState>>,
    LoggedJson(request): LoggedJson<LessorListRequest>,
) -> AppResult<Json<serde_json::Value>> {
    request.validate().map_err(AppError::Validation)?;

    cached_or_compute!(state, "lessors", request, {
        let lessors = repository::fetch_lessors(&state.conn, &request).await?;
        LessorsResponse { lessors }
    })
}

/// GET /v1/utilization/options
pub async fn filter_options(
    State(state): State<Arc<UtilizationState>>,
    LoggedQuery(scope): LoggedQuery<FleetScope>,
) -> AppResult<Json<serde_json::Value>> {
    cached_or_compute!(state, "options", scope, {
        repository::resolve_filter_options(&state.conn, &scope).await?
    })
}

/// GET /health
pub async fn health(State(state): State<Arc<UtilizationState>>) -> Json<HealthResponse> {
    let db_ok = state
        .conn
        .query(|conn| conn.execute_batch("SELECT 1"))
        .await
        .is_ok();

    Json(HealthResponse {
        status: if db_ok {
            "ok".into()
        } else {
            "degraded".into()
        },
        db_ok,
    })
}

pub async fn not_found() -> AppError {
    AppError::NotFound("no such route".to_string())
}
