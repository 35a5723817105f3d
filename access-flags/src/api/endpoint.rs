use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{debug_handler, Json};

use crate::api::errors::{ClientFacingError, FlagError};
use crate::api::types::{
    decode_json, AccessCheckBody, InvalidateBody, UsageEventBody, UsageStatsParams,
};
use crate::flags::flag_decision::AccessDecision;
use crate::router;
use crate::usage::usage_models::UsageStats;
use crate::usage::usage_stats::DEFAULT_STATS_DAYS;

/// Access check endpoint.
/// Allowed decisions come back as 200; denials are rendered by [`FlagError::AccessDenied`].
#[debug_handler]
pub async fn access(
    State(state): State<router::State>,
    body: Bytes,
) -> Result<Json<AccessDecision>, FlagError> {
    let request: AccessCheckBody = decode_json(&body)?;

    let decision = state
        .service
        .check_access(&request.principal(), &request.feature_key, &request.target())
        .await;

    if decision.allowed {
        Ok(Json(decision))
    } else {
        Err(FlagError::AccessDenied(Box::new(decision)))
    }
}

#[debug_handler]
pub async fn record_usage(
    State(state): State<router::State>,
    body: Bytes,
) -> Result<StatusCode, FlagError> {
    let event: UsageEventBody = decode_json(&body)?;
    if event.user_id.is_empty() {
        return Err(ClientFacingError::BadRequest("user_id must not be empty".to_string()).into());
    }

    state
        .service
        .record_usage(
            &event.user_id,
            event.event_type,
            event.game_id,
            event.feature_key,
            event.extra_info,
        )
        .await;

    Ok(StatusCode::ACCEPTED)
}

#[debug_handler]
pub async fn usage_stats(
    State(state): State<router::State>,
    Query(params): Query<UsageStatsParams>,
) -> Result<Json<UsageStats>, FlagError> {
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);

    let stats = state
        .service
        .user_stats(&params.user_id, days)
        .await
        .map_err(|e| {
            if !e.is_5xx() {
                return e;
            }
            tracing::error!(
                user_id = %params.user_id,
                error_code = e.error_code(),
                "failed to load usage stats: {}",
                e
            );
            FlagError::from(ClientFacingError::ServiceUnavailable)
        })?;

    Ok(Json(stats))
}

/// Drops cached flag snapshots for one feature, or all of them when no feature is named.
#[debug_handler]
pub async fn invalidate_flags(
    State(state): State<router::State>,
    body: Bytes,
) -> Result<StatusCode, FlagError> {
    let request: InvalidateBody = if body.is_empty() {
        InvalidateBody::default()
    } else {
        decode_json(&body)?
    };

    match request.feature_key {
        Some(feature_key) => state.flag_cache.invalidate(&feature_key).await,
        None => state.flag_cache.invalidate_all(),
    }

    Ok(StatusCode::NO_CONTENT)
}
