use std::future::ready;
use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api::endpoint,
    config::Config,
    flags::{flag_service::AccessService, flag_store::FlagStore, flags_cache::CachedFlagStore},
    metrics::utils::{setup_metrics_recorder, track_metrics},
};

pub type FlagCache = CachedFlagStore<Arc<dyn FlagStore>>;

#[derive(Clone)]
pub struct State {
    pub service: AccessService,
    // Same cache the service reads through, kept here for invalidation
    pub flag_cache: Arc<FlagCache>,
}

pub fn router(service: AccessService, flag_cache: Arc<FlagCache>, config: Config) -> Router {
    let state = State {
        service,
        flag_cache,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    // liveness/readiness checks
    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(|| ready("ok")));

    let access_router = Router::new()
        .route("/access", post(endpoint::access))
        .route("/usage", post(endpoint::record_usage))
        .route("/usage/stats", get(endpoint::usage_stats))
        .route("/flags/invalidate", post(endpoint::invalidate_flags))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    let router = Router::new()
        .merge(status_router)
        .merge(access_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Global metrics recorders can play poorly with tests, so only install when asked to
    if *config.enable_metrics {
        match setup_metrics_recorder() {
            Ok(recorder_handle) => {
                router.route("/metrics", get(move || ready(recorder_handle.render())))
            }
            Err(e) => {
                tracing::error!("failed to install metrics recorder: {}", e);
                router
            }
        }
    } else {
        router
    }
}

pub async fn readiness(
    axum::extract::State(state): axum::extract::State<State>,
) -> Result<&'static str, (StatusCode, String)> {
    state.service.flag_store().ping().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("flag store unavailable: {e}"),
        )
    })?;

    Ok("ready")
}

pub async fn index() -> &'static str {
    "access flags"
}
