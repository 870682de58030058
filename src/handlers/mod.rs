//! HTTP request handlers for the llm-proxy API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::Gateway;
use crate::metrics::Metrics;
use crate::middleware::{
    RequestId, api_key_middleware, http_metrics_middleware, rate_limit_middleware,
    request_id_middleware,
};
use crate::providers::{ProviderRegistry, ProviderSelector};
use crate::rate_limit::SlidingWindowLimiter;
use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod extractor;
pub mod health;
pub mod metrics;
pub mod proxy;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    gateway: Gateway,
    limiter: Option<Arc<SlidingWindowLimiter>>,
    metrics: Arc<Metrics>,
    started_at: Instant,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// Providers are resolved through a [`ProviderRegistry`] built from the
    /// routing and provider sections.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let registry = ProviderRegistry::new(
            config.model_provider_map(),
            &config.routing.default_provider,
            config.backend(),
        );
        Self::with_selector(config, Arc::new(registry))
    }

    /// Create state with an explicit provider selection strategy
    pub fn with_selector(
        config: Arc<Config>,
        selector: Arc<dyn ProviderSelector>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to register metrics: {}", e))
        })?);
        let gateway = Gateway::new(selector, metrics.clone());

        let limits = &config.rate_limit;
        let limiter = limits.enabled.then(|| {
            Arc::new(SlidingWindowLimiter::new(
                Duration::from_secs(limits.window_seconds),
                limits.max_requests,
                Duration::from_secs(limits.sweep_interval_seconds),
            ))
        });

        Ok(Self {
            config,
            gateway,
            limiter,
            metrics,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Rate limiter, present only when rate limiting is enabled
    pub fn limiter(&self) -> Option<&SlidingWindowLimiter> {
        self.limiter.as_deref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cancelled when the server begins shutting down
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Assemble the application router
///
/// Layer order, outermost first: request id, access log, HTTP metrics,
/// CORS, API-key auth, body limit. Rate-limit admission wraps only the
/// proxy routes.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .route("/proxy", post(proxy::chat))
        .route("/proxy/stream", post(proxy::chat_stream))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route("/healthz", get(health::handler))
        .route("/metrics", get(metrics::handler));

    if config.server.max_request_bytes > 0 {
        app = app.layer(RequestBodyLimitLayer::new(config.server.max_request_bytes));
    }

    app = app
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(cors_layer(&config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            http_metrics_middleware,
        ));

    if config.observability.log_requests {
        app = app.layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .extensions()
                    .get::<RequestId>()
                    .map(RequestId::as_str)
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }),
        );
    }

    app.layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = if config.cors.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .cors
                .allow_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
