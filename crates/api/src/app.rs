use axum::{middleware, routing::get, Router};
use domain::store::Stores;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{alerts, audit, batch, callback, calls, cron, devices, health, sms, tasks};
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub services: Services,
}

pub fn create_app(config: Config, stores: Stores, services: Services) -> Router {
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        stores,
        services,
    };

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Devices call back without credentials; everything else is expected to
    // sit behind the deployment's auth proxy.
    let api_routes = Router::new()
        .nest("/api/callback", callback::router())
        .nest("/api/devices", devices::router())
        .nest("/api/batch", batch::router())
        .nest("/api/cron", cron::router())
        .nest("/api/tasks", tasks::router())
        .nest("/api/alerts", alerts::router())
        .nest("/api/sms", sms::router())
        .nest("/api/calls", calls::router())
        .nest("/api/audit", audit::router());

    let public_routes = Router::new()
        .nest("/api/health", health::router())
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
