//! Chat front end of the storefront.
//!
//! Inbound events arrive over HTTP, are decoded once into a [`Command`] and
//! dispatched to the shop components. Replies go back in the response;
//! notifications the bot sends on its own are queued in an outbox that the
//! transport drains.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod notifier;
pub mod reply;
pub mod routes;
pub mod session;

pub use command::{Command, CommandError, InboundEvent, Payload};
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::BotError;
pub use gateway::{ChatGateway, GatewayError, OutboundOp, OutboxGateway};
pub use notifier::ChatNotifier;
pub use reply::{Button, Reply};
pub use session::{FlowError, Session, Sessions};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::ShopStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: ShopStore + Clone> {
    pub dispatcher: Dispatcher<S, OutboxGateway>,
    pub outbox: OutboxGateway,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: ShopStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render::<S>))
        .with_state(routes::metrics::MetricsState {
            handle: metrics_handle,
            app: Arc::clone(&state),
        });

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/updates", post(routes::updates::handle::<S>))
        .route("/outbox", get(routes::outbox::drain::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store, with an outbox gateway.
pub fn create_default_state<S: ShopStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let outbox = OutboxGateway::new();
    let dispatcher = Dispatcher::new(store, outbox.clone(), config);

    if config.admin_ids.is_empty() {
        tracing::warn!("No administrators configured; admin commands are disabled");
    }

    Arc::new(AppState { dispatcher, outbox })
}
