//! Prometheus scrape endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use store::ShopStore;

use crate::AppState;

const EXPOSITION_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// State of the scrape route: the recorder handle next to the bot it reports on.
pub struct MetricsState<S: ShopStore + Clone> {
    pub handle: PrometheusHandle,
    pub app: Arc<AppState<S>>,
}

impl<S: ShopStore + Clone> Clone for MetricsState<S> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            app: Arc::clone(&self.app),
        }
    }
}

/// GET /metrics: checkout, status and update counters, plus the outbox backlog
/// sampled at scrape time.
pub async fn render<S: ShopStore + Clone + 'static>(
    State(state): State<MetricsState<S>>,
) -> impl IntoResponse {
    let pending = state.app.outbox.pending().await;
    ::metrics::gauge!("bot_outbox_pending").set(pending as f64);

    ([(header::CONTENT_TYPE, EXPOSITION_FORMAT)], state.handle.render())
}
