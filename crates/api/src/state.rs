use std::sync::Arc;

use academy_notify::config::NotifyConfig;
use academy_notify::gateway::MessageGateway;
use academy_notify::rate_limit::RateLimitStore;
use academy_notify::store::NotificationStore;
use academy_notify::worker::DeliveryWorker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Tenant-scoped persistence for the pipeline.
    pub store: Arc<dyn NotificationStore>,
    /// Provider client used by manual sends.
    pub gateway: Arc<dyn MessageGateway>,
    /// Runs the manually triggered sweep.
    pub worker: Arc<DeliveryWorker>,
    /// Keyed counters for manual-send throttling.
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub config: Arc<ServerConfig>,
    pub notify: Arc<NotifyConfig>,
}
