use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::animation::spring::SpringConfig;
use crate::engine::reconciler::{ProgressReconciler, RetryPolicy};
use crate::engine::simulation::SimulationRegistry;
use crate::models::notification::Notification;
use crate::observability::metrics::Metrics;
use crate::routing::RoutingProvider;
use crate::routing::acquisition::RouteAcquirer;
use crate::store::Repositories;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub tick_interval: Duration,
    pub default_speed: f64,
    pub completion_retry: RetryPolicy,
    pub marker_frame_interval: Duration,
    pub spring: SpringConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            default_speed: 1.0,
            completion_retry: RetryPolicy::default(),
            marker_frame_interval: Duration::from_millis(50),
            spring: SpringConfig::default(),
        }
    }
}

pub struct AppState {
    pub repos: Repositories,
    pub routes: Arc<RouteAcquirer>,
    pub reconciler: Arc<ProgressReconciler>,
    pub simulations: SimulationRegistry,
    pub notifications_tx: broadcast::Sender<Notification>,
    pub metrics: Metrics,
    pub settings: EngineSettings,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        provider: Arc<dyn RoutingProvider>,
        settings: EngineSettings,
        event_buffer_size: usize,
    ) -> Self {
        let metrics = Metrics::new();
        let (notifications_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        let routes = Arc::new(RouteAcquirer::new(provider, repos.clone(), metrics.clone()));
        let reconciler = Arc::new(ProgressReconciler::new(
            repos.clone(),
            settings.completion_retry,
            metrics.clone(),
        ));
        let simulations = SimulationRegistry::new(
            reconciler.clone(),
            notifications_tx.clone(),
            metrics.clone(),
            settings.tick_interval,
        );

        Self {
            repos,
            routes,
            reconciler,
            simulations,
            notifications_tx,
            metrics,
            settings,
        }
    }
}
