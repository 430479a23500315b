use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub route_acquisitions_total: IntCounterVec,
    pub route_acquisition_latency_seconds: HistogramVec,
    pub progress_writes_total: IntCounterVec,
    pub completions_total: IntCounterVec,
    pub active_simulations: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let route_acquisitions_total = IntCounterVec::new(
            Opts::new("route_acquisitions_total", "Route acquisitions by outcome"),
            &["outcome"],
        )
        .expect("valid route_acquisitions_total metric");

        let route_acquisition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "route_acquisition_latency_seconds",
                "Latency of routing provider round trips in seconds",
            ),
            &["outcome"],
        )
        .expect("valid route_acquisition_latency_seconds metric");

        let progress_writes_total = IntCounterVec::new(
            Opts::new("progress_writes_total", "Delivery progress writes by outcome"),
            &["outcome"],
        )
        .expect("valid progress_writes_total metric");

        let completions_total = IntCounterVec::new(
            Opts::new("completions_total", "Delivery completions by outcome"),
            &["outcome"],
        )
        .expect("valid completions_total metric");

        let active_simulations = IntGauge::new(
            "active_simulations",
            "Vehicles with a running progress simulation",
        )
        .expect("valid active_simulations metric");

        registry
            .register(Box::new(route_acquisitions_total.clone()))
            .expect("register route_acquisitions_total");
        registry
            .register(Box::new(route_acquisition_latency_seconds.clone()))
            .expect("register route_acquisition_latency_seconds");
        registry
            .register(Box::new(progress_writes_total.clone()))
            .expect("register progress_writes_total");
        registry
            .register(Box::new(completions_total.clone()))
            .expect("register completions_total");
        registry
            .register(Box::new(active_simulations.clone()))
            .expect("register active_simulations");

        Self {
            registry,
            route_acquisitions_total,
            route_acquisition_latency_seconds,
            progress_writes_total,
            completions_total,
            active_simulations,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
