use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub routes_in_progress: IntGauge,
    pub optimizer_runs_total: IntCounterVec,
    pub optimizer_latency_seconds: HistogramVec,
    pub open_exceptions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "State transition attempts by entity and outcome",
            ),
            &["entity", "outcome"],
        )
        .expect("valid transitions_total metric");

        let routes_in_progress =
            IntGauge::new("routes_in_progress", "Routes currently IN_PROGRESS")
                .expect("valid routes_in_progress metric");

        let optimizer_runs_total = IntCounterVec::new(
            Opts::new("optimizer_runs_total", "Stop sequencing runs by outcome"),
            &["outcome"],
        )
        .expect("valid optimizer_runs_total metric");

        let optimizer_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "optimizer_latency_seconds",
                "Latency of stop sequencing calls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid optimizer_latency_seconds metric");

        let open_exceptions = IntGauge::new("open_exceptions", "Exceptions not yet resolved")
            .expect("valid open_exceptions metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(routes_in_progress.clone()))
            .expect("register routes_in_progress");
        registry
            .register(Box::new(optimizer_runs_total.clone()))
            .expect("register optimizer_runs_total");
        registry
            .register(Box::new(optimizer_latency_seconds.clone()))
            .expect("register optimizer_latency_seconds");
        registry
            .register(Box::new(open_exceptions.clone()))
            .expect("register open_exceptions");

        Self {
            registry,
            transitions_total,
            routes_in_progress,
            optimizer_runs_total,
            optimizer_latency_seconds,
            open_exceptions,
        }
    }

    pub fn record_transition(&self, entity: &str, outcome: &str) {
        self.transitions_total
            .with_label_values(&[entity, outcome])
            .inc();
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
