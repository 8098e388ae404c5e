use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_requests_total: IntCounterVec,
    pub dispatch_outcomes_total: IntCounterVec,
    pub transitions_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub outbox_depth: IntGauge,
    pub drivers_on_duty: IntGauge,
    pub selection_latency_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_requests_total = IntCounterVec::new(
            Opts::new("dispatch_requests_total", "Service requests created by category"),
            &["category"],
        )
        .expect("valid dispatch_requests_total metric");

        let dispatch_outcomes_total = IntCounterVec::new(
            Opts::new(
                "dispatch_outcomes_total",
                "Dispatch attempts by outcome (direct or broadcast)",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_outcomes_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Lifecycle transitions by name and outcome"),
            &["transition", "outcome"],
        )
        .expect("valid transitions_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications by delivery outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let outbox_depth = IntGauge::new("outbox_depth", "Notifications waiting for delivery")
            .expect("valid outbox_depth metric");

        let drivers_on_duty = IntGauge::new("drivers_on_duty", "Drivers currently on duty")
            .expect("valid drivers_on_duty metric");

        let selection_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "selection_latency_seconds",
            "Latency of nearest-driver selection in seconds",
        ))
        .expect("valid selection_latency_seconds metric");

        registry
            .register(Box::new(dispatch_requests_total.clone()))
            .expect("register dispatch_requests_total");
        registry
            .register(Box::new(dispatch_outcomes_total.clone()))
            .expect("register dispatch_outcomes_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(outbox_depth.clone()))
            .expect("register outbox_depth");
        registry
            .register(Box::new(drivers_on_duty.clone()))
            .expect("register drivers_on_duty");
        registry
            .register(Box::new(selection_latency_seconds.clone()))
            .expect("register selection_latency_seconds");

        Self {
            registry,
            dispatch_requests_total,
            dispatch_outcomes_total,
            transitions_total,
            notifications_total,
            outbox_depth,
            drivers_on_duty,
            selection_latency_seconds,
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
