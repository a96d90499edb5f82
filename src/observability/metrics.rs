use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub searches_total: IntCounterVec,
    pub driver_responses_total: IntCounterVec,
    pub offer_timeouts_total: IntCounter,
    pub orders_in_queue: IntGauge,
    pub connected_drivers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let searches_total = IntCounterVec::new(
            Opts::new("searches_total", "Candidate searches by outcome"),
            &["outcome"],
        )
        .expect("valid searches_total metric");

        let driver_responses_total = IntCounterVec::new(
            Opts::new("driver_responses_total", "Driver responses by action"),
            &["action"],
        )
        .expect("valid driver_responses_total metric");

        let offer_timeouts_total = IntCounter::new(
            "offer_timeouts_total",
            "Offers reclaimed by the timeout sweep",
        )
        .expect("valid offer_timeouts_total metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Orders waiting for dispatch")
            .expect("valid orders_in_queue metric");

        let connected_drivers = IntGauge::new(
            "connected_drivers",
            "Drivers with a live realtime connection",
        )
        .expect("valid connected_drivers metric");

        registry
            .register(Box::new(searches_total.clone()))
            .expect("register searches_total");
        registry
            .register(Box::new(driver_responses_total.clone()))
            .expect("register driver_responses_total");
        registry
            .register(Box::new(offer_timeouts_total.clone()))
            .expect("register offer_timeouts_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(connected_drivers.clone()))
            .expect("register connected_drivers");

        Self {
            registry,
            searches_total,
            driver_responses_total,
            offer_timeouts_total,
            orders_in_queue,
            connected_drivers,
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
