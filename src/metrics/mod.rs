use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::register_histogram_vec;
use prometheus::Encoder;
use prometheus::GaugeVec;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;


lazy_static! {
    pub static ref STATE_WRITES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("state_writes_total", "State store writes by change kind"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_PUBLISHED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("events_published_total", "Events published by event type"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_PROCESSED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("events_processed_total", "Events dispatched by priority tier"),
        &["priority"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_FAILED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("events_failed_total", "Events with at least one failed handler"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DROPPED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("events_dropped_total", "Events dropped from full droppable queues"),
        &["priority"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_DEPTH_METRIC: GaugeVec = GaugeVec::new(
        Opts::new("priority_queue_depth", "Current depth per priority tier"),
        &["priority"]
    )
    .expect("metric can not be created");

    pub static ref HANDLER_FAILURES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "handler_failures_total",
            "Failures caught at the watcher/binding/subscription boundary"
        ),
        &["boundary"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCH_DURATION_METRIC: HistogramVec = register_histogram_vec!(
        "event_dispatch_duration_ms",
        "Histogram of per-event dispatch duration in ms",
        &["event_type"],
        exponential_buckets(0.1, 2.0, 12).unwrap()
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics() {
    REGISTRY
        .register(Box::new(STATE_WRITES_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_PUBLISHED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_PROCESSED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_FAILED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_DROPPED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(QUEUE_DEPTH_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(HANDLER_FAILURES_METRIC.clone()))
        .expect("collector can be registered");
}

/// Initialize the metrics registry and the autometrics exporter.
/// Idempotent per process; call once from the embedding application.
pub fn init_metrics() {
    register_custom_metrics();
    prometheus_exporter::init();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode custom metrics: {}", e);
    }
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("custom metrics could not be parsed from utf8: {}", e);
            String::default()
        }
    };
    res.push_str(&prometheus_exporter::encode_to_string().unwrap_or_default());
    res
}
