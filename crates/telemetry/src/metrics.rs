use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Capture Metrics ====
    pub static ref FRAMES_CAPTURED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_frames_captured_total",
                "Total number of frames captured",
            ),
            &["camera_id"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FRAMES_DROPPED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_frames_dropped_total",
                "Frames overwritten in the mailbox before inference read them",
            ),
            &["camera_id"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAPTURE_RESTARTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_capture_restarts_total",
                "Decoder restarts after transient capture failures",
            ),
            &["camera_id"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Inference Metrics ====
    pub static ref INFERENCE_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_inference_requests_total",
                "Total number of classifier calls",
            ),
            &["camera_id", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref INFERENCE_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "detection_node_inference_latency_seconds",
                "Latency of classifier calls",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["camera_id"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Alert Metrics ====
    pub static ref ALERTS_FIRED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_alerts_fired_total",
                "Total number of alerts fired",
            ),
            &["camera_id", "label"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ALERTS_UNDELIVERED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "detection_node_alerts_undelivered_total",
                "Alerts that could not be persisted or notified",
            ),
            &["camera_id", "stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Session Metrics ====
    pub static ref ACTIVE_SESSIONS: IntGauge = {
        let metric = IntGauge::new(
            "detection_node_active_sessions",
            "Number of running camera sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref STREAM_CLIENTS: IntGauge = {
        let metric = IntGauge::new(
            "detection_node_stream_clients",
            "Number of connected MJPEG stream viewers",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
