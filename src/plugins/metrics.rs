use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::get, Router};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct MetricsPlugin {
    registry: Arc<Registry>,
    pub request_counter: Arc<IntCounterVec>,
    pub request_duration: Arc<HistogramVec>,
    pub sweep_records: Arc<IntCounterVec>,
}

impl MetricsPlugin {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let ctr_opts = Opts::new("requests_total", "Total HTTP requests");
        let counter = IntCounterVec::new(ctr_opts, &["method", "path", "status"])?;
        registry.register(Box::new(counter.clone()))?;

        let hist_opts = HistogramOpts::new("request_duration_seconds", "HTTP request latencies in seconds");
        let histogram = HistogramVec::new(hist_opts, &["method", "path"])?;
        registry.register(Box::new(histogram.clone()))?;

        let sweep_opts = Opts::new("story_sweep_records_total", "Story records touched by expiration sweeps");
        let sweep = IntCounterVec::new(sweep_opts, &["pass", "outcome"])?;
        registry.register(Box::new(sweep.clone()))?;

        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            registry.register(Box::new(collector)).ok();
        }

        Ok(MetricsPlugin {
            registry: Arc::new(registry),
            request_counter: Arc::new(counter),
            request_duration: Arc::new(histogram),
            sweep_records: Arc::new(sweep),
        })
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route("/", get(move || {
            let encoder = TextEncoder::new();
            let metric_families = reg.gather();
            let mut buffer = Vec::new();
            let rendered = encoder
                .encode(&metric_families, &mut buffer)
                .map_err(|e| e.to_string())
                .and_then(|_| String::from_utf8(buffer).map_err(|e| e.to_string()));
            async move {
                match rendered {
                    Ok(body) => (axum::http::StatusCode::OK, body),
                    Err(e) => {
                        tracing::error!("metrics encoding failed: {}", e);
                        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, String::new())
                    }
                }
            }
        }))
    }

    /// Wraps a plugin router so each request is counted and timed.
    pub fn instrument(&self, router: Router) -> Router {
        router.layer(middleware::from_fn_with_state(self.clone(), track_requests))
    }

    pub fn record_sweep(&self, pass: &str, outcome: &str, n: u64) {
        if n > 0 {
            self.sweep_records.with_label_values(&[pass, outcome]).inc_by(n);
        }
    }
}

async fn track_requests(State(metrics): State<MetricsPlugin>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics.request_counter.with_label_values(&[method.as_str(), path.as_str(), status.as_str()]).inc();
    metrics
        .request_duration
        .with_label_values(&[method.as_str(), path.as_str()])
        .observe(started.elapsed().as_secs_f64());
    response
}
