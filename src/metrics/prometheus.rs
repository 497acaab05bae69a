//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Environment variable holding the `host:port` to expose metrics on
pub const METRICS_ADDR_ENV: &str = "RECONCILER_METRICS_ADDR";

lazy_static::lazy_static! {
    /// Store operations by verb, kind and outcome
    pub static ref OPERATIONS: CounterVec = register_counter_vec!(
        "workload_reconciler_operations_total",
        "Total number of store operations by outcome",
        &["verb", "kind", "outcome"]
    ).unwrap();

    /// Store operation duration histogram
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "workload_reconciler_operation_duration_seconds",
        "Duration of store operations in seconds, including retries",
        &["verb", "kind"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Version conflicts observed by update loops
    pub static ref UPDATE_CONFLICTS: CounterVec = register_counter_vec!(
        "workload_reconciler_update_conflicts_total",
        "Total number of resourceVersion conflicts absorbed by update retries",
        &["kind"]
    ).unwrap();

    /// Attempts needed by successful updates
    pub static ref UPDATE_ATTEMPTS: HistogramVec = register_histogram_vec!(
        "workload_reconciler_update_attempts",
        "Read-mutate-write attempts used by successful updates",
        &["kind"],
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 13.0, 21.0]
    ).unwrap();

    /// Updates that ran out of attempts
    pub static ref RETRIES_EXHAUSTED: CounterVec = register_counter_vec!(
        "workload_reconciler_retries_exhausted_total",
        "Total number of updates abandoned after exhausting their attempts",
        &["kind"]
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" | "/readyz" | "/ready" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

fn metrics_response() -> Response<Full<Bytes>> {
    match render() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            if let Ok(value) = content_type.parse::<hyper::header::HeaderValue>() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
