//! HTTP query endpoint
//!
//! Routes:
//! - `GET /` - dashboard page polling `/led_status`
//! - `GET /led_status` - latest snapshot as flat JSON
//! - `GET /metrics` - reader counters in Prometheus text format
//! - `GET /health` - liveness
//!
//! Uses hyper for the HTTP server. Handlers only read the snapshot store and
//! the counters; they never touch the serial port.

use crate::infra::metrics::{Metrics, MetricsSummary};
use anyhow::Context;
use crate::services::SnapshotStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// The compiled-in dashboard page
const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// State shared by all connections
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub metrics: Arc<Metrics>,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Format reader counters and current slot states in Prometheus text format
fn format_prometheus_metrics(state: &AppState) -> String {
    let summary: MetricsSummary = state.metrics.summary();
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "slot_monitor_lines_total",
        "Lines read from the serial device",
        MetricType::Counter,
        summary.lines_total,
    );
    write_metric(
        &mut output,
        "slot_monitor_snapshots_published_total",
        "Snapshots published to the store",
        MetricType::Counter,
        summary.snapshots_published,
    );
    write_metric(
        &mut output,
        "slot_monitor_lines_ignored_total",
        "Lines without the data marker",
        MetricType::Counter,
        summary.lines_ignored,
    );

    let _ = writeln!(output, "# HELP slot_monitor_line_errors_total Discarded data lines by kind");
    let _ = writeln!(output, "# TYPE slot_monitor_line_errors_total counter");
    for (kind, val) in [
        ("decode", summary.decode_errors),
        ("malformed", summary.malformed_lines),
        ("shape", summary.shape_errors),
    ] {
        let _ = writeln!(output, "slot_monitor_line_errors_total{{kind=\"{kind}\"}} {val}");
    }

    write_metric(
        &mut output,
        "slot_monitor_read_errors_total",
        "Serial stream closures and read failures",
        MetricType::Counter,
        summary.read_errors,
    );
    write_metric(
        &mut output,
        "slot_monitor_device_available",
        "Serial device open (1) or unavailable (0)",
        MetricType::Gauge,
        u64::from(summary.device_available),
    );

    let snapshot = state.store.snapshot();
    let _ = writeln!(output, "# HELP slot_monitor_slot_state Current slot state (1 for the active state)");
    let _ = writeln!(output, "# TYPE slot_monitor_slot_state gauge");
    for (slot, current) in snapshot.iter() {
        let _ = writeln!(
            output,
            "slot_monitor_slot_state{{slot=\"{slot}\",state=\"{current}\"}} 1"
        );
    }

    output
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

/// Route a request against the shared state
pub fn route(method: &Method, path: &str, state: &AppState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/led_status") => {
            let snapshot = state.store.snapshot();
            match serde_json::to_vec(&*snapshot) {
                Ok(body) => Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .header("Cache-Control", "no-store")
                    .header("Access-Control-Allow-Origin", "*")
                    .body(Full::new(Bytes::from(body)))
                    .expect("static response should not fail"),
                Err(e) => {
                    error!(error = %e, "led_status_serialize_failed");
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
                }
            }
        }
        (&Method::GET, "/") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(Full::new(Bytes::from_static(DASHBOARD_HTML.as_bytes())))
            .expect("static response should not fail"),
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(format_prometheus_metrics(state))))
            .expect("static response should not fail"),
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (_, "/" | "/led_status" | "/metrics" | "/health") => Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .header("Allow", "GET")
            .body(Full::new(Bytes::from("Method Not Allowed")))
            .expect("static response should not fail"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: AppState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "http_request");
    Ok(route(req.method(), req.uri().path(), &state))
}

/// Bind the HTTP listener
pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid HTTP bind address {bind_address}:{port}: {e}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;
    Ok(listener)
}

/// Serve requests on `listener` until shutdown
pub async fn serve(listener: TcpListener, state: AppState, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "http_server_started");
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind and serve the HTTP endpoint
pub async fn start_http_server(
    bind_address: &str,
    port: u16,
    state: AppState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = bind(bind_address, port).await?;
    serve(listener, state, shutdown).await;
    Ok(())
}
