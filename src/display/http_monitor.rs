use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{info, warn};

use crate::display::display::{DisplayWindows, MetricsDisplay, MetricsSummary};
use crate::train::metrics::MetricsLog;

/// What the monitor serves: the latest copy of the run's metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    /// Number of epochs displayed so far.
    pub updates: u64,
    pub summary: Option<MetricsSummary>,
    pub metrics: MetricsLog,
}

pub type SharedSnapshot = Arc<Mutex<MonitorSnapshot>>;

/// Serves the current metrics over HTTP while a run is in progress.
///
/// Routes:
/// - `GET /`       : plain-text one-line status
/// - `GET /summary`: `MetricsSummary` as JSON
/// - `GET /metrics`: every series as JSON
///
/// The server thread is detached and lives until the process exits.
pub struct HttpMonitor {
    snapshot: SharedSnapshot,
    addr: String,
}

impl HttpMonitor {
    pub fn bind(addr: &str) -> std::io::Result<HttpMonitor> {
        let server = Server::http(addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let snapshot = SharedSnapshot::default();
        let shared = Arc::clone(&snapshot);
        // One thread is enough: every route answers from an in-memory copy.
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let response = route(request.method(), request.url(), &shared);
                if let Err(e) = request.respond(response) {
                    warn!(error = %e, "monitor failed to respond");
                }
            }
        });
        info!(addr, "metrics monitor listening");
        Ok(HttpMonitor { snapshot, addr: addr.to_owned() })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        Arc::clone(&self.snapshot)
    }
}

impl MetricsDisplay for HttpMonitor {
    fn display(&mut self, metrics: &MetricsLog, windows: DisplayWindows) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot.updates += 1;
        snapshot.summary = Some(MetricsSummary::from_log(metrics, windows));
        snapshot.metrics = metrics.clone();
    }
}

/// Builds the response for one request.
pub fn route(method: &Method, url: &str, snapshot: &SharedSnapshot) -> Response<Cursor<Vec<u8>>> {
    if *method != Method::Get {
        return respond(405, "text/plain", b"405 Method Not Allowed".to_vec());
    }
    let path = url.split('?').next().unwrap_or("");
    let snapshot = snapshot.lock().unwrap_or_else(PoisonError::into_inner);
    match path {
        "/" => {
            let line = match snapshot.summary {
                Some(ref s) => format!(
                    "epochs={} iterations={} val_loss={:?} best_val_loss={:?}\n",
                    s.epochs, s.iterations, s.last_validation_loss, s.best_validation_loss
                ),
                None => "waiting for the first epoch\n".to_owned(),
            };
            respond(200, "text/plain; charset=utf-8", line.into_bytes())
        }
        "/summary" => json(&snapshot.summary),
        "/metrics" => json(&*snapshot),
        _ => respond(404, "text/plain", b"404 Not Found".to_vec()),
    }
}

fn json<T: Serialize>(value: &T) -> Response<Cursor<Vec<u8>>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(200, "application/json", body),
        Err(e) => respond(500, "text/plain", e.to_string().into_bytes()),
    }
}

fn respond(status: u16, content_type: &str, body: Vec<u8>) -> Response<Cursor<Vec<u8>>> {
    let len = body.len();
    let headers = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .into_iter()
        .collect();
    Response::new(StatusCode(status), headers, Cursor::new(body), Some(len), None)
}
