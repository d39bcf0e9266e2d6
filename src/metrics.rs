//! Prometheus-compatible metrics endpoint
//!
//! Exposes battle server counters in Prometheus text or JSON.
//! Default endpoint: http://localhost:9090/metrics

use parking_lot::RwLock;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const LATENCY_SAMPLES: usize = 1000;

/// Metrics registry for the battle server
#[derive(Debug)]
pub struct Metrics {
    // Network
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub commands_received: AtomicU64,
    pub commands_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub handler_failures: AtomicU64,

    // Battles
    pub battles_active: AtomicU64,
    pub players_in_battles: AtomicU64,
    pub kills_total: AtomicU64,
    pub damage_events: AtomicU64,
    pub bonuses_taken: AtomicU64,
    pub bonuses_expired: AtomicU64,
    pub mines_triggered: AtomicU64,

    // Handler latency (microseconds)
    pub dispatch_time_p95_us: AtomicU64,
    pub dispatch_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling handler latencies for the percentile
    dispatch_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            commands_received: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            battles_active: AtomicU64::new(0),
            players_in_battles: AtomicU64::new(0),
            kills_total: AtomicU64::new(0),
            damage_events: AtomicU64::new(0),
            bonuses_taken: AtomicU64::new(0),
            bonuses_expired: AtomicU64::new(0),
            mines_triggered: AtomicU64::new(0),
            dispatch_time_p95_us: AtomicU64::new(0),
            dispatch_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            dispatch_history: RwLock::new(VecDeque::with_capacity(LATENCY_SAMPLES)),
        }
    }

    /// Record how long one handler ran and refresh the percentiles
    pub fn record_dispatch_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        let mut history = self.dispatch_history.write();
        history.push_back(us);
        while history.len() > LATENCY_SAMPLES {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = ((sorted.len() as f32 * 0.95) as usize).min(sorted.len() - 1);
            self.dispatch_time_p95_us.store(sorted[p95_idx], Ordering::Relaxed);
            self.dispatch_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn counters(&self) -> [(&'static str, &'static str, &'static str, u64); 18] {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        [
            ("connections_active", "Open client connections", "gauge", load(&self.connections_active)),
            ("connections_rejected_total", "Connections refused by the limiter", "counter", load(&self.connections_rejected)),
            ("commands_received_total", "Commands received", "counter", load(&self.commands_received)),
            ("commands_sent_total", "Commands sent", "counter", load(&self.commands_sent)),
            ("bytes_received_total", "Bytes received", "counter", load(&self.bytes_received)),
            ("bytes_sent_total", "Bytes sent", "counter", load(&self.bytes_sent)),
            ("protocol_errors_total", "Undecodable or unroutable frames", "counter", load(&self.protocol_errors)),
            ("handler_failures_total", "Handlers that returned an error", "counter", load(&self.handler_failures)),
            ("battles_active", "Battles in the registry", "gauge", load(&self.battles_active)),
            ("players_in_battles", "Players inside battles", "gauge", load(&self.players_in_battles)),
            ("kills_total", "Tanks destroyed", "counter", load(&self.kills_total)),
            ("damage_events_total", "Damage applications", "counter", load(&self.damage_events)),
            ("bonuses_taken_total", "Bonus boxes claimed", "counter", load(&self.bonuses_taken)),
            ("bonuses_expired_total", "Bonus boxes expired", "counter", load(&self.bonuses_expired)),
            ("mines_triggered_total", "Mines triggered", "counter", load(&self.mines_triggered)),
            ("dispatch_time_p95_microseconds", "95th percentile handler time", "gauge", load(&self.dispatch_time_p95_us)),
            ("dispatch_time_max_microseconds", "Maximum handler time", "gauge", load(&self.dispatch_time_max_us)),
            ("uptime_seconds", "Server uptime in seconds", "counter", self.uptime_seconds()),
        ]
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);
        for (name, help, kind, value) in self.counters() {
            output.push_str(&format!(
                "# HELP tank_arena_{name} {help}\n# TYPE tank_arena_{name} {kind}\ntank_arena_{name} {value}\n"
            ));
        }
        output
    }

    pub fn to_json(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        json!({
            "network": {
                "connections": load(&self.connections_active),
                "rejected": load(&self.connections_rejected),
                "commands_received": load(&self.commands_received),
                "commands_sent": load(&self.commands_sent),
                "bytes_received": load(&self.bytes_received),
                "bytes_sent": load(&self.bytes_sent),
                "protocol_errors": load(&self.protocol_errors),
                "handler_failures": load(&self.handler_failures),
            },
            "battles": {
                "active": load(&self.battles_active),
                "players": load(&self.players_in_battles),
                "kills": load(&self.kills_total),
                "damage_events": load(&self.damage_events),
                "bonuses_taken": load(&self.bonuses_taken),
                "bonuses_expired": load(&self.bonuses_expired),
                "mines_triggered": load(&self.mines_triggered),
            },
            "performance": {
                "dispatch_time_p95_us": load(&self.dispatch_time_p95_us),
                "dispatch_time_max_us": load(&self.dispatch_time_max_us),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // More specific paths first
                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("200 OK", "application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("200 OK", "text/plain", "OK")
                    } else {
                        http_response("404 Not Found", "text/plain", "")
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
