//! Connection admission limits

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct LimitConfig {
    /// Maximum total concurrent connections
    pub max_connections_total: usize,
    /// Maximum connections per IP address
    pub max_connections_per_ip: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("Too many connections")]
    TooManyConnections,
    #[error("Too many connections from {0}")]
    TooManyConnectionsFromIp(IpAddr),
}

#[derive(Debug, Default)]
struct Counts {
    per_ip: HashMap<IpAddr, usize>,
    total: usize,
}

/// Global and per-IP connection caps
#[derive(Debug)]
pub struct ConnectionLimiter {
    config: LimitConfig,
    counts: Mutex<Counts>,
}

impl ConnectionLimiter {
    pub fn new(config: LimitConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            counts: Mutex::new(Counts::default()),
        })
    }

    /// Admit a connection; the slot is released when the guard drops
    pub fn admit(self: &Arc<Self>, ip: IpAddr) -> Result<ConnectionGuard, LimitError> {
        let mut counts = self.counts.lock();
        if counts.total >= self.config.max_connections_total {
            return Err(LimitError::TooManyConnections);
        }
        let ip_count = counts.per_ip.get(&ip).copied().unwrap_or(0);
        if ip_count >= self.config.max_connections_per_ip {
            return Err(LimitError::TooManyConnectionsFromIp(ip));
        }

        *counts.per_ip.entry(ip).or_insert(0) += 1;
        counts.total += 1;
        Ok(ConnectionGuard {
            limiter: self.clone(),
            ip,
        })
    }

    fn release(&self, ip: IpAddr) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.per_ip.remove(&ip);
            }
        }
        counts.total = counts.total.saturating_sub(1);
    }

    pub fn active(&self) -> usize {
        self.counts.lock().total
    }

    pub fn active_for(&self, ip: IpAddr) -> usize {
        self.counts.lock().per_ip.get(&ip).copied().unwrap_or(0)
    }
}

/// Held for the lifetime of an admitted connection
#[derive(Debug)]
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
    ip: IpAddr,
}

impl ConnectionGuard {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.release(self.ip);
    }
}
