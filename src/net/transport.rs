//! TCP listener
//!
//! Accepts connections, applies the admission limits and hands each
//! stream to its own connection actor.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::connection::run_connection;
use super::limits::{ConnectionLimiter, LimitConfig};
use super::socket::UserSocket;
use crate::server::ServerContext;

/// TCP game server
pub struct GameServer {
    server: Arc<ServerContext>,
    listener: TcpListener,
    limiter: Arc<ConnectionLimiter>,
}

impl GameServer {
    /// Bind the configured address
    pub async fn bind(server: Arc<ServerContext>) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(server.config.bind_address, server.config.port);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::with_listener(server, listener))
    }

    pub fn with_listener(server: Arc<ServerContext>, listener: TcpListener) -> Self {
        let limiter = ConnectionLimiter::new(LimitConfig {
            max_connections_total: server.config.max_connections,
            max_connections_per_ip: server.config.max_connections_per_ip,
        });
        Self {
            server,
            listener,
            limiter,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "Game server listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = &mut shutdown => {
                    info!("Listener stopped");
                    return Ok(());
                }
            }
        }
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = match self.limiter.admit(peer.ip()) {
            Ok(guard) => guard,
            Err(e) => {
                self.server.metrics.connections_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %e, "Connection rejected");
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to disable Nagle");
        }

        let server = self.server.clone();
        let (socket, outbound) = UserSocket::new(server.sockets.next_id(), peer);
        let (reader, writer) = stream.into_split();
        tokio::spawn(async move {
            run_connection(server, socket, outbound, reader, writer).await;
            drop(guard);
        });
    }
}
