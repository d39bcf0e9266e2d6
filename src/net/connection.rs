//! Per-connection actor and the registry of live sockets
//!
//! A connection runs three kinds of tasks: the read loop (this task),
//! a writer task draining the socket's outbound queue, and handler tasks
//! scoped to the socket. Closing the socket aborts the handlers; the
//! writer drains whatever was queued before it.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::cipher::Cipher;
use super::dispatch::HandlerFuture;
use super::framing::{FrameWriter, FramingError, PacketBuffer};
use super::protocol::{Command, CommandName, CommandSide};
use super::socket::{Screen, UserSocket};
use crate::config::DispatchMode;
use crate::game::constants::net::READ_CHUNK_SIZE;
use crate::handlers::{system, HandlerContext, HandlerError};
use crate::metrics::Metrics;
use crate::server::ServerContext;

/// How long the writer may keep flushing after the read side ended
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Live sockets by connection id
#[derive(Debug)]
pub struct SocketRegistry {
    sockets: RwLock<FxHashMap<u64, Arc<UserSocket>>>,
    next_id: AtomicU64,
}

impl Default for SocketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self {
            sockets: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, socket: Arc<UserSocket>) {
        self.sockets.write().insert(socket.id(), socket);
    }

    pub fn unregister(&self, id: u64) -> Option<Arc<UserSocket>> {
        self.sockets.write().remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<Arc<UserSocket>> {
        self.sockets.read().get(&id).cloned()
    }

    /// Bind `username` to `socket` unless another live socket already holds it
    ///
    /// Check and bind happen under the registry write lock, so two logins
    /// racing for one account cannot both succeed.
    pub fn claim_username(&self, socket: &Arc<UserSocket>, username: &str) -> bool {
        let sockets = self.sockets.write();
        let taken = sockets
            .values()
            .any(|other| other.id() != socket.id() && other.username().as_deref() == Some(username));
        if taken {
            return false;
        }
        socket.update_session(|s| s.username = Some(username.to_string()));
        true
    }

    pub fn online(&self, username: &str) -> Option<Arc<UserSocket>> {
        self.sockets
            .read()
            .values()
            .find(|s| s.username().as_deref() == Some(username))
            .cloned()
    }

    /// Sockets currently showing `screen`
    pub fn on_screen(&self, screen: Screen) -> Vec<Arc<UserSocket>> {
        self.sockets
            .read()
            .values()
            .filter(|s| s.screen() == screen)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }
}

/// Where decoded commands go to run
enum Scheduler {
    /// One scoped task per command
    Concurrent(Arc<UserSocket>),
    /// A single scoped worker running handlers in arrival order
    Strict(mpsc::UnboundedSender<(CommandName, HandlerFuture)>),
}

impl Scheduler {
    fn new(mode: DispatchMode, socket: &Arc<UserSocket>, metrics: Arc<Metrics>) -> Self {
        match mode {
            DispatchMode::Concurrent => Scheduler::Concurrent(socket.clone()),
            DispatchMode::Strict => {
                let (tx, mut rx) = mpsc::unbounded_channel::<(CommandName, HandlerFuture)>();
                let conn = socket.id();
                socket.spawn_scoped(async move {
                    while let Some((name, future)) = rx.recv().await {
                        run_handler(conn, name, future, &metrics).await;
                    }
                });
                Scheduler::Strict(tx)
            }
        }
    }

    fn schedule(&self, conn: u64, name: CommandName, future: HandlerFuture, metrics: &Arc<Metrics>) {
        match self {
            Scheduler::Concurrent(socket) => {
                let metrics = metrics.clone();
                socket.spawn_scoped(async move { run_handler(conn, name, future, &metrics).await });
            }
            Scheduler::Strict(queue) => {
                if queue.send((name, future)).is_err() {
                    debug!(conn, command = %name, "Handler queue closed");
                }
            }
        }
    }
}

async fn run_handler(conn: u64, name: CommandName, future: HandlerFuture, metrics: &Metrics) {
    let started = Instant::now();
    let result = future.await;
    metrics.record_dispatch_time(started.elapsed());
    if let Err(e) = result {
        report_failure(conn, name, &e, metrics);
    }
}

fn report_failure(conn: u64, name: CommandName, e: &HandlerError, metrics: &Metrics) {
    if e.is_disconnect() {
        debug!(conn, command = %name, "Handler stopped: connection closed");
        return;
    }
    metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
    if e.is_precondition() {
        warn!(conn, command = %name, error = %e, "Command rejected");
    } else {
        error!(conn, command = %name, error = %e, "Handler failed");
    }
}

/// Drive one client connection until the peer goes away
///
/// The socket is registered for the lifetime of the call; on return it
/// has left its battle and is unregistered.
pub async fn run_connection<R, W>(
    server: Arc<ServerContext>,
    socket: Arc<UserSocket>,
    outbound: mpsc::UnboundedReceiver<Command>,
    reader: R,
    writer: W,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let conn = socket.id();
    server.sockets.register(socket.clone());
    server.metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    info!(conn, addr = %socket.remote_addr(), "Client connected");

    let mut writer_task = tokio::spawn(write_loop(
        conn,
        FrameWriter::new(writer),
        outbound,
        server.metrics.clone(),
    ));

    let bootstrap_socket = socket.clone();
    socket.spawn_scoped(async move {
        if let Err(e) = system::bootstrap(bootstrap_socket).await {
            debug!(conn, error = %e, "Bootstrap aborted");
        }
    });

    match read_loop(&server, &socket, reader).await {
        Ok(()) => info!(conn, "Client disconnected"),
        Err(e) => warn!(conn, error = %e, "Connection dropped"),
    }

    socket.close();
    match server.leave_battle(&socket) {
        Ok(Some(outcome)) => debug!(conn, ?outcome, "Left battle on disconnect"),
        Ok(None) => {}
        Err(e) => warn!(conn, error = %e, "Leaving battle on disconnect failed"),
    }
    server.sockets.unregister(conn);
    server.metrics.connections_active.fetch_sub(1, Ordering::Relaxed);

    // Battles and handlers may still hold the socket; stop waiting for them
    drop(socket);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
}

async fn read_loop<R>(server: &Arc<ServerContext>, socket: &Arc<UserSocket>, mut reader: R) -> Result<(), FramingError>
where
    R: AsyncRead + Unpin,
{
    let cipher = Cipher::new();
    let mut buffer = PacketBuffer::new(server.config.max_frame_size);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let scheduler = Scheduler::new(server.config.dispatch_mode, socket, server.metrics.clone());

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        server.metrics.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        buffer.extend(&chunk[..n]);
        while let Some(frame) = buffer.next_frame()? {
            handle_frame(server, socket, &cipher, &scheduler, frame);
        }
    }
}

fn handle_frame(
    server: &Arc<ServerContext>,
    socket: &Arc<UserSocket>,
    cipher: &Cipher,
    scheduler: &Scheduler,
    frame: Vec<u8>,
) {
    let conn = socket.id();
    let protocol_error = || {
        server.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
    };

    let text = match String::from_utf8(frame) {
        Ok(text) => text,
        Err(_) => {
            warn!(conn, "Frame is not valid UTF-8");
            protocol_error();
            return;
        }
    };
    let text = if server.config.protocol_encryption {
        match cipher.decrypt(&text) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(conn, error = %e, "Undecodable frame");
                protocol_error();
                return;
            }
        }
    } else {
        text
    };
    if text.is_empty() {
        return;
    }

    let command = match Command::parse(&text) {
        Ok(command) => command,
        Err(e) => {
            warn!(conn, error = %e, "Unknown command");
            protocol_error();
            return;
        }
    };
    server.metrics.commands_received.fetch_add(1, Ordering::Relaxed);

    // Acks resume suspended handlers, so they never queue behind them
    if command.name == CommandName::DependenciesLoaded {
        match command.args.first().and_then(|id| id.parse().ok()) {
            Some(id) => socket.dependencies().mark_loaded(id),
            None => {
                warn!(conn, args = ?command.args, "Malformed dependency ack");
                protocol_error();
            }
        }
        return;
    }

    trace!(conn, command = %command, "Received");
    let name = command.name;
    let ctx = HandlerContext::new(socket.clone(), server.clone());
    match server.registry.dispatch(ctx, command, CommandSide::Server) {
        Ok(future) => scheduler.schedule(conn, name, future, &server.metrics),
        Err(e) => {
            warn!(conn, error = %e, "Dispatch failed");
            protocol_error();
        }
    }
}

async fn write_loop<W>(
    conn: u64,
    writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    metrics: Arc<Metrics>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = outbound.recv().await {
        log_outbound(conn, &command);
        match writer.write_frame(&command.serialize()).await {
            Ok(bytes) => {
                metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                metrics.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            Err(e) => {
                debug!(conn, error = %e, "Write failed");
                break;
            }
        }
    }
    if let Err(e) = writer.shutdown().await {
        trace!(conn, error = %e, "Stream shutdown failed");
    }
}

fn log_outbound(conn: u64, command: &Command) {
    match command.name {
        CommandName::Pong => {}
        // Resource lists are long; the dependency id is enough
        CommandName::LoadResources => {
            trace!(conn, dependency = ?command.args.get(1), "Sent load_resources");
        }
        _ => trace!(conn, command = %command, "Sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::net::framing::encode_frame;
    use crate::net::socket::detached_socket;
    use crate::store::{InMemoryQuestTracker, InMemoryUserRepository};
    use crate::catalog::{GarageCatalog, MapCatalog};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    struct TestClient {
        stream: DuplexStream,
        buffer: PacketBuffer,
    }

    impl TestClient {
        async fn send(&mut self, record: &str) {
            self.stream.write_all(&encode_frame(record)).await.unwrap();
        }

        async fn recv(&mut self) -> Command {
            loop {
                if let Some(frame) = self.buffer.next_frame().unwrap() {
                    let text = String::from_utf8(frame).unwrap();
                    return Command::parse_from(&text, CommandSide::Client).unwrap();
                }
                let mut chunk = [0u8; 4096];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "server closed the connection");
                self.buffer.extend(&chunk[..n]);
            }
        }

        async fn recv_until(&mut self, name: CommandName) -> Command {
            loop {
                let command = self.recv().await;
                if command.name == name {
                    return command;
                }
            }
        }

        /// Answer the bootstrap handshake
        async fn bootstrap(&mut self) {
            assert_eq!(self.recv().await.name, CommandName::InitLocale);
            let load = self.recv().await;
            assert_eq!(load.name, CommandName::LoadResources);
            self.send(&format!("system;dependencies_loaded;{}", load.args[1])).await;
            assert_eq!(self.recv().await.name, CommandName::MainResourcesLoaded);
        }
    }

    fn server_with(config: ServerConfig) -> Arc<ServerContext> {
        ServerContext::new(
            config,
            MapCatalog::builtin(),
            GarageCatalog::builtin(),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryQuestTracker::new()),
            Arc::new(Metrics::new()),
        )
        .unwrap()
    }

    fn connect(server: &Arc<ServerContext>) -> (TestClient, JoinHandle<()>) {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server_io);
        let (socket, outbound) = UserSocket::new(
            server.sockets.next_id(),
            std::net::SocketAddr::from(([127, 0, 0, 1], 50000)),
        );
        let handle = tokio::spawn(run_connection(server.clone(), socket, outbound, reader, writer));
        let client = TestClient {
            stream: client,
            buffer: PacketBuffer::new(1 << 20),
        };
        (client, handle)
    }

    #[tokio::test]
    async fn test_bootstrap_and_login() {
        let server = ServerContext::for_tests();
        server.create_default_battle().unwrap();
        let (mut client, handle) = connect(&server);

        client.bootstrap().await;
        client.send("auth;login;;false;alice;secret").await;
        assert_eq!(client.recv().await.name, CommandName::AuthAccept);
        let layout = client.recv().await;
        assert_eq!(layout.name, CommandName::ChangeLayout);
        assert_eq!(layout.args, ["BATTLE_SELECT".to_string()]);
        client.recv_until(CommandName::ShowBattleInfo).await;
        assert!(server.sockets.online("alice").is_some());

        drop(client);
        handle.await.unwrap();
        assert!(server.sockets.is_empty());
        assert!(server.sockets.online("alice").is_none());
        assert_eq!(server.metrics.connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_encrypted_inbound_plain_outbound() {
        let server = server_with(ServerConfig {
            protocol_encryption: true,
            bonus_spawn_interval_secs: 0,
            ..Default::default()
        });
        let (mut client, _handle) = connect(&server);
        let mut cipher = Cipher::new();

        assert_eq!(client.recv().await.name, CommandName::InitLocale);
        let load = client.recv().await;
        let ack = cipher
            .encrypt(&format!("system;dependencies_loaded;{}", load.args[1]))
            .unwrap();
        client.send(&ack).await;
        assert_eq!(client.recv().await.name, CommandName::MainResourcesLoaded);

        client.send(&cipher.encrypt("battle;ping").unwrap()).await;
        assert_eq!(client.recv().await.name, CommandName::Pong);
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_close_connection() {
        let server = ServerContext::for_tests();
        let (mut client, _handle) = connect(&server);
        client.bootstrap().await;

        client.send("garage;buy;item").await;
        client.send("battle;kill_tank;x").await;
        client.send("battle;ping").await;
        assert_eq!(client.recv().await.name, CommandName::Pong);
        assert_eq!(server.metrics.protocol_errors.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_connection() {
        let server = server_with(ServerConfig {
            max_frame_size: 64,
            protocol_encryption: false,
            bonus_spawn_interval_secs: 0,
            ..Default::default()
        });
        let (mut client, handle) = connect(&server);
        client.stream.write_all(&[b'a'; 256]).await.unwrap();
        handle.await.unwrap();
        assert!(server.sockets.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_leaves_battle() {
        let server = ServerContext::for_tests();
        let battle = server.create_default_battle().unwrap();
        let (mut client, handle) = connect(&server);
        client.bootstrap().await;
        client.send("auth;login;alice;pw").await;
        client.recv_until(CommandName::ShowBattleInfo).await;

        client.send("battle_select;fight").await;
        for _ in 0..3 {
            let load = client.recv_until(CommandName::LoadResources).await;
            client.send(&format!("system;dependencies_loaded;{}", load.args[1])).await;
        }
        client.recv_until(CommandName::InitBattleModel).await;
        assert!(battle.lock().player("alice").is_some());

        drop(client);
        handle.await.unwrap();
        assert!(battle.lock().player("alice").is_none());
    }

    #[tokio::test]
    async fn test_strict_mode_keeps_order() {
        let server = server_with(ServerConfig {
            dispatch_mode: DispatchMode::Strict,
            protocol_encryption: false,
            bonus_spawn_interval_secs: 0,
            ..Default::default()
        });
        let (mut client, _handle) = connect(&server);
        client.bootstrap().await;
        client.send("auth;login;alice;pw").await;
        client.send("battle;ping").await;
        assert_eq!(client.recv().await.name, CommandName::AuthAccept);
        assert_eq!(client.recv_until(CommandName::Pong).await.name, CommandName::Pong);
    }

    #[test]
    fn test_claim_username_once() {
        let registry = SocketRegistry::new();
        let (first, _a) = detached_socket(1);
        let (second, _b) = detached_socket(2);
        registry.register(first.clone());
        registry.register(second.clone());

        assert!(registry.claim_username(&first, "alice"));
        assert!(!registry.claim_username(&second, "alice"));
        assert!(registry.claim_username(&second, "bob"));
        assert_eq!(registry.online("alice").map(|s| s.id()), Some(1));

        registry.unregister(1);
        assert!(registry.online("alice").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_on_screen() {
        let registry = SocketRegistry::new();
        let (lobby, _a) = detached_socket(1);
        let (auth, _b) = detached_socket(2);
        lobby.update_session(|s| s.screen = Screen::BattleSelect);
        registry.register(lobby);
        registry.register(auth);

        let shown: Vec<u64> = registry.on_screen(Screen::BattleSelect).iter().map(|s| s.id()).collect();
        assert_eq!(shown, [1]);
    }
}
