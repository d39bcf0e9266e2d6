//! Per-connection handle shared with handlers and battles
//!
//! Outbound commands are queued on an unbounded channel drained by the
//! connection's writer task, so battle code can send while holding the
//! battle lock without awaiting.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::protocol::{Command, CommandName};
use crate::util::TaskScope;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    #[error("Socket closed")]
    Closed,
}

/// Client screen the socket is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Auth,
    BattleSelect,
    Battle,
}

impl Screen {
    /// Layout name understood by the client
    pub fn layout(self) -> &'static str {
        match self {
            Screen::Auth => "AUTH",
            Screen::BattleSelect => "BATTLE_SELECT",
            Screen::Battle => "BATTLE",
        }
    }
}

/// Mutable session data attached to a socket
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub username: Option<String>,
    pub screen: Screen,
    pub selected_battle: Option<String>,
    pub battle: Option<String>,
}

#[derive(Debug, Default)]
struct DependencyState {
    loaded: HashSet<u32>,
    waiters: HashMap<u32, Vec<oneshot::Sender<()>>>,
    closed: bool,
}

/// Resource dependency handshake
///
/// Ids are allocated monotonically. Acknowledged ids are remembered, so
/// a wait that starts after the acknowledgement completes immediately.
#[derive(Debug)]
pub struct DependencyTracker {
    next_id: AtomicU32,
    state: Mutex<DependencyState>,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            state: Mutex::new(DependencyState::default()),
        }
    }

    /// Allocate the next dependency id
    pub fn allocate(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record an acknowledgement and wake anyone waiting on it
    pub fn mark_loaded(&self, id: u32) {
        let mut state = self.state.lock();
        state.loaded.insert(id);
        if let Some(waiters) = state.waiters.remove(&id) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    pub fn is_loaded(&self, id: u32) -> bool {
        self.state.lock().loaded.contains(&id)
    }

    /// Wait until `id` has been acknowledged
    pub async fn wait(&self, id: u32) -> Result<(), SocketError> {
        let receiver = {
            let mut state = self.state.lock();
            if state.loaded.contains(&id) {
                return Ok(());
            }
            if state.closed {
                return Err(SocketError::Closed);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(id).or_default().push(tx);
            rx
        };
        receiver.await.map_err(|_| SocketError::Closed)
    }

    /// Fail every pending and future wait
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.waiters.clear();
    }
}

/// Handle to one client connection
#[derive(Debug)]
pub struct UserSocket {
    id: u64,
    remote_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Command>,
    dependencies: DependencyTracker,
    session: RwLock<Session>,
    tasks: Mutex<TaskScope>,
    closed: AtomicBool,
}

impl UserSocket {
    /// Create a socket handle and the receiving end of its outbound queue
    pub fn new(id: u64, remote_addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Command>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Self {
            id,
            remote_addr,
            outbound,
            dependencies: DependencyTracker::new(),
            session: RwLock::new(Session::default()),
            tasks: Mutex::new(TaskScope::new()),
            closed: AtomicBool::new(false),
        });
        (socket, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Queue a command for this client; dropped once the socket is closed
    pub fn send(&self, command: Command) {
        if self.is_closed() {
            return;
        }
        if self.outbound.send(command).is_err() {
            debug!(conn = self.id, "Outbound queue closed");
        }
    }

    pub fn dependencies(&self) -> &DependencyTracker {
        &self.dependencies
    }

    /// Announce a resource set and return its dependency id
    pub fn load_dependency(&self, resources: String) -> u32 {
        let id = self.dependencies.allocate();
        self.send(Command::with_args(
            CommandName::LoadResources,
            [resources, id.to_string()],
        ));
        id
    }

    /// Announce a resource set and wait for the client to load it
    pub async fn load_and_await(&self, resources: String) -> Result<u32, SocketError> {
        let id = self.load_dependency(resources);
        self.dependencies.wait(id).await?;
        Ok(id)
    }

    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    pub fn update_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.write())
    }

    pub fn username(&self) -> Option<String> {
        self.session.read().username.clone()
    }

    pub fn battle_id(&self) -> Option<String> {
        self.session.read().battle.clone()
    }

    pub fn screen(&self) -> Screen {
        self.session.read().screen
    }

    /// Run `future` in this connection's task scope
    pub fn spawn_scoped<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return;
        }
        let handle = tokio::spawn(future);
        self.tasks.lock().add(handle.abort_handle());
    }

    /// Close the socket: pending dependency waits fail, scoped tasks abort
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dependencies.close();
        self.tasks.lock().cancel_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
pub(crate) fn detached_socket(id: u64) -> (Arc<UserSocket>, mpsc::UnboundedReceiver<Command>) {
    UserSocket::new(id, SocketAddr::from(([127, 0, 0, 1], 40000 + id as u16)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_ack() {
        let tracker = DependencyTracker::new();
        let id = tracker.allocate();
        tracker.mark_loaded(id);
        tracker.wait(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_before_ack() {
        let tracker = Arc::new(DependencyTracker::new());
        let id = tracker.allocate();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait(id).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        tracker.mark_loaded(id);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_out_of_order_acks() {
        let tracker = Arc::new(DependencyTracker::new());
        let first = tracker.allocate();
        let second = tracker.allocate();
        assert_eq!(second, first + 1);

        tracker.mark_loaded(second);
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker.wait(first).await?;
                tracker.wait(second).await
            })
        };
        tracker.mark_loaded(first);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let tracker = Arc::new(DependencyTracker::new());
        let id = tracker.allocate();
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait(id).await })
        };
        tokio::task::yield_now().await;
        tracker.close();
        assert_eq!(waiter.await.unwrap(), Err(SocketError::Closed));
        assert_eq!(tracker.wait(99).await, Err(SocketError::Closed));
    }

    #[tokio::test]
    async fn test_load_dependency_announces() {
        let (socket, mut rx) = detached_socket(1);
        let id = socket.load_dependency("{\"resources\":[]}".to_string());
        let command = rx.recv().await.unwrap();
        assert_eq!(command.name, CommandName::LoadResources);
        assert_eq!(command.args[1], id.to_string());
    }

    #[tokio::test]
    async fn test_close_drops_sends_and_tasks() {
        let (socket, mut rx) = detached_socket(2);
        let (tx, mut done) = mpsc::unbounded_channel::<()>();
        socket.spawn_scoped(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(());
        });
        socket.close();
        socket.send(Command::new(CommandName::Pong));
        assert!(rx.try_recv().is_err());
        assert!(done.recv().await.is_none());
    }
}
