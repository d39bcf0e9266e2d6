//! Owner-scoped background tasks
//!
//! Every delayed continuation (effect expiry, bonus expiry, activation,
//! self-destruct, mine arming) is registered in the scope of the entity
//! that owns it. Dropping or cancelling the scope aborts all of them.

use tokio::task::AbortHandle;

/// Set of abortable tasks owned by a single entity
#[derive(Debug, Default)]
pub struct TaskScope {
    handles: Vec<AbortHandle>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a task; finished tasks are pruned on insert
    pub fn add(&mut self, handle: AbortHandle) {
        self.handles.retain(|h| !h.is_finished());
        self.handles.push(handle);
    }

    /// Abort every tracked task
    pub fn cancel_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    /// Number of tasks still running
    pub fn active(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
