//! Lifetime tree for every task the server spawns.
//!
//! One root [`CancellationToken`] with a child per connection and per game, plus a
//! [`TaskTracker`] acting as the wait-group for graceful shutdown.

use std::future::Future;

use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct Supervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled together with the root, or earlier on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that shutdown will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tracked tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel everything, then wait for every tracked task to return.
    pub async fn shutdown(&self) {
        info!("[Supervisor] Shutting down {} tasks", self.tracker.len());
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("[Supervisor] All tasks finished");
    }
}
