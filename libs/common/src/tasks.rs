//! Supervised background tasks
//!
//! Every long-lived loop in the gateway is registered here under a name and
//! bound to one process-lifetime [`CancellationToken`]. `shutdown` cancels the
//! token and joins each task, so nothing is left running fire-and-forget.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Registry of named background tasks sharing one lifetime token
pub struct TaskSupervisor {
    token: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Use an existing lifetime token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Process lifetime token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that receives a child of the lifetime token
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let fut = task(self.token.child_token());
        debug!("Spawning supervised task '{}'", name);
        self.register(name, tokio::spawn(fut));
    }

    /// Register a handle spawned elsewhere
    pub fn register(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.lock().push((name.into(), handle));
    }

    /// Number of registered tasks (finished ones included until shutdown)
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Cancel the lifetime token and join every task.
    ///
    /// Returns how many tasks failed to stop within `grace`; those are aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.token.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        info!("Stopping {} background tasks", tasks.len());

        let mut stragglers = 0;
        for (name, mut handle) in tasks {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => debug!("Task '{}' stopped", name),
                Ok(Err(e)) if e.is_panic() => error!("Task '{}' panicked: {}", name, e),
                Ok(Err(e)) => warn!("Task '{}' ended abnormally: {}", name, e),
                Err(_) => {
                    warn!("Task '{}' did not stop within {:?}, aborting", name, grace);
                    handle.abort();
                    stragglers += 1;
                },
            }
        }
        stragglers
    }
}
