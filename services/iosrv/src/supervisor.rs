//! Connection supervisor
//!
//! Keeps one session to an I/O endpoint alive. State is a `(connected,
//! available)` pair mutated only here, under one mutex, and every real change
//! is broadcast as a [`ConnectionStatus`]. A single reconnect loop per
//! supervisor retries on a fixed interval whenever the session is down.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{Endpoint, EndpointStatus};

const STATUS_CAPACITY: usize = 32;
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable connectivity of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub available: bool,
}

impl ConnectionStatus {
    pub const DOWN: Self = Self {
        connected: false,
        available: false,
    };
    pub const UP: Self = Self {
        connected: true,
        available: true,
    };

    pub fn is_down(&self) -> bool {
        !self.connected || !self.available
    }

    /// Status after the endpoint reports `event`
    pub fn after(self, event: EndpointStatus) -> Self {
        match event {
            EndpointStatus::Connected(connected) => Self {
                connected,
                available: self.available || connected,
            },
            EndpointStatus::Available(available) => Self {
                connected: self.connected && available,
                available,
            },
        }
    }
}

/// Connection counters
#[derive(Debug, Default, Clone, Copy)]
pub struct SupervisorStats {
    pub attempts: u64,
    pub failures: u64,
    pub transitions: u64,
}

struct State {
    status: ConnectionStatus,
    last_changed: Instant,
    stats: SupervisorStats,
}

pub struct ConnectionSupervisor {
    name: String,
    endpoint: Arc<dyn Endpoint>,
    interval: Duration,
    state: Mutex<State>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    lifetime: CancellationToken,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the disconnected state.
    ///
    /// Spawns the endpoint status listener; nothing connects until
    /// [`Self::connect`] is called.
    pub fn new(
        name: impl Into<String>,
        endpoint: Arc<dyn Endpoint>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);
        let supervisor = Arc::new(Self {
            name: name.into(),
            endpoint,
            interval,
            state: Mutex::new(State {
                status: ConnectionStatus::DOWN,
                last_changed: Instant::now(),
                stats: SupervisorStats::default(),
            }),
            status_tx,
            lifetime: parent.child_token(),
            reconnect: Mutex::new(None),
            listener: Mutex::new(None),
        });

        let handle = Self::spawn_listener(&supervisor);
        *supervisor.listener.lock() = Some(handle);
        supervisor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().status.connected
    }

    /// Time of the last state transition
    pub fn last_changed(&self) -> Instant {
        self.state.lock().last_changed
    }

    pub fn stats(&self) -> SupervisorStats {
        self.state.lock().stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// One connection attempt, then make sure the reconnect loop is running.
    ///
    /// Never fails: an unreachable endpoint is logged and left to the loop.
    pub async fn connect(self: &Arc<Self>, cancel: &CancellationToken) {
        self.try_connect(cancel).await;
        self.ensure_reconnect_loop();
    }

    /// Connect once if currently down; no-op otherwise
    pub async fn ensure_connected(self: &Arc<Self>, cancel: &CancellationToken) {
        if !self.is_connected() {
            self.connect(cancel).await;
        }
    }

    /// Stop the loops and release the endpoint session
    pub async fn shutdown(&self) {
        self.lifetime.cancel();

        let handles = [self.reconnect.lock().take(), self.listener.lock().take()];
        for handle in handles.into_iter().flatten() {
            if tokio::time::timeout(JOIN_TIMEOUT, handle).await.is_err() {
                warn!("{}: background task did not stop in time", self.name);
            }
        }

        if let Err(e) = self.endpoint.disconnect().await {
            debug!("{}: disconnect on shutdown failed: {}", self.name, e);
        }
        self.set_status(ConnectionStatus::DOWN);
        info!("{}: supervisor stopped", self.name);
    }

    async fn try_connect(&self, cancel: &CancellationToken) -> bool {
        if self.lifetime.is_cancelled() || cancel.is_cancelled() {
            return false;
        }
        self.state.lock().stats.attempts += 1;

        let result = tokio::select! {
            result = self.endpoint.connect() => Some(result),
            _ = cancel.cancelled() => None,
            _ = self.lifetime.cancelled() => None,
        };

        match result {
            Some(Ok(())) => {
                if self.set_status(ConnectionStatus::UP) {
                    info!("{}: connected to {}", self.name, self.endpoint.address());
                }
                true
            },
            Some(Err(e)) => {
                self.state.lock().stats.failures += 1;
                warn!(
                    "{}: failed to connect to {}: {}",
                    self.name,
                    self.endpoint.address(),
                    e
                );
                self.set_status(ConnectionStatus::DOWN);
                false
            },
            None => {
                debug!("{}: connect attempt cancelled", self.name);
                false
            },
        }
    }

    /// Apply a new status; broadcasts and returns true only on a real change
    fn set_status(&self, next: ConnectionStatus) -> bool {
        self.update_status(|_| next).is_some()
    }

    /// Derive the next status from the current one and apply it, all under
    /// one lock. Returns the new status when it changed.
    fn update_status(
        &self,
        f: impl FnOnce(ConnectionStatus) -> ConnectionStatus,
    ) -> Option<ConnectionStatus> {
        let mut state = self.state.lock();
        let next = f(state.status);
        if state.status == next {
            return None;
        }
        state.status = next;
        state.last_changed = Instant::now();
        state.stats.transitions += 1;
        // Sent under the lock so subscribers see transitions in order
        let _ = self.status_tx.send(next);
        Some(next)
    }

    fn ensure_reconnect_loop(self: &Arc<Self>) {
        if self.lifetime.is_cancelled() {
            return;
        }
        let mut slot = self.reconnect.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        debug!("{}: starting reconnect loop", self.name);
        *slot = Some(tokio::spawn(Self::reconnect_loop(
            Arc::downgrade(self),
            self.interval,
            self.lifetime.clone(),
        )));
    }

    async fn reconnect_loop(
        supervisor: Weak<Self>,
        interval: Duration,
        lifetime: CancellationToken,
    ) {
        loop {
            {
                let Some(supervisor) = supervisor.upgrade() else {
                    break;
                };
                if !supervisor.is_connected() {
                    supervisor.try_connect(&lifetime).await;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = lifetime.cancelled() => break,
            }
        }
    }

    fn spawn_listener(supervisor: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(supervisor);
        let lifetime = supervisor.lifetime.clone();
        let mut events = supervisor.endpoint.status_events();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = lifetime.cancelled() => break,
                };
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Endpoint status listener skipped {} events", n);
                        continue;
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.on_endpoint_event(event);
            }
        })
    }

    fn on_endpoint_event(self: &Arc<Self>, event: EndpointStatus) {
        let Some(next) = self.update_status(|current| current.after(event)) else {
            return;
        };
        if next.is_down() {
            warn!(
                "{}: lost connection to {} (connected={}, available={})",
                self.name,
                self.endpoint.address(),
                next.connected,
                next.available
            );
            self.ensure_reconnect_loop();
        }
    }
}
