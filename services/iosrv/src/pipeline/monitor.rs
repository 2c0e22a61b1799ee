//! Input capture stage
//!
//! Bridges device notifications into the bounded snapshot channel. The
//! channel never blocks the device side: a full channel drops the newest
//! snapshot with a warning.

use std::sync::Arc;

use pulse_model::InputVector;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::device::InputDevice;

pub struct InputMonitor {
    device: Arc<dyn InputDevice>,
    tx: mpsc::Sender<InputVector>,
}

impl InputMonitor {
    pub fn new(device: Arc<dyn InputDevice>, tx: mpsc::Sender<InputVector>) -> Self {
        Self { device, tx }
    }

    /// Forward snapshots until cancelled
    pub async fn run(self, token: CancellationToken) {
        info!("Input monitor starting");

        // Subscribe first so nothing published during connect is missed
        let mut inputs = self.device.subscribe_inputs();
        let mut connection = self.device.subscribe_connection();

        if let Err(e) = self.device.connect(&token).await {
            warn!("Input device connect failed: {}", e);
        }
        match self.device.read_inputs(&token).await {
            Ok(snapshot) => {
                self.forward(snapshot);
            },
            Err(e) => error!("Error reading inputs: {}", e),
        }
        self.start_monitoring(&token).await;

        loop {
            tokio::select! {
                snapshot = inputs.recv() => match snapshot {
                    Ok(snapshot) => {
                        self.forward(snapshot);
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!("Input monitor fell behind, {} snapshots lost", n);
                    },
                    Err(RecvError::Closed) => {
                        warn!("Input device stream closed");
                        break;
                    },
                },
                status = connection.recv() => match status {
                    Ok(status) if status.is_down() => {
                        warn!(
                            "Input device disconnected unexpectedly (connected={}, available={})",
                            status.connected, status.available
                        );
                    },
                    Ok(_) => {
                        info!("Input device connected");
                        self.start_monitoring(&token).await;
                    },
                    Err(RecvError::Lagged(_)) => {},
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    info!("Input monitor received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn start_monitoring(&self, token: &CancellationToken) {
        if let Err(e) = self.device.start_monitoring(token).await {
            warn!("Could not start input monitoring: {}", e);
        }
    }

    /// Hand one snapshot to the recorder; returns false if it was dropped
    pub fn forward(&self, snapshot: InputVector) -> bool {
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Dropped input snapshot because channel is full");
                false
            },
            Err(TrySendError::Closed(_)) => {
                debug!("Snapshot channel closed, dropping input");
                false
            },
        }
    }
}
