//! Hardware capabilities
//!
//! The gateway never speaks a bus protocol directly. An I/O module driver
//! implements [`IoModule`] (raw session and line access); the service wraps it
//! in [`SupervisedIo`], which routes every operation through a
//! [`ConnectionSupervisor`] and exposes the [`InputDevice`] / [`OutputDevice`]
//! capabilities the pipeline uses.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use pulse_model::InputVector;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{IoSrvError, Result};
use crate::supervisor::{ConnectionStatus, ConnectionSupervisor};

pub use simulated::SimulatedIoModule;

/// Property change reported by an endpoint on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Connected(bool),
    Available(bool),
}

/// A network-attached endpoint with one session
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn address(&self) -> &str;

    /// One connection attempt
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Spontaneous connectivity changes (drops, availability flips)
    fn status_events(&self) -> broadcast::Receiver<EndpointStatus>;
}

/// Raw line access on an I/O module; no connection management
#[async_trait]
pub trait IoModule: Endpoint {
    /// Begin pushing input changes to subscribers
    async fn start_monitoring(&self) -> Result<()>;

    async fn read_inputs(&self) -> Result<InputVector>;

    async fn read_outputs(&self) -> Result<Vec<bool>>;

    async fn write_output(&self, index: usize, value: bool) -> Result<()>;

    async fn write_outputs(&self, values: &[bool]) -> Result<()>;

    fn input_changes(&self) -> broadcast::Receiver<InputVector>;

    fn output_changes(&self) -> broadcast::Receiver<(usize, bool)>;
}

/// Input capability consumed by the pipeline
#[async_trait]
pub trait InputDevice: Send + Sync {
    async fn connect(&self, cancel: &CancellationToken) -> Result<()>;

    async fn start_monitoring(&self, cancel: &CancellationToken) -> Result<()>;

    async fn read_inputs(&self, cancel: &CancellationToken) -> Result<InputVector>;

    fn subscribe_inputs(&self) -> broadcast::Receiver<InputVector>;

    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionStatus>;
}

/// Output capability consumed by the pipeline
#[async_trait]
pub trait OutputDevice: Send + Sync {
    async fn connect(&self, cancel: &CancellationToken) -> Result<()>;

    async fn disconnect(&self, cancel: &CancellationToken) -> Result<()>;

    async fn read_outputs(&self, cancel: &CancellationToken) -> Result<Vec<bool>>;

    async fn set_output(&self, index: usize, value: bool, cancel: &CancellationToken)
        -> Result<()>;

    async fn set_outputs(&self, values: &[bool], cancel: &CancellationToken) -> Result<()>;

    fn subscribe_output_changes(&self) -> broadcast::Receiver<(usize, bool)>;

    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionStatus>;
}

/// An I/O module behind a connection supervisor.
///
/// Every read or write self-heals once through `ensure_connected` and fails
/// with `NotConnected` if the module is still unreachable.
pub struct SupervisedIo<M: IoModule> {
    module: Arc<M>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl<M: IoModule + 'static> SupervisedIo<M> {
    pub fn new(module: Arc<M>, supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self { module, supervisor }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    async fn ready(&self, cancel: &CancellationToken) -> Result<()> {
        self.supervisor.ensure_connected(cancel).await;
        if cancel.is_cancelled() {
            return Err(IoSrvError::Cancelled);
        }
        if self.supervisor.is_connected() {
            Ok(())
        } else {
            Err(IoSrvError::NotConnected(self.module.address().to_string()))
        }
    }

    /// Run one module call, racing the caller's cancellation
    async fn guarded<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>> + Send,
    {
        self.ready(cancel).await?;
        tokio::select! {
            result = op => result,
            _ = cancel.cancelled() => Err(IoSrvError::Cancelled),
        }
    }
}

#[async_trait]
impl<M: IoModule + 'static> InputDevice for SupervisedIo<M> {
    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.supervisor.connect(cancel).await;
        Ok(())
    }

    async fn start_monitoring(&self, cancel: &CancellationToken) -> Result<()> {
        self.guarded(cancel, self.module.start_monitoring()).await
    }

    async fn read_inputs(&self, cancel: &CancellationToken) -> Result<InputVector> {
        self.guarded(cancel, self.module.read_inputs()).await
    }

    fn subscribe_inputs(&self) -> broadcast::Receiver<InputVector> {
        self.module.input_changes()
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.supervisor.subscribe()
    }
}

#[async_trait]
impl<M: IoModule + 'static> OutputDevice for SupervisedIo<M> {
    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.supervisor.connect(cancel).await;
        Ok(())
    }

    async fn disconnect(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            result = self.module.disconnect() => result,
            _ = cancel.cancelled() => Err(IoSrvError::Cancelled),
        }
    }

    async fn read_outputs(&self, cancel: &CancellationToken) -> Result<Vec<bool>> {
        self.guarded(cancel, self.module.read_outputs()).await
    }

    async fn set_output(
        &self,
        index: usize,
        value: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.guarded(cancel, self.module.write_output(index, value)).await
    }

    async fn set_outputs(&self, values: &[bool], cancel: &CancellationToken) -> Result<()> {
        self.guarded(cancel, self.module.write_outputs(values)).await
    }

    fn subscribe_output_changes(&self) -> broadcast::Receiver<(usize, bool)> {
        self.module.output_changes()
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.supervisor.subscribe()
    }
}
