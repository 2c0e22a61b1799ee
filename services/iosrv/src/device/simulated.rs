//! In-memory I/O module
//!
//! Stands in for the hardware when `simulation.enabled` is set and serves as
//! the fake in tests. Reachability is a switch; a successful `connect` is not
//! announced on `status_events` (only spontaneous changes are).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_model::InputVector;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Endpoint, EndpointStatus, IoModule};
use crate::error::{IoSrvError, Result};

const EVENT_CAPACITY: usize = 64;

pub struct SimulatedIoModule {
    address: String,
    reachable: AtomicBool,
    connected: AtomicBool,
    inputs: Mutex<Vec<bool>>,
    outputs: Mutex<Vec<bool>>,
    status_tx: broadcast::Sender<EndpointStatus>,
    input_tx: broadcast::Sender<InputVector>,
    output_tx: broadcast::Sender<(usize, bool)>,
    /// Random input generator; `None` for a fully scripted module
    generator: Option<GeneratorConfig>,
    generator_task: Mutex<Option<JoinHandle<()>>>,
    lifetime: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    pub change_interval: Duration,
    pub disconnect_chance: f64,
}

impl SimulatedIoModule {
    /// Scripted module: inputs change only through [`Self::set_inputs`]
    pub fn new(address: impl Into<String>, inputs: usize, outputs: usize) -> Arc<Self> {
        Arc::new(Self::build(address.into(), inputs, outputs, None))
    }

    /// Module that flips random inputs on an interval once monitoring starts
    pub fn with_generator(
        address: impl Into<String>,
        inputs: usize,
        outputs: usize,
        generator: GeneratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self::build(address.into(), inputs, outputs, Some(generator)))
    }

    fn build(
        address: String,
        inputs: usize,
        outputs: usize,
        generator: Option<GeneratorConfig>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (input_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (output_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            address,
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            inputs: Mutex::new(vec![false; inputs]),
            outputs: Mutex::new(vec![false; outputs]),
            status_tx,
            input_tx,
            output_tx,
            generator,
            generator_task: Mutex::new(None),
            lifetime: CancellationToken::new(),
        }
    }

    /// Make the module reachable or not. Going unreachable drops the session.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            let _ = self.status_tx.send(EndpointStatus::Available(false));
            self.drop_session();
        } else {
            let _ = self.status_tx.send(EndpointStatus::Available(true));
        }
    }

    /// Simulate the session dropping while the module stays reachable
    pub fn drop_session(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("Simulated module {} dropped its session", self.address);
            let _ = self.status_tx.send(EndpointStatus::Connected(false));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Replace the input lines and notify subscribers
    pub fn set_inputs(&self, values: Vec<bool>) {
        let snapshot = {
            let mut inputs = self.inputs.lock();
            *inputs = values;
            InputVector::new(inputs.clone())
        };
        let _ = self.input_tx.send(snapshot);
    }

    /// Current output lines without going through a session
    pub fn outputs(&self) -> Vec<bool> {
        self.outputs.lock().clone()
    }

    /// Stop the random generator
    pub fn stop(&self) {
        self.lifetime.cancel();
        if let Some(task) = self.generator_task.lock().take() {
            task.abort();
        }
    }

    fn check_session(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IoSrvError::NotConnected(self.address.clone()))
        }
    }

    fn spawn_generator(self: &Arc<Self>, config: GeneratorConfig) -> JoinHandle<()> {
        let module = Arc::downgrade(self);
        let token = self.lifetime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.change_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = token.cancelled() => break,
                }
                let Some(module) = module.upgrade() else { break };
                if !module.is_connected() {
                    continue;
                }

                let (next, drop) = {
                    let mut rng = rand::thread_rng();
                    let len = module.inputs.lock().len();
                    let next: Vec<bool> = (0..len).map(|_| rng.gen_bool(0.5)).collect();
                    (next, rng.gen_bool(config.disconnect_chance))
                };
                module.set_inputs(next);
                if drop {
                    module.drop_session();
                }
            }
        })
    }
}

#[async_trait]
impl Endpoint for SimulatedIoModule {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(IoSrvError::ConnectionError(format!(
                "{} is unreachable",
                self.address
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn status_events(&self) -> broadcast::Receiver<EndpointStatus> {
        self.status_tx.subscribe()
    }
}

#[async_trait]
impl IoModule for SimulatedIoModule {
    async fn start_monitoring(&self) -> Result<()> {
        self.check_session()?;
        info!("Simulated module {} monitoring inputs", self.address);
        Ok(())
    }

    async fn read_inputs(&self) -> Result<InputVector> {
        self.check_session()?;
        Ok(InputVector::new(self.inputs.lock().clone()))
    }

    async fn read_outputs(&self) -> Result<Vec<bool>> {
        self.check_session()?;
        Ok(self.outputs.lock().clone())
    }

    async fn write_output(&self, index: usize, value: bool) -> Result<()> {
        self.check_session()?;
        let changed = {
            let mut outputs = self.outputs.lock();
            let count = outputs.len();
            let slot = outputs
                .get_mut(index)
                .ok_or(IoSrvError::InvalidIndex { index, count })?;
            let changed = *slot != value;
            *slot = value;
            changed
        };
        if changed {
            let _ = self.output_tx.send((index, value));
        }
        Ok(())
    }

    async fn write_outputs(&self, values: &[bool]) -> Result<()> {
        self.check_session()?;
        let changes: Vec<(usize, bool)> = {
            let mut outputs = self.outputs.lock();
            outputs
                .iter_mut()
                .zip(values)
                .enumerate()
                .filter_map(|(i, (current, &next))| {
                    let changed = *current != next;
                    *current = next;
                    changed.then_some((i, next))
                })
                .collect()
        };
        for change in changes {
            let _ = self.output_tx.send(change);
        }
        Ok(())
    }

    fn input_changes(&self) -> broadcast::Receiver<InputVector> {
        self.input_tx.subscribe()
    }

    fn output_changes(&self) -> broadcast::Receiver<(usize, bool)> {
        self.output_tx.subscribe()
    }
}

/// Start the random generator if this module has one (idempotent)
pub fn start_generator(module: &Arc<SimulatedIoModule>) {
    let Some(config) = module.generator else {
        return;
    };
    let mut task = module.generator_task.lock();
    if task.as_ref().map_or(true, |t| t.is_finished()) {
        *task = Some(module.spawn_generator(config));
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_module_refuses_connect() {
        let module = SimulatedIoModule::new("sim:1", 16, 16);
        module.set_reachable(false);
        assert!(module.connect().await.is_err());
        module.set_reachable(true);
        module.connect().await.unwrap();
        assert!(module.is_connected());
    }

    #[tokio::test]
    async fn test_io_requires_session() {
        let module = SimulatedIoModule::new("sim:1", 16, 4);
        assert!(matches!(
            module.read_inputs().await,
            Err(IoSrvError::NotConnected(_))
        ));
        module.connect().await.unwrap();
        assert_eq!(module.read_outputs().await.unwrap(), vec![false; 4]);
    }

    #[tokio::test]
    async fn test_writes_announce_only_changes() {
        let module = SimulatedIoModule::new("sim:1", 16, 4);
        module.connect().await.unwrap();
        let mut changes = module.output_changes();

        module.write_outputs(&[true, false, true, false]).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), (0, true));
        assert_eq!(changes.recv().await.unwrap(), (2, true));

        module.write_output(2, true).await.unwrap();
        module.write_output(3, true).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), (3, true));

        assert!(matches!(
            module.write_output(9, true).await,
            Err(IoSrvError::InvalidIndex { index: 9, count: 4 })
        ));
    }

    #[tokio::test]
    async fn test_drop_session_announces_once() {
        let module = SimulatedIoModule::new("sim:1", 16, 4);
        let mut status = module.status_events();
        module.connect().await.unwrap();

        module.drop_session();
        module.drop_session();
        assert_eq!(status.recv().await.unwrap(), EndpointStatus::Connected(false));
        assert!(status.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_pushes_snapshots() {
        let module = SimulatedIoModule::with_generator(
            "sim:1",
            16,
            4,
            GeneratorConfig {
                change_interval: Duration::from_millis(100),
                disconnect_chance: 0.0,
            },
        );
        module.connect().await.unwrap();
        let mut inputs = module.input_changes();
        start_generator(&module);

        let snapshot = inputs.recv().await.unwrap();
        assert_eq!(snapshot.len(), 16);
        module.stop();
    }
}
