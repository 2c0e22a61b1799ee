//! Service assembly
//!
//! Builds every component from an [`IoSrvConfig`] and registers the
//! long-running loops with one [`TaskSupervisor`]. Bootstrap order:
//! databases → devices and supervisors → pipeline stages → drainer → sync.

use std::sync::Arc;
use std::time::Duration;

use common::sqlite::SqliteClient;
use common::TaskSupervisor;
use pulse_model::PatternMapping;
use pulse_rules::PatternCache;
use pulse_store::schema::{ensure_fallback_schema, ensure_primary_schema};
use pulse_store::sync::{EntitySync, SyncJob, SyncSchedule};
use pulse_store::{
    AuditLog, DrainerConfig, ExecutionRetry, ReliableWriter, RetryDrainer, RetryQueue,
    SqlRecordStore,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::blink::BlinkController;
use crate::config::IoSrvConfig;
use crate::device::simulated::{start_generator, GeneratorConfig};
use crate::device::{InputDevice, OutputDevice, SimulatedIoModule, SupervisedIo};
use crate::error::{IoSrvError, Result};
use crate::pipeline::{
    refresh_rules_on_sync, BlinkTiming, EventRecorder, InputMonitor, OutputUpdater,
};
use crate::supervisor::ConnectionSupervisor;

/// A running gateway
pub struct Gateway {
    tasks: TaskSupervisor,
    input_supervisor: Arc<ConnectionSupervisor>,
    output_supervisor: Arc<ConnectionSupervisor>,
    input_module: Arc<SimulatedIoModule>,
    output_module: Arc<SimulatedIoModule>,
    blinker: Arc<BlinkController>,
    cache: Arc<PatternCache>,
    queue: RetryQueue,
    audit: AuditLog,
    primary: SqliteClient,
    fallback: Option<SqliteClient>,
}

impl Gateway {
    /// Open the stores, build the pipeline and start every background loop
    pub async fn start(config: &IoSrvConfig) -> Result<Self> {
        let tasks = TaskSupervisor::new();
        let lifetime = tasks.token();

        // ============ Phase 1: Databases ============
        let primary = open_store(&config.database.primary_path).await?;
        if let Err(e) = ensure_primary_schema(primary.pool()).await {
            warn!("Primary store schema check failed (continuing): {}", e);
        }

        let fallback = if config.database.enable_fallback {
            let client = open_store(&config.database.fallback_path).await?;
            ensure_fallback_schema(client.pool()).await?;
            Some(client)
        } else {
            info!("Fallback store disabled, queueing retries in the primary store");
            ensure_fallback_schema(primary.pool()).await?;
            None
        };
        let local_pool = fallback
            .as_ref()
            .map_or_else(|| primary.pool().clone(), |c| c.pool().clone());

        let store = Arc::new(SqlRecordStore::with_retry(
            primary.pool().clone(),
            ExecutionRetry {
                attempts: config.database.store_retry_attempts,
                delay: Duration::from_millis(config.database.store_retry_delay_ms),
            },
        ));
        let queue = RetryQueue::new(local_pool.clone());
        let audit = AuditLog::new(primary.pool().clone());
        let writer = ReliableWriter::new(store.clone(), queue.clone());
        let cache = Arc::new(PatternCache::from_pool(local_pool.clone()));

        // ============ Phase 2: Devices ============
        let interval = config.connection.reconnect_interval();
        let input_module = simulated_input(config);
        let output_module = SimulatedIoModule::new(
            config.output_device.address.clone(),
            0,
            config.output_device.number_of_outputs,
        );
        let input_supervisor =
            ConnectionSupervisor::new("input", input_module.clone(), interval, &lifetime);
        let output_supervisor =
            ConnectionSupervisor::new("output", output_module.clone(), interval, &lifetime);

        let input: Arc<dyn InputDevice> = Arc::new(SupervisedIo::new(
            input_module.clone(),
            input_supervisor.clone(),
        ));
        let output: Arc<dyn OutputDevice> = Arc::new(SupervisedIo::new(
            output_module.clone(),
            output_supervisor.clone(),
        ));

        // ============ Phase 3: Pipeline ============
        let blinker = Arc::new(BlinkController::new(config.blink.mode, &lifetime));
        let outputs = Arc::new(OutputUpdater::new(
            output,
            blinker.clone(),
            BlinkTiming {
                period: config.blink.period(),
                duration: config.blink.duration(),
            },
            config.output_device.number_of_outputs,
            lifetime.child_token(),
        ));
        if let Err(e) = outputs.start().await {
            warn!("Output device not ready at startup: {}", e);
        }
        {
            let outputs = outputs.clone();
            tasks.spawn("output-watch", move |token| async move {
                outputs.watch_connection(token).await;
            });
        }

        let (tx, rx) = mpsc::channel(config.pipeline.queue_capacity);
        let monitor = InputMonitor::new(input, tx);
        tasks.spawn("input-monitor", move |token| monitor.run(token));
        if config.simulation.enabled {
            start_generator(&input_module);
        }

        let recorder = EventRecorder::new(
            config.machine.machine_id,
            cache.clone(),
            writer,
            outputs,
        )
        .suppress_duplicates(config.pipeline.suppress_duplicates)
        .input_names(config.input_device.input_names.clone());
        tasks.spawn("event-recorder", move |token| recorder.run(rx, token));

        // ============ Phase 4: Retry drainer ============
        let drainer = RetryDrainer::new(
            store,
            queue.clone(),
            audit.clone(),
            DrainerConfig {
                interval: Duration::from_secs(config.retry.interval_secs),
                max_attempts: config.retry.max_attempts,
            },
        );
        tasks.spawn("retry-drainer", move |token| async move {
            drainer.run(token).await;
        });

        // ============ Phase 5: Rule table sync ============
        if let Some(fallback) = &fallback {
            let job = SyncJob::new(
                primary.pool().clone(),
                fallback.pool().clone(),
                SyncSchedule {
                    hour: config.sync.hour,
                    run_on_startup: config.sync.run_on_startup,
                },
            )
            .with_table(EntitySync::<PatternMapping>::new());

            let summaries = job.subscribe();
            let refresh_cache = cache.clone();
            tasks.spawn("rule-refresh", move |token| {
                refresh_rules_on_sync(refresh_cache, summaries, token)
            });
            tasks.spawn("rule-sync", move |token| async move {
                job.run(token).await;
            });
        }

        info!("Gateway started with {} background tasks", tasks.len());
        Ok(Self {
            tasks,
            input_supervisor,
            output_supervisor,
            input_module,
            output_module,
            blinker,
            cache,
            queue,
            audit,
            primary,
            fallback,
        })
    }

    /// Lifetime token shared by every background loop
    pub fn token(&self) -> common::CancellationToken {
        self.tasks.token()
    }

    pub fn input_module(&self) -> &Arc<SimulatedIoModule> {
        &self.input_module
    }

    pub fn output_module(&self) -> &Arc<SimulatedIoModule> {
        &self.output_module
    }

    pub fn input_supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.input_supervisor
    }

    pub fn output_supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.output_supervisor
    }

    pub fn cache(&self) -> &Arc<PatternCache> {
        &self.cache
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn primary(&self) -> &SqliteClient {
        &self.primary
    }

    /// Stop every loop, release the devices and close the stores
    pub async fn shutdown(self, grace: Duration) {
        let stragglers = self.tasks.shutdown(grace).await;
        if stragglers > 0 {
            warn!("{} tasks had to be aborted", stragglers);
        }

        self.blinker.shutdown().await;
        self.input_supervisor.shutdown().await;
        self.output_supervisor.shutdown().await;
        self.input_module.stop();
        self.output_module.stop();

        self.primary.close().await;
        if let Some(fallback) = &self.fallback {
            fallback.close().await;
        }
        info!("Gateway stopped");
    }
}

async fn open_store(path: &std::path::Path) -> Result<SqliteClient> {
    SqliteClient::new(path).await.map_err(|e| {
        IoSrvError::StorageError(format!("Failed to open {}: {}", path.display(), e))
    })
}

fn simulated_input(config: &IoSrvConfig) -> Arc<SimulatedIoModule> {
    SimulatedIoModule::with_generator(
        config.input_device.address.clone(),
        config.input_device.number_of_inputs,
        0,
        GeneratorConfig {
            change_interval: Duration::from_millis(config.simulation.change_interval_ms),
            disconnect_chance: config.simulation.disconnect_chance,
        },
    )
}
