//! Blink controller
//!
//! Drives the output lamps through "blink some bits for a while, then settle
//! on the final values". Only the newest request matters: a one-slot mailbox
//! keeps at most one pending request, and starting a new one cancels the
//! request currently running. One worker task serves the mailbox for the
//! controller's lifetime.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BlinkMode;

const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pushes one output vector to the device
pub type TickFn = Arc<dyn Fn(Vec<bool>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct BlinkRequest {
    /// Output indices that blink (`true` = blink)
    pub mask: Vec<bool>,
    pub final_values: Vec<bool>,
    pub tick: TickFn,
    pub period: Duration,
    pub duration: Duration,
}

struct Job {
    request: BlinkRequest,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Mailbox {
    pending: Mutex<Option<Job>>,
    notify: Notify,
}

pub struct BlinkController {
    mailbox: Arc<Mailbox>,
    /// Cancellation handle of the newest request
    active: Mutex<Option<CancellationToken>>,
    lifetime: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BlinkController {
    pub fn new(mode: BlinkMode, parent: &CancellationToken) -> Self {
        let mailbox = Arc::new(Mailbox::default());
        let lifetime = parent.child_token();
        let worker = tokio::spawn(worker_loop(mode, mailbox.clone(), lifetime.clone()));
        Self {
            mailbox,
            active: Mutex::new(None),
            lifetime,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Supersede whatever is running and queue `request`. Returns immediately.
    pub fn start_or_restart(&self, request: BlinkRequest) {
        let cancel = self.lifetime.child_token();
        {
            let mut active = self.active.lock();
            if let Some(previous) = active.replace(cancel.clone()) {
                previous.cancel();
            }
            let discarded = self.mailbox.pending.lock().replace(Job { request, cancel });
            if discarded.is_some() {
                debug!("Discarded pending blink request");
            }
        }
        self.mailbox.notify.notify_one();
    }

    /// Cancel the running request and stop the worker
    pub async fn shutdown(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel();
        }
        self.lifetime.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if tokio::time::timeout(JOIN_TIMEOUT, worker).await.is_err() {
                warn!("Blink worker did not stop in time");
            }
        }
    }
}

async fn worker_loop(mode: BlinkMode, mailbox: Arc<Mailbox>, lifetime: CancellationToken) {
    debug!("Blink worker started ({:?} mode)", mode);
    loop {
        if lifetime.is_cancelled() {
            break;
        }
        let job = mailbox.pending.lock().take();
        match job {
            Some(job) => {
                // A panicking tick ends its own request, not the worker
                if AssertUnwindSafe(process(mode, job)).catch_unwind().await.is_err() {
                    error!("Blink request panicked, discarding it");
                }
            },
            None => {
                tokio::select! {
                    _ = mailbox.notify.notified() => {},
                    _ = lifetime.cancelled() => break,
                }
            },
        }
    }
    info!("Blink worker stopped");
}

async fn process(mode: BlinkMode, job: Job) {
    let Job { request, cancel } = job;
    let BlinkRequest {
        mask,
        final_values,
        tick,
        period,
        duration,
    } = request;

    if cancel.is_cancelled() {
        return;
    }
    if !mask.iter().any(|&bit| bit) {
        apply(&tick, final_values).await;
        return;
    }

    let deadline = Instant::now() + duration;
    let mut scratch = final_values.clone();
    let mut phase = 0usize;

    let completed = loop {
        if cancel.is_cancelled() {
            break false;
        }
        if Instant::now() >= deadline {
            break true;
        }

        step(mode, &mut scratch, &mask, &final_values, phase);
        phase += 1;
        apply(&tick, scratch.clone()).await;

        tokio::select! {
            _ = tokio::time::sleep(period) => {},
            _ = cancel.cancelled() => break false,
        }
    };

    if completed {
        apply(&tick, final_values).await;
    } else {
        debug!("Blink request superseded after {} ticks", phase);
    }
}

/// Advance the marked bits of `scratch` by one tick
fn step(mode: BlinkMode, scratch: &mut [bool], mask: &[bool], final_values: &[bool], phase: usize) {
    let marked = scratch
        .iter_mut()
        .zip(final_values)
        .zip(mask)
        .filter_map(|(pair, &marked)| marked.then_some(pair));

    match mode {
        BlinkMode::Toggle => {
            for (bit, _) in marked {
                *bit = !*bit;
            }
        },
        BlinkMode::Pattern => {
            let show = phase % 2 == 0;
            for (bit, &target) in marked {
                *bit = show && target;
            }
        },
    }
}

async fn apply(tick: &TickFn, values: Vec<bool>) {
    if let Err(e) = tick(values).await {
        warn!("Blink tick failed: {}", e);
    }
}
