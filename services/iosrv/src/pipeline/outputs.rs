//! Lamp output stage
//!
//! Turns a matched pattern into a blink request: the current output vector
//! marks what blinks, the pattern's three output bits (padded with `false`)
//! are where it settles.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use pulse_model::PatternMapping;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::blink::{BlinkController, BlinkRequest, TickFn};
use crate::device::OutputDevice;
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct BlinkTiming {
    pub period: Duration,
    pub duration: Duration,
}

pub struct OutputUpdater {
    device: Arc<dyn OutputDevice>,
    blinker: Arc<BlinkController>,
    timing: BlinkTiming,
    output_count: usize,
    lifetime: CancellationToken,
}

impl OutputUpdater {
    pub fn new(
        device: Arc<dyn OutputDevice>,
        blinker: Arc<BlinkController>,
        timing: BlinkTiming,
        output_count: usize,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            device,
            blinker,
            timing,
            output_count,
            lifetime,
        }
    }

    /// Connect and log the outputs currently shown
    pub async fn start(&self) -> Result<Vec<bool>> {
        self.device.connect(&self.lifetime).await?;
        info!("Output controller starting");

        let current = self.device.read_outputs(&self.lifetime).await?;
        info!("Current output is {}", format_bits(&current));
        Ok(current)
    }

    /// Settle the lamps on `mapping`'s outputs, blinking what is lit now
    pub async fn update(&self, mapping: &PatternMapping) {
        info!("Input status is {}", mapping.input_status);

        let final_values = final_values(mapping, self.output_count);
        let mask = match self.device.read_outputs(&self.lifetime).await {
            Ok(current) => current,
            Err(e) => {
                warn!("Could not read outputs before update, not blinking: {}", e);
                Vec::new()
            },
        };
        info!(
            "New output status is {}",
            format_bits(&final_values[..final_values.len().min(3)])
        );

        self.blinker.start_or_restart(BlinkRequest {
            mask,
            final_values,
            tick: self.tick_fn(),
            period: self.timing.period,
            duration: self.timing.duration,
        });
    }

    /// Log connectivity changes of the output module until cancelled
    pub async fn watch_connection(&self, token: CancellationToken) {
        let mut connection = self.device.subscribe_connection();
        loop {
            tokio::select! {
                status = connection.recv() => match status {
                    Ok(status) if status.is_down() => warn!("Output device disconnected unexpectedly!"),
                    Ok(_) => info!("Output device connected"),
                    Err(RecvError::Lagged(_)) => {},
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => break,
            }
        }
    }

    fn tick_fn(&self) -> TickFn {
        let device = self.device.clone();
        let cancel = self.lifetime.clone();
        Arc::new(move |values: Vec<bool>| {
            let device = device.clone();
            let cancel = cancel.clone();
            async move {
                device.set_outputs(&values, &cancel).await?;
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
    }
}

/// `[od0, od1, od2]` padded with `false` to `count` outputs
pub fn final_values(mapping: &PatternMapping, count: usize) -> Vec<bool> {
    let mut values = mapping.output_bits().to_vec();
    values.resize(count.max(values.len()), false);
    values
}

fn format_bits(bits: &[bool]) -> String {
    bits.iter()
        .map(|&b| if b { "1" } else { "0" })
        .collect::<Vec<_>>()
        .join(", ")
}
