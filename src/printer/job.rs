//! # Print Job
//!
//! Drives one label through the printer's job lifecycle:
//!
//! ```text
//! SET_LABEL_DENSITY ─► SET_LABEL_TYPE ─► START_PRINT ─► [ALLOW_PRINT_CLEAR]
//!        ─► START_PAGE_PRINT ─► SET_DIMENSION ─► [SET_QUANTITY]
//!        ─► rows (batched writes, unacknowledged)
//!        ─► END_PAGE_PRINT ─► settle ─► END_PRINT (poll until true)
//! ```
//!
//! Bracketed steps run only when the [`PrinterConfig`] enables them. Any
//! step answering `false` aborts the job with [`NiimbotError::StepFailed`];
//! there is no partial recovery, the caller retries the whole job.
//!
//! ## Batching
//!
//! Row frames are concatenated `batch_size` at a time into one transport
//! write. Batch boundaries are invisible to the printer.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::client::PrinterClient;
use super::config::PrinterConfig;
use crate::error::{NiimbotError, Result};
use crate::protocol::packet::Packet;
use crate::render::{Raster, RowEncoder};
use crate::transport::Transport;

/// Largest accepted batch size
pub const MAX_BATCH_SIZE: usize = 50;

/// Print job settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    /// SET_LABEL_DENSITY value, clamped to the model's range
    pub density: u8,
    /// SET_LABEL_TYPE value
    pub label_type: u8,
    /// Row frames per transport write
    pub batch_size: usize,
    /// Copies, sent only when the model supports SET_QUANTITY
    pub quantity: u16,
    /// Pause between END_PAGE_PRINT and the first END_PRINT
    pub settle_delay: Duration,
    /// Pause between END_PRINT polls
    pub end_poll_interval: Duration,
    /// Give up polling END_PRINT after this long. `None` waits forever.
    pub end_print_timeout: Option<Duration>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            density: 3,
            label_type: 1,
            batch_size: 10,
            quantity: 1,
            settle_delay: Duration::from_millis(300),
            end_poll_interval: Duration::from_millis(100),
            end_print_timeout: None,
        }
    }
}

fn require(step: &'static str, ok: bool) -> Result<()> {
    if ok {
        debug!("{} ok", step);
        Ok(())
    } else {
        Err(NiimbotError::StepFailed { step })
    }
}

/// Print `raster` as a single label.
///
/// The image must already be rotated and no wider than the model's head.
pub fn print_image<T, R>(
    client: &mut PrinterClient<T>,
    raster: R,
    config: &PrinterConfig,
    options: &PrintOptions,
) -> Result<()>
where
    T: Transport,
    R: Raster,
{
    if options.batch_size == 0 || options.batch_size > MAX_BATCH_SIZE {
        return Err(NiimbotError::InvalidArgument(format!(
            "Batch size {} out of range 1..={}",
            options.batch_size, MAX_BATCH_SIZE
        )));
    }
    config.validate_width(raster.width())?;
    let encoder = RowEncoder::new(raster)?;
    // Both bounded by RowEncoder::new
    let (width, height) = (encoder.width() as u16, encoder.height() as u16);
    let density = config.clamp_density(options.density);

    info!(
        "Printing {}x{} on {} (density {})",
        width, height, config.name, density
    );

    require("set_label_density", client.set_label_density(density)?)?;
    require("set_label_type", client.set_label_type(options.label_type)?)?;
    require("start_print", client.start_print()?)?;
    if config.allow_print_clear {
        require("allow_print_clear", client.allow_print_clear()?)?;
    }
    require("start_page_print", client.start_page_print()?)?;
    require("set_dimension", client.set_dimension(height, width)?)?;
    if config.set_quantity {
        require("set_quantity", client.set_quantity(options.quantity)?)?;
    }

    let mut batch: Vec<Packet> = Vec::with_capacity(options.batch_size);
    for row in &encoder {
        batch.push(row.to_packet()?);
        if batch.len() == options.batch_size {
            client.send_batch(&batch)?;
            batch.clear();
        }
    }
    client.send_batch(&batch)?;
    debug!("Sent {} rows", height);

    require("end_page_print", client.end_page_print()?)?;
    thread::sleep(options.settle_delay);
    wait_for_end_print(client, options)?;

    info!("Print complete");
    Ok(())
}

/// Poll END_PRINT until the printer reports the job finished.
fn wait_for_end_print<T: Transport>(
    client: &mut PrinterClient<T>,
    options: &PrintOptions,
) -> Result<()> {
    let start = Instant::now();
    loop {
        match client.end_print() {
            Ok(true) => return Ok(()),
            // Still printing: either an explicit false or no answer yet
            Ok(false) | Err(NiimbotError::NoResponse { .. }) => {}
            Err(e) => return Err(e),
        }
        if options
            .end_print_timeout
            .is_some_and(|limit| start.elapsed() >= limit)
        {
            return Err(NiimbotError::StepFailed { step: "end_print" });
        }
        thread::sleep(options.end_poll_interval);
    }
}

// ============================================================================
// TESTS
// ============================================================================
