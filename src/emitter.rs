// =============================================================================
// emitter.rs - JSON LINES OUT
// =============================================================================
//
// Extraction tasks finish in whatever order the upstream answers. Each one
// drops its `JobResult` into a bounded crossbeam channel; a single emitter
// thread owns the output and writes one JSON object per line, so lines from
// concurrent jobs never interleave.
//
// The loop blocks on the first result, then drains whatever else is already
// queued (up to BATCH_SIZE) before one flush. It ends when every sender is
// gone, which is how the binary says "no more jobs".
// =============================================================================

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::Receiver;
use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::extractors::JobResult;

const BATCH_SIZE: usize = 64;

pub struct Emitter<W: Write> {
    receiver: Receiver<JobResult>,
    writer: W,
    stats: Arc<EmitterStats>,
}

#[derive(Default)]
pub struct EmitterStats {
    pub lines_written: AtomicU64,
    pub write_errors: AtomicU64,
    pub batches_flushed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmitterSnapshot {
    pub lines_written: u64,
    pub write_errors: u64,
    pub batches_flushed: u64,
}

impl EmitterStats {
    pub fn snapshot(&self) -> EmitterSnapshot {
        EmitterSnapshot {
            lines_written: self.lines_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
        }
    }
}

impl<W: Write> Emitter<W> {
    pub fn new(receiver: Receiver<JobResult>, writer: W) -> (Self, Arc<EmitterStats>) {
        let stats = Arc::new(EmitterStats::default());
        (
            Self {
                receiver,
                writer,
                stats: Arc::clone(&stats),
            },
            stats,
        )
    }

    /// Write results until the channel disconnects. Hands the writer back.
    ///
    /// A result that fails to serialize is counted and skipped; an I/O error
    /// on the writer ends the loop, since nothing after it would land either.
    pub fn run(mut self) -> Result<W> {
        info!("Emitter started");
        let mut batch: Vec<JobResult> = Vec::with_capacity(BATCH_SIZE);

        while let Ok(first) = self.receiver.recv() {
            batch.push(first);
            while batch.len() < BATCH_SIZE {
                match self.receiver.try_recv() {
                    Ok(result) => batch.push(result),
                    Err(_) => break,
                }
            }

            self.write_batch(&batch)?;
            batch.clear();
        }

        info!(
            lines = self.stats.lines_written.load(Ordering::Relaxed),
            "Channel disconnected, emitter done"
        );
        Ok(self.writer)
    }

    fn write_batch(&mut self, batch: &[JobResult]) -> Result<()> {
        for result in batch {
            let line = match serde_json::to_string(result) {
                Ok(line) => line,
                Err(e) => {
                    error!(kind = result.kind, id = %result.id, error = %e, "Failed to serialize result");
                    self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            if let Err(e) = writeln!(self.writer, "{}", line) {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
            self.stats.lines_written.fetch_add(1, Ordering::Relaxed);
        }
        self.writer.flush()?;
        self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
        debug!(batch_size = batch.len(), "Batch flushed");
        Ok(())
    }
}
