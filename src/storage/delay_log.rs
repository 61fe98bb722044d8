// =============================================================================
// DelayLog — per-worker latency telemetry
// =============================================================================

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::types::delay_micros;

/// Append-only log of `delay_us` lines, owned by exactly one worker.
#[derive(Debug)]
pub struct DelayLog<W> {
    out: W,
    entries: u64,
}

impl<W: Write> DelayLog<W> {
    pub fn new(out: W) -> Self {
        Self { out, entries: 0 }
    }

    /// Record the time elapsed since `arrival`, measured now.
    pub fn record_since(&mut self, arrival: DateTime<Utc>) -> Result<u64> {
        let us = delay_micros(arrival, Utc::now());
        self.record(us)?;
        Ok(us)
    }

    pub fn record(&mut self, delay_us: u64) -> Result<()> {
        writeln!(self.out, "{delay_us}").context("failed to append delay line")?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("failed to flush delay log")
    }
}
