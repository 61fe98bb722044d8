// =============================================================================
// Directive Timer — minute-boundary flush directives and the run-time limit
// =============================================================================
//
// Wakes at every wall-clock :00 second boundary (the first one after start,
// not start + 60s), enqueues a `MinuteFlush` for the minute that just ended
// under the producer lock, and counts elapsed minutes.  Once the configured
// number of hours has elapsed it starts the shutdown cascade.  It does no
// file I/O.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::pipeline::context::PipelineContext;
use crate::pipeline::queue::Admission;
use crate::pipeline::shutdown::ShutdownReason;
use crate::types::WorkItem;

const MINUTE_MS: i64 = 60_000;

/// What happened on one timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    Continue,
    /// The hour limit was reached and shutdown has begun.
    LimitReached,
    /// The ingest queue is already closing; the directive was dropped.
    Closed,
}

/// The first whole minute strictly after `now`.
pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let into_minute = now.timestamp_millis().rem_euclid(MINUTE_MS);
    now + chrono::Duration::milliseconds(MINUTE_MS - into_minute)
}

/// Boundary the timer should fire at next.  A wake-up that lands just short
/// of the boundary it was aiming for must not pick that boundary again.
pub fn next_fire_at(now: DateTime<Utc>, last_fired: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let next = next_minute_boundary(now);
    match last_fired {
        Some(last) if next <= last => last + chrono::Duration::milliseconds(MINUTE_MS),
        _ => next,
    }
}

/// Index (minutes since the epoch) of the minute that ended at the boundary
/// just crossed.
pub fn completed_minute(now: DateTime<Utc>) -> u64 {
    (now.timestamp().max(60) / 60 - 1) as u64
}

pub struct DirectiveTimer {
    ctx: Arc<PipelineContext>,
    /// Zero disables the limit.
    hour_limit: u64,
    minutes_elapsed: u64,
}

impl DirectiveTimer {
    pub fn new(ctx: Arc<PipelineContext>, hour_limit: u64) -> Self {
        Self {
            ctx,
            hour_limit,
            minutes_elapsed: 0,
        }
    }

    pub fn minutes_elapsed(&self) -> u64 {
        self.minutes_elapsed
    }

    /// Handle one minute boundary observed at `now`.
    pub fn fire(&mut self, now: DateTime<Utc>) -> TimerTick {
        self.minutes_elapsed += 1;
        if self.minutes_elapsed % 60 == 1 {
            info!(hour = self.minutes_elapsed / 60, "hour marker");
        }

        let directive = WorkItem::minute_flush(completed_minute(now), now);
        let admission = {
            let _burst = self.ctx.ingest_queue.producer_guard();
            self.ctx.ingest_queue.enqueue(directive)
        };
        if admission == Admission::Rejected {
            warn!("ingest queue closing -- minute directive dropped");
            return TimerTick::Closed;
        }

        if self.hour_limit > 0 && self.minutes_elapsed >= self.hour_limit * 60 {
            info!(hours = self.hour_limit, "hour limit reached");
            self.ctx.begin_shutdown(ShutdownReason::HourLimit);
            return TimerTick::LimitReached;
        }
        TimerTick::Continue
    }

    /// Fire at every minute boundary until shutdown or the hour limit.
    pub async fn run(mut self) {
        let ctx = self.ctx.clone();
        info!(hour_limit = self.hour_limit, "directive timer started");

        let mut last_fired = None;
        loop {
            let now = Utc::now();
            let boundary = next_fire_at(now, last_fired);
            let wait = (boundary - now).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_fired = Some(boundary);
                    let tick = tokio::task::block_in_place(|| self.fire(boundary));
                    if tick != TimerTick::Continue {
                        break;
                    }
                }
                _ = ctx.shutdown.cancelled() => break,
            }
        }
        info!(minutes = self.minutes_elapsed(), "directive timer stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
