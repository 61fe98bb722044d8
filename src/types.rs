// =============================================================================
// Shared types flowing through the aggregation pipeline
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index of a tracked symbol inside the [`SymbolRegistry`].
///
/// [`SymbolRegistry`]: crate::market_data::SymbolRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub usize);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single decoded trade as delivered by the stream decoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: SymbolId,
    pub price: f64,
    pub volume: f64,
    /// Exchange timestamp, milliseconds since the Unix epoch.
    pub exchange_ts_ms: u64,
}

/// What a work item asks the downstream stages to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkKind {
    /// A real trade: logged by a writer, accumulated by the calculator.
    Trade(TradeEvent),
    /// Minute-boundary directive: the calculator flushes every symbol for
    /// `minute_index` (minutes since the Unix epoch) and resets.
    MinuteFlush { minute_index: u64 },
}

/// Unit of work handed through both pipeline queues. Copied by value and
/// never mutated after ingestion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkItem {
    pub kind: WorkKind,
    /// Wall-clock time the item entered the pipeline.
    pub arrival: DateTime<Utc>,
}

impl WorkItem {
    pub fn trade(trade: TradeEvent, arrival: DateTime<Utc>) -> Self {
        Self {
            kind: WorkKind::Trade(trade),
            arrival,
        }
    }

    pub fn minute_flush(minute_index: u64, arrival: DateTime<Utc>) -> Self {
        Self {
            kind: WorkKind::MinuteFlush { minute_index },
            arrival,
        }
    }

    pub fn is_directive(&self) -> bool {
        matches!(self.kind, WorkKind::MinuteFlush { .. })
    }
}

/// Microseconds elapsed between `since` and `now`, clamped at zero when the
/// wall clock stepped backwards.
pub fn delay_micros(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since)
        .num_microseconds()
        .map_or(0, |us| us.max(0) as u64)
}
