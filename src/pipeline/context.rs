// =============================================================================
// Pipeline Context — the handle every stage is constructed with
// =============================================================================
//
// Holds the two stage queues, the symbol registry and the shutdown signal.
// Stages receive an `Arc<PipelineContext>` instead of reaching for globals.
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::market_data::SymbolRegistry;
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::shutdown::{ShutdownReason, ShutdownSignal};
use crate::types::WorkItem;

#[derive(Debug)]
pub struct PipelineContext {
    pub registry: Arc<SymbolRegistry>,
    /// Queue 1: ingest + timer -> writers.
    pub ingest_queue: BoundedQueue<WorkItem>,
    /// Queue 2: writers -> calculator.
    pub calc_queue: BoundedQueue<WorkItem>,
    pub shutdown: ShutdownSignal,
    active_writers: AtomicUsize,
}

impl PipelineContext {
    pub fn new(registry: Arc<SymbolRegistry>, queue_capacity: usize, writer_count: usize) -> Self {
        Self {
            registry,
            ingest_queue: BoundedQueue::new(queue_capacity),
            calc_queue: BoundedQueue::new(queue_capacity),
            shutdown: ShutdownSignal::new(),
            active_writers: AtomicUsize::new(writer_count),
        }
    }

    /// Start the shutdown cascade: flag + notify, then close the ingest
    /// queue.  Safe to call from any thread, any number of times.
    pub fn begin_shutdown(&self, reason: ShutdownReason) {
        if self.shutdown.trigger(reason) {
            info!(reason = %reason, "shutdown requested -- draining pipeline");
        }
        self.ingest_queue.close();
    }

    /// Called by each writer once it has dequeued `Closed` and forwarded its
    /// last item.  The last writer out closes the calculator queue.
    pub fn writer_departed(&self) {
        let before = self.active_writers.fetch_sub(1, Ordering::AcqRel);
        match before {
            1 => {
                info!("last writer finished -- closing calculator queue");
                self.calc_queue.close();
            }
            0 => {
                warn!("writer departed more times than writers were registered");
                self.active_writers.store(0, Ordering::Release);
                self.calc_queue.close();
            }
            _ => {}
        }
    }

    pub fn active_writers(&self) -> usize {
        self.active_writers.load(Ordering::Acquire)
    }
}
