// =============================================================================
// Ingest Stage — stamp decoded trades and publish them to the ingest queue
// =============================================================================
//
// `IngestStage::publish` is the synchronous producer: each frame's trades go
// in under the producer-exclusivity lock so a timer directive can never land
// in the middle of a frame.  `run_ingest` is the async supervisor that keeps a
// connection alive and backs off between attempts until shutdown.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::market_data::reconnect::ReconnectPolicy;
use crate::market_data::trade_stream::{run_trade_stream, StreamEnd, TradeSink};
use crate::market_data::TradeDecoder;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::queue::Admission;
use crate::types::{TradeEvent, WorkItem};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub accepted: u64,
    pub rejected: u64,
    pub connections: u64,
    pub decoded: u64,
    pub dropped: u64,
}

pub struct IngestStage {
    ctx: Arc<PipelineContext>,
    report: IngestReport,
}

impl IngestStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            report: IngestReport::default(),
        }
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }
}

impl TradeSink for IngestStage {
    fn publish(&mut self, trades: &[TradeEvent]) -> usize {
        let queue = &self.ctx.ingest_queue;
        let _burst = queue.producer_guard();

        let mut accepted = 0;
        for (i, trade) in trades.iter().enumerate() {
            match queue.enqueue(WorkItem::trade(*trade, Utc::now())) {
                Admission::Accepted => accepted += 1,
                Admission::Rejected => {
                    let refused = (trades.len() - i) as u64;
                    self.report.rejected += refused;
                    debug!(refused, "ingest queue closing -- frame truncated");
                    break;
                }
            }
        }
        self.report.accepted += accepted as u64;
        accepted
    }
}

/// Keep the provider connection alive until shutdown.  Connection failures
/// are logged and retried after the policy's delay.
pub async fn run_ingest(
    mut stage: IngestStage,
    endpoint: String,
    api_key: String,
    mut policy: Box<dyn ReconnectPolicy>,
) -> IngestReport {
    let ctx = stage.ctx.clone();
    let mut decoder = TradeDecoder::new(ctx.registry.clone());

    while !ctx.shutdown.is_triggered() {
        stage.report.connections += 1;
        let attempt = stage.report.connections;

        match run_trade_stream(
            &endpoint,
            &api_key,
            &ctx.registry,
            &mut decoder,
            &mut stage,
            &ctx.shutdown,
        )
        .await
        {
            Ok(StreamEnd::Shutdown) => break,
            Ok(StreamEnd::Disconnected) => policy.reset(),
            Err(e) => warn!(attempt, error = %format!("{e:#}"), "trade stream error"),
        }

        let delay = policy.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.shutdown.cancelled() => break,
        }
    }

    stage.report.decoded = decoder.decoded();
    stage.report.dropped = decoder.dropped();
    info!(
        accepted = stage.report.accepted,
        dropped = stage.report.dropped,
        "ingest stopped"
    );
    stage.report
}
