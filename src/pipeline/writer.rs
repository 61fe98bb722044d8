// =============================================================================
// Writer Stage — persist raw trades, forward everything to the calculator
// =============================================================================
//
// Runs on its own OS thread; several writers share the ingest queue.  For each
// dequeued item:
//   - trades are appended to the symbol's trade log together with a delay
//     line, under that symbol's lock only;
//   - trades and directives alike are forwarded unchanged to the calculator
//     queue once this writer is done with them.
// On `Closed` the writer departs; the last one out closes the calculator
// queue so no sibling can be cut off mid-forward.
// =============================================================================

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::pipeline::context::PipelineContext;
use crate::pipeline::queue::{Admission, Dequeued};
use crate::pipeline::shutdown::ShutdownReason;
use crate::storage::{trade_line, CsvBatch, DelayLog};
use crate::types::{WorkItem, WorkKind};

/// Counters reported when a writer exits.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriterReport {
    pub writer: usize,
    pub trades_logged: u64,
    pub directives_forwarded: u64,
    /// Items the calculator queue refused because it was already closing.
    pub rejected: u64,
}

pub struct WriterStage<W, D> {
    id: usize,
    ctx: Arc<PipelineContext>,
    trade_logs: Arc<CsvBatch<W>>,
    delays: DelayLog<D>,
    report: WriterReport,
}

impl<W: Write, D: Write> WriterStage<W, D> {
    pub fn new(
        id: usize,
        ctx: Arc<PipelineContext>,
        trade_logs: Arc<CsvBatch<W>>,
        delays: DelayLog<D>,
    ) -> Self {
        Self {
            id,
            ctx,
            trade_logs,
            delays,
            report: WriterReport {
                writer: id,
                ..WriterReport::default()
            },
        }
    }

    /// Drain the ingest queue until it reports `Closed`.
    ///
    /// A write failure stops this writer and starts a pipeline shutdown; the
    /// error is returned so the process exits non-zero.
    pub fn run(mut self) -> Result<WriterReport> {
        info!(writer = self.id, "writer started");

        let outcome = self.drain().and_then(|()| self.delays.flush());
        if let Err(e) = &outcome {
            error!(writer = self.id, error = %format!("{e:#}"), "writer failed");
            self.ctx.begin_shutdown(ShutdownReason::WorkerFailure);
        }
        self.ctx.writer_departed();

        info!(
            writer = self.id,
            trades = self.report.trades_logged,
            directives = self.report.directives_forwarded,
            "writer finished"
        );
        outcome.map(|()| self.report)
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            let item = match self.ctx.ingest_queue.dequeue() {
                Dequeued::Item(item) => item,
                Dequeued::Closed => {
                    debug!(writer = self.id, "ingest queue closed");
                    return Ok(());
                }
            };
            self.process(&item)?;
            self.forward(item);
        }
    }

    fn process(&mut self, item: &WorkItem) -> Result<()> {
        match item.kind {
            WorkKind::Trade(trade) => {
                let line = trade_line(&trade);
                let delays = &mut self.delays;
                self.trade_logs.with_writer(trade.symbol, |w| {
                    writeln!(w, "{line}")?;
                    delays.record_since(item.arrival)?;
                    Ok(())
                })?;
                self.report.trades_logged += 1;
            }
            WorkKind::MinuteFlush { minute_index } => {
                debug!(writer = self.id, minute = minute_index, "forwarding minute directive");
                self.report.directives_forwarded += 1;
            }
        }
        Ok(())
    }

    fn forward(&mut self, item: WorkItem) {
        if self.ctx.calc_queue.enqueue(item) == Admission::Rejected {
            self.report.rejected += 1;
            warn!(writer = self.id, "calculator queue closing -- item dropped");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::SymbolRegistry;
    use crate::storage::test_support::{FailingWriter, SharedBuf};
    use crate::types::{SymbolId, TradeEvent};
    use chrono::Utc;
    use std::thread;

    fn ctx_with(capacity: usize, writers: usize) -> Arc<PipelineContext> {
        let reg = SymbolRegistry::new(["AAPL", "NIO"]).unwrap();
        Arc::new(PipelineContext::new(Arc::new(reg), capacity, writers))
    }

    fn ctx(writers: usize) -> Arc<PipelineContext> {
        ctx_with(64, writers)
    }

    fn trade(symbol: usize, price: f64, ts: u64) -> WorkItem {
        WorkItem::trade(
            TradeEvent {
                symbol: SymbolId(symbol),
                price,
                volume: 1.0,
                exchange_ts_ms: ts,
            },
            Utc::now(),
        )
    }

    fn drain_calc(ctx: &PipelineContext) -> Vec<WorkItem> {
        let mut out = Vec::new();
        while let Dequeued::Item(item) = ctx.calc_queue.dequeue() {
            out.push(item);
        }
        out
    }

    #[test]
    fn single_writer_logs_and_forwards_in_order() {
        let ctx = ctx(1);
        let logs = vec![SharedBuf::new(), SharedBuf::new()];
        let delays = SharedBuf::new();
        let stage = WriterStage::new(
            0,
            ctx.clone(),
            Arc::new(CsvBatch::new(logs.clone())),
            DelayLog::new(delays.clone()),
        );

        let items = vec![
            trade(0, 100.0, 1),
            trade(1, 5.5, 2),
            WorkItem::minute_flush(42, Utc::now()),
            trade(0, 101.0, 3),
        ];
        for item in &items {
            assert_eq!(ctx.ingest_queue.enqueue(*item), Admission::Accepted);
        }
        ctx.begin_shutdown(ShutdownReason::Interrupt);

        let report = stage.run().unwrap();
        assert_eq!(report.trades_logged, 3);
        assert_eq!(report.directives_forwarded, 1);
        assert_eq!(report.rejected, 0);

        assert_eq!(logs[0].lines(), vec!["1,100.000000,1.000000", "3,101.000000,1.000000"]);
        assert_eq!(logs[1].lines(), vec!["2,5.500000,1.000000"]);
        assert_eq!(delays.lines().len(), 3);

        // Calculator queue closed by the only writer, after every forward.
        assert!(ctx.calc_queue.is_closing());
        assert_eq!(drain_calc(&ctx), items);
    }

    #[test]
    fn buffered_items_reach_writers_before_closed() {
        const N: u64 = 500;
        const WRITERS: usize = 3;
        let ctx_big = ctx_with(1024, WRITERS);
        let logs = Arc::new(CsvBatch::new(vec![SharedBuf::new(), SharedBuf::new()]));

        // Fill first, then close: everything is already buffered.
        for ts in 0..N {
            assert_eq!(
                ctx_big.ingest_queue.enqueue(trade((ts % 2) as usize, 1.0, ts)),
                Admission::Accepted
            );
        }
        ctx_big.begin_shutdown(ShutdownReason::HourLimit);

        // Calculator side drains concurrently so writers never stall.
        let calc = {
            let ctx = ctx_big.clone();
            thread::spawn(move || drain_calc(&ctx))
        };

        let writers: Vec<_> = (0..WRITERS)
            .map(|id| {
                let stage = WriterStage::new(
                    id,
                    ctx_big.clone(),
                    logs.clone(),
                    DelayLog::new(SharedBuf::new()),
                );
                thread::spawn(move || stage.run().unwrap())
            })
            .collect();

        let reports: Vec<_> = writers.into_iter().map(|w| w.join().unwrap()).collect();
        let forwarded = calc.join().unwrap();

        let logged: u64 = reports.iter().map(|r| r.trades_logged).sum();
        let rejected: u64 = reports.iter().map(|r| r.rejected).sum();
        assert_eq!(logged, N);
        assert_eq!(rejected, 0);
        assert_eq!(forwarded.len() as u64, N);

        let mut ts: Vec<u64> = forwarded
            .iter()
            .filter_map(|i| match i.kind {
                WorkKind::Trade(t) => Some(t.exchange_ts_ms),
                WorkKind::MinuteFlush { .. } => None,
            })
            .collect();
        ts.sort_unstable();
        assert_eq!(ts, (0..N).collect::<Vec<_>>());
    }

    #[test]
    fn write_failure_shuts_the_pipeline_down() {
        let ctx = ctx(1);
        let stage = WriterStage::new(
            0,
            ctx.clone(),
            Arc::new(CsvBatch::new(vec![FailingWriter, FailingWriter])),
            DelayLog::new(SharedBuf::new()),
        );
        assert_eq!(ctx.ingest_queue.enqueue(trade(0, 1.0, 1)), Admission::Accepted);

        assert!(stage.run().is_err());
        assert_eq!(ctx.shutdown.reason(), Some(ShutdownReason::WorkerFailure));
        assert!(ctx.ingest_queue.is_closing());
        assert!(ctx.calc_queue.is_closing());
    }
}
