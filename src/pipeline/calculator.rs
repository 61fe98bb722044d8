// =============================================================================
// Calculator Stage — candlesticks and 15-minute rolling averages
// =============================================================================
//
// Single worker on its own OS thread.  It alone owns the per-symbol buffers,
// so they need no lock.  Trades fold into the open candlestick; a minute
// directive rolls every symbol's window, writes the average + candlestick
// lines with delay telemetry, and resets the candlesticks.
// =============================================================================

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::market_data::{MinuteSummary, SymbolBuffer};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::queue::Dequeued;
use crate::pipeline::shutdown::ShutdownReason;
use crate::storage::{average_line, candle_line, CsvBatch, DelayLog};
use crate::types::{SymbolId, TradeEvent, WorkKind};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalculatorReport {
    pub trades_applied: u64,
    pub minutes_flushed: u64,
    pub candles_written: u64,
}

/// Output sinks owned by the calculator.
pub struct CalculatorSinks<W, D> {
    pub candlesticks: CsvBatch<W>,
    pub moving_avg: CsvBatch<W>,
    pub delays: DelayLog<D>,
}

impl<W: Write, D: Write> CalculatorSinks<W, D> {
    fn flush(&mut self) -> Result<()> {
        self.candlesticks.flush_all()?;
        self.moving_avg.flush_all()?;
        self.delays.flush()
    }
}

pub struct CalculatorStage<W, D> {
    ctx: Arc<PipelineContext>,
    buffers: Vec<SymbolBuffer>,
    sinks: CalculatorSinks<W, D>,
    report: CalculatorReport,
}

impl<W: Write, D: Write> CalculatorStage<W, D> {
    pub fn new(ctx: Arc<PipelineContext>, sinks: CalculatorSinks<W, D>) -> Self {
        let buffers = vec![SymbolBuffer::new(); ctx.registry.len()];
        Self {
            ctx,
            buffers,
            sinks,
            report: CalculatorReport::default(),
        }
    }

    /// Drain the calculator queue until it reports `Closed`.
    pub fn run(mut self) -> Result<CalculatorReport> {
        info!(symbols = self.buffers.len(), "calculator started");

        let outcome = self.drain().and_then(|()| self.sinks.flush());
        if let Err(e) = &outcome {
            error!(error = %format!("{e:#}"), "calculator failed");
            self.ctx.begin_shutdown(ShutdownReason::WorkerFailure);
            // Nobody drains Queue₂ any more; release writers parked on it.
            self.ctx.calc_queue.close();
        }

        info!(
            trades = self.report.trades_applied,
            minutes = self.report.minutes_flushed,
            "calculator finished"
        );
        outcome.map(|()| self.report)
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            match self.ctx.calc_queue.dequeue() {
                Dequeued::Item(item) => match item.kind {
                    WorkKind::Trade(trade) => self.apply_trade(&trade),
                    WorkKind::MinuteFlush { minute_index } => {
                        self.flush_minute(minute_index, item.arrival)?
                    }
                },
                Dequeued::Closed => {
                    debug!("calculator queue closed");
                    return Ok(());
                }
            }
        }
    }

    fn apply_trade(&mut self, trade: &TradeEvent) {
        match self.buffers.get_mut(trade.symbol.index()) {
            Some(buf) => {
                buf.record_trade(trade.price, trade.volume);
                self.report.trades_applied += 1;
            }
            None => debug!(symbol = %trade.symbol, "trade for unknown symbol index"),
        }
    }

    /// Roll every symbol for `minute_index` and write its lines.
    fn flush_minute(&mut self, minute_index: u64, arrival: DateTime<Utc>) -> Result<()> {
        for i in 0..self.buffers.len() {
            let summary = self.buffers[i].roll_minute(minute_index);
            self.write_summary(SymbolId(i), &summary, arrival)?;
        }
        self.report.minutes_flushed += 1;
        debug!(minute = minute_index, "minute flushed");
        Ok(())
    }

    fn write_summary(
        &mut self,
        id: SymbolId,
        summary: &MinuteSummary,
        arrival: DateTime<Utc>,
    ) -> Result<()> {
        self.sinks
            .moving_avg
            .append(id, &average_line(summary.minute_index, &summary.average))?;
        self.sinks.delays.record_since(arrival)?;
        if let Some(bar) = &summary.candle {
            self.sinks
                .candlesticks
                .append(id, &candle_line(summary.minute_index, bar))?;
            self.report.candles_written += 1;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::SymbolRegistry;
    use crate::pipeline::queue::Admission;
    use crate::storage::test_support::SharedBuf;
    use crate::types::WorkItem;

    struct Harness {
        ctx: Arc<PipelineContext>,
        candles: Vec<SharedBuf>,
        averages: Vec<SharedBuf>,
        delays: SharedBuf,
    }

    fn harness(symbols: &[&str]) -> (Harness, CalculatorStage<SharedBuf, SharedBuf>) {
        let reg = SymbolRegistry::new(symbols.iter().copied()).unwrap();
        let ctx = Arc::new(PipelineContext::new(Arc::new(reg), 64, 1));
        let candles: Vec<_> = symbols.iter().map(|_| SharedBuf::new()).collect();
        let averages: Vec<_> = symbols.iter().map(|_| SharedBuf::new()).collect();
        let delays = SharedBuf::new();
        let stage = CalculatorStage::new(
            ctx.clone(),
            CalculatorSinks {
                candlesticks: CsvBatch::new(candles.clone()),
                moving_avg: CsvBatch::new(averages.clone()),
                delays: DelayLog::new(delays.clone()),
            },
        );
        (
            Harness {
                ctx,
                candles,
                averages,
                delays,
            },
            stage,
        )
    }

    fn push_trade(ctx: &PipelineContext, symbol: usize, price: f64, volume: f64) {
        let item = WorkItem::trade(
            TradeEvent {
                symbol: SymbolId(symbol),
                price,
                volume,
                exchange_ts_ms: 0,
            },
            Utc::now(),
        );
        assert_eq!(ctx.calc_queue.enqueue(item), Admission::Accepted);
    }

    fn push_flush(ctx: &PipelineContext, minute: u64) {
        assert_eq!(
            ctx.calc_queue.enqueue(WorkItem::minute_flush(minute, Utc::now())),
            Admission::Accepted
        );
    }

    #[test]
    fn three_trades_then_directive() {
        let (h, stage) = harness(&["AAPL"]);
        push_trade(&h.ctx, 0, 100.0, 10.0);
        push_trade(&h.ctx, 0, 105.0, 5.0);
        push_trade(&h.ctx, 0, 98.0, 20.0);
        push_flush(&h.ctx, 28_000_000);
        h.ctx.calc_queue.close();

        let report = stage.run().unwrap();
        assert_eq!(report.trades_applied, 3);
        assert_eq!(report.minutes_flushed, 1);

        assert_eq!(
            h.candles[0].lines(),
            vec!["28000000,100.000000,105.000000,98.000000,98.000000,35.000000"]
        );
        assert_eq!(h.averages[0].lines(), vec!["28000000,102.428571,35.000000"]);
        assert_eq!(h.delays.lines().len(), 1);
    }

    #[test]
    fn silent_and_never_traded_symbols() {
        let (h, stage) = harness(&["AAPL", "NIO"]);
        push_trade(&h.ctx, 0, 98.0, 2.0);
        push_flush(&h.ctx, 10);
        push_flush(&h.ctx, 11);
        h.ctx.calc_queue.close();

        let report = stage.run().unwrap();
        assert_eq!(report.candles_written, 2);

        assert_eq!(
            h.candles[0].lines(),
            vec![
                "10,98.000000,98.000000,98.000000,98.000000,2.000000",
                "11,98.000000,98.000000,98.000000,98.000000,0.000000",
            ]
        );
        // Window still holds minute 10's volume.
        assert_eq!(
            h.averages[0].lines(),
            vec!["10,98.000000,2.000000", "11,98.000000,2.000000"]
        );
        // NIO never traded: no candle, but the average series stays dense.
        assert!(h.candles[1].lines().is_empty());
        assert_eq!(
            h.averages[1].lines(),
            vec!["10,0.000000,0.000000", "11,0.000000,0.000000"]
        );
        assert_eq!(h.delays.lines().len(), 4);
    }

    #[test]
    fn write_failure_releases_writers_blocked_on_the_calculator_queue() {
        use crate::pipeline::writer::WriterStage;
        use crate::storage::test_support::FailingWriter;
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        const CAPACITY: usize = 4;
        let reg = SymbolRegistry::new(["AAPL"]).unwrap();
        let ctx = Arc::new(PipelineContext::new(Arc::new(reg), CAPACITY, 1));

        let (done_tx, done_rx) = mpsc::channel();
        let writer = {
            let stage = WriterStage::new(
                0,
                ctx.clone(),
                Arc::new(CsvBatch::new(vec![SharedBuf::new()])),
                DelayLog::new(SharedBuf::new()),
            );
            thread::spawn(move || {
                let _ = done_tx.send(stage.run());
            })
        };

        // Fill Queue₂, the writer's hands and Queue₁ before any calculator
        // runs: the writer ends up parked on a full calculator queue.
        assert_eq!(
            ctx.ingest_queue.enqueue(WorkItem::minute_flush(1, Utc::now())),
            Admission::Accepted
        );
        for ts in 0..(2 * CAPACITY as u64) {
            let trade = TradeEvent {
                symbol: SymbolId(0),
                price: 1.0,
                volume: 1.0,
                exchange_ts_ms: ts,
            };
            assert_eq!(
                ctx.ingest_queue.enqueue(WorkItem::trade(trade, Utc::now())),
                Admission::Accepted
            );
        }
        assert!(ctx.calc_queue.is_full());

        let stage = CalculatorStage::new(
            ctx.clone(),
            CalculatorSinks {
                candlesticks: CsvBatch::new(vec![FailingWriter]),
                moving_avg: CsvBatch::new(vec![FailingWriter]),
                delays: DelayLog::new(FailingWriter),
            },
        );
        assert!(stage.run().is_err());
        assert_eq!(ctx.shutdown.reason(), Some(ShutdownReason::WorkerFailure));
        assert!(ctx.calc_queue.is_closing());

        let report = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("writer stayed blocked after the calculator failed")
            .unwrap();
        assert!(report.rejected > 0);
        writer.join().unwrap();
    }

    #[test]
    fn trades_after_the_last_directive_stay_unflushed() {
        let (h, stage) = harness(&["AAPL"]);
        push_flush(&h.ctx, 1);
        push_trade(&h.ctx, 0, 10.0, 1.0);
        h.ctx.calc_queue.close();

        let report = stage.run().unwrap();
        assert_eq!(report.trades_applied, 1);
        assert!(h.candles[0].lines().is_empty());
    }
}
