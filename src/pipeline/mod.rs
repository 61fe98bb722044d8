pub mod calculator;
pub mod context;
pub mod ingest;
pub mod queue;
pub mod shutdown;
pub mod timer;
pub mod writer;

pub use calculator::{CalculatorReport, CalculatorSinks, CalculatorStage};
pub use context::PipelineContext;
pub use ingest::{run_ingest, IngestStage};
pub use shutdown::ShutdownReason;
pub use timer::DirectiveTimer;
pub use writer::{WriterReport, WriterStage};

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use chrono::{TimeZone, Utc};

    use super::timer::TimerTick;
    use super::*;
    use crate::market_data::trade_stream::TradeSink;
    use crate::market_data::SymbolRegistry;
    use crate::storage::test_support::SharedBuf;
    use crate::storage::{CsvBatch, DelayLog};
    use crate::types::{SymbolId, TradeEvent};

    fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn trades_and_a_directive_flow_through_every_stage() {
        const WRITERS: usize = 2;
        let reg = Arc::new(SymbolRegistry::new(["AAPL", "NIO"]).unwrap());
        let ctx = Arc::new(PipelineContext::new(reg, 64, WRITERS));

        let trade_logs = vec![SharedBuf::new(), SharedBuf::new()];
        let writer_delays: Vec<_> = (0..WRITERS).map(|_| SharedBuf::new()).collect();
        let shared_logs = Arc::new(CsvBatch::new(trade_logs.clone()));
        let writers: Vec<_> = writer_delays
            .iter()
            .enumerate()
            .map(|(id, delays)| {
                let stage = WriterStage::new(
                    id,
                    ctx.clone(),
                    shared_logs.clone(),
                    DelayLog::new(delays.clone()),
                );
                thread::spawn(move || stage.run().unwrap())
            })
            .collect();

        let mut ingest = IngestStage::new(ctx.clone());
        let trades = [(100.0, 10.0, 1), (105.0, 5.0, 2), (98.0, 20.0, 3)].map(
            |(price, volume, exchange_ts_ms)| TradeEvent {
                symbol: SymbolId(0),
                price,
                volume,
                exchange_ts_ms,
            },
        );
        assert_eq!(ingest.publish(&trades), 3);

        // Two writers may reorder items, so the directive goes in only once
        // every trade has reached Queue₂.
        wait_until("trades in the calculator queue", || ctx.calc_queue.len() == 3);
        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 12, 31, 0).unwrap();
        let minute = (boundary.timestamp() / 60 - 1) as u64;
        let mut timer = DirectiveTimer::new(ctx.clone(), 0);
        assert_eq!(timer.fire(boundary), TimerTick::Continue);
        wait_until("the directive in the calculator queue", || {
            ctx.calc_queue.len() == 4
        });

        ctx.begin_shutdown(ShutdownReason::Interrupt);

        let candles = vec![SharedBuf::new(), SharedBuf::new()];
        let averages = vec![SharedBuf::new(), SharedBuf::new()];
        let calc_delays = SharedBuf::new();
        let calculator = {
            let stage = CalculatorStage::new(
                ctx.clone(),
                CalculatorSinks {
                    candlesticks: CsvBatch::new(candles.clone()),
                    moving_avg: CsvBatch::new(averages.clone()),
                    delays: DelayLog::new(calc_delays.clone()),
                },
            );
            thread::spawn(move || stage.run().unwrap())
        };

        let reports: Vec<_> = writers.into_iter().map(|w| w.join().unwrap()).collect();
        let calc_report = calculator.join().unwrap();

        assert_eq!(reports.iter().map(|r| r.trades_logged).sum::<u64>(), 3);
        assert_eq!(reports.iter().map(|r| r.directives_forwarded).sum::<u64>(), 1);
        assert_eq!(reports.iter().map(|r| r.rejected).sum::<u64>(), 0);
        assert_eq!(calc_report.trades_applied, 3);
        assert_eq!(calc_report.minutes_flushed, 1);

        let mut logged = trade_logs[0].lines();
        logged.sort();
        assert_eq!(
            logged,
            vec![
                "1,100.000000,10.000000",
                "2,105.000000,5.000000",
                "3,98.000000,20.000000",
            ]
        );
        assert!(trade_logs[1].lines().is_empty());
        let writer_delay_lines: usize = writer_delays.iter().map(|d| d.lines().len()).sum();
        assert_eq!(writer_delay_lines, 3);

        assert_eq!(
            candles[0].lines(),
            vec![format!("{minute},100.000000,105.000000,98.000000,98.000000,35.000000")]
        );
        assert_eq!(averages[0].lines(), vec![format!("{minute},102.428571,35.000000")]);
        assert!(candles[1].lines().is_empty());
        assert_eq!(averages[1].lines(), vec![format!("{minute},0.000000,0.000000")]);
        assert_eq!(calc_delays.lines().len(), 2);
        assert!(ctx.calc_queue.is_closing());
    }
}
