// =============================================================================
// Storage — append-only CSV logs written by the pipeline workers
// =============================================================================
//
// Layout under the configured output directory:
//
//   trade_logs/<SYMBOL>.csv     ts_ms,price,volume
//   candlesticks/<SYMBOL>.csv   minute,open,high,low,close,volume
//   moving_avg/<SYMBOL>.csv     minute,moving_average,total_15m_volume
//   delays/writer_<i>.csv       delay_us
//   delays/calculator.csv       delay_us
//
// Every file is opened in append mode at startup; any failure there is fatal
// before a single worker thread exists.
// =============================================================================

pub mod csv_batch;
pub mod delay_log;
pub mod layout;

pub use csv_batch::CsvBatch;
pub use delay_log::DelayLog;
pub use layout::OutputLayout;

use crate::market_data::{AverageLine, CandleBar};
use crate::types::TradeEvent;

pub fn trade_line(trade: &TradeEvent) -> String {
    format!(
        "{},{:.6},{:.6}",
        trade.exchange_ts_ms, trade.price, trade.volume
    )
}

pub fn candle_line(minute_index: u64, bar: &CandleBar) -> String {
    format!(
        "{},{:.6},{:.6},{:.6},{:.6},{:.6}",
        minute_index, bar.open, bar.high, bar.low, bar.close, bar.volume
    )
}

pub fn average_line(minute_index: u64, avg: &AverageLine) -> String {
    format!(
        "{},{:.6},{:.6}",
        minute_index, avg.moving_average, avg.total_volume
    )
}
