// =============================================================================
// SymbolBuffer — candlestick + rolling window for one tracked symbol
// =============================================================================

use serde::Serialize;

use super::candlestick::{CandleBar, Candlestick};
use super::moving_average::MovingAverageWindow;

/// Average reported while the window holds no volume and the symbol has
/// never traded.
pub const NO_PRICE: f64 = 0.0;

/// Rolling-average line emitted at each minute flush.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageLine {
    pub moving_average: f64,
    pub total_volume: f64,
}

/// Everything the calculator logs for one symbol at one minute boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MinuteSummary {
    pub minute_index: u64,
    /// `None` when the symbol has never traded.
    pub candle: Option<CandleBar>,
    pub average: AverageLine,
}

/// Per-symbol aggregation state, owned by the calculator alone.
#[derive(Debug, Clone, Default)]
pub struct SymbolBuffer {
    candlestick: Candlestick,
    window: MovingAverageWindow,
}

impl SymbolBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_trade(&mut self, price: f64, volume: f64) {
        self.candlestick.apply_trade(price, volume);
    }

    /// Close the current minute: roll the window, summarise, then reset the
    /// candlestick for the next minute.
    pub fn roll_minute(&mut self, minute_index: u64) -> MinuteSummary {
        self.window.roll(
            self.candlestick.volume(),
            self.candlestick.weighted_price_sum(),
        );

        let fallback = self.candlestick.last_close().unwrap_or(NO_PRICE);
        let average = AverageLine {
            moving_average: self.window.average_or(fallback),
            total_volume: self.window.total_volume(),
        };
        let candle = self.candlestick.bar();

        self.candlestick.reset();

        MinuteSummary {
            minute_index,
            candle,
            average,
        }
    }

    pub fn candlestick(&self) -> &Candlestick {
        &self.candlestick
    }

    pub fn window(&self) -> &MovingAverageWindow {
        &self.window
    }
}
