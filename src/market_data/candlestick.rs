// =============================================================================
// Candlestick — per-symbol OHLCV accumulator for the open minute
// =============================================================================

use serde::Serialize;

/// Open/high/low/close prices of a minute that saw at least one trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A finished one-minute bar ready to be logged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandleBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Accumulator for the current minute.
///
/// `ohlc` is `None` until the first trade of the minute.  `last_close`
/// survives [`reset`](Self::reset) so a silent minute can still be rendered
/// as a flat bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candlestick {
    ohlc: Option<Ohlc>,
    volume: f64,
    weighted_price_sum: f64,
    last_close: Option<f64>,
}

impl Candlestick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one trade into the open minute.
    pub fn apply_trade(&mut self, price: f64, volume: f64) {
        match self.ohlc.as_mut() {
            Some(ohlc) => {
                ohlc.high = ohlc.high.max(price);
                ohlc.low = ohlc.low.min(price);
                ohlc.close = price;
            }
            None => {
                self.ohlc = Some(Ohlc {
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                });
            }
        }
        self.last_close = Some(price);
        self.volume += volume;
        // Quote-style updates carry no volume; weight them as one unit so the
        // price still registers.
        self.weighted_price_sum += if volume == 0.0 { price } else { price * volume };
    }

    pub fn is_empty(&self) -> bool {
        self.ohlc.is_none()
    }

    pub fn ohlc(&self) -> Option<Ohlc> {
        self.ohlc
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn weighted_price_sum(&self) -> f64 {
        self.weighted_price_sum
    }

    /// Close of the most recent trade ever seen, across minutes.
    pub fn last_close(&self) -> Option<f64> {
        self.last_close
    }

    /// Bar to log for the minute: the real one if it traded, a flat bar at
    /// the last known close if not, nothing if the symbol never traded.
    pub fn bar(&self) -> Option<CandleBar> {
        match (self.ohlc, self.last_close) {
            (Some(ohlc), _) => Some(CandleBar {
                open: ohlc.open,
                high: ohlc.high,
                low: ohlc.low,
                close: ohlc.close,
                volume: self.volume,
            }),
            (None, Some(close)) => Some(CandleBar {
                open: close,
                high: close,
                low: close,
                close,
                volume: self.volume,
            }),
            (None, None) => None,
        }
    }

    /// Empty the minute, keeping only the last close.
    pub fn reset(&mut self) {
        self.ohlc = None;
        self.volume = 0.0;
        self.weighted_price_sum = 0.0;
    }
}

// =============================================================================
// Tests
// =============================================================================
