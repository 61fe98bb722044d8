// =============================================================================
// Trade Decoder — Finnhub trade frames -> TradeEvent values
// =============================================================================
//
// Expected frame shape:
//   { "type": "trade",
//     "data": [ { "s": "AAPL", "p": 189.3, "t": 1700000000000, "v": 12 }, ... ] }
//
// Other frame types (`ping`, subscription acks, errors) carry no trades.  A
// trade object with a missing or non-numeric field is dropped whole; the rest
// of the frame is still delivered.
// =============================================================================

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::market_data::SymbolRegistry;
use crate::types::TradeEvent;

/// Decoder state owned by the ingest stage and carried across frames.
#[derive(Debug)]
pub struct TradeDecoder {
    registry: Arc<SymbolRegistry>,
    decoded: u64,
    dropped: u64,
}

impl TradeDecoder {
    pub fn new(registry: Arc<SymbolRegistry>) -> Self {
        Self {
            registry,
            decoded: 0,
            dropped: 0,
        }
    }

    /// Decode one text frame into zero or more trades, in frame order.
    pub fn decode(&mut self, text: &str) -> Vec<TradeEvent> {
        let root: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "discarding unparseable frame");
                return Vec::new();
            }
        };

        match root["type"].as_str() {
            Some("trade") => {}
            Some("error") => {
                warn!(msg = %root["msg"], "provider reported an error");
                return Vec::new();
            }
            _ => return Vec::new(),
        }

        let Some(data) = root["data"].as_array() else {
            warn!("trade frame without a data array");
            return Vec::new();
        };

        let mut trades = Vec::with_capacity(data.len());
        for entry in data {
            match self.convert(entry) {
                Ok(Some(trade)) => {
                    self.decoded += 1;
                    trades.push(trade);
                }
                Ok(None) => self.dropped += 1,
                Err(e) => {
                    self.dropped += 1;
                    warn!(error = %e, "dropping trade that failed conversion");
                }
            }
        }
        trades
    }

    /// `Ok(None)` for well-formed trades on symbols we do not track.
    fn convert(&self, entry: &Value) -> Result<Option<TradeEvent>> {
        let symbol = entry["s"].as_str().context("missing field s")?;
        let Some(id) = self.registry.lookup(symbol) else {
            debug!(symbol = %symbol, "trade for untracked symbol");
            return Ok(None);
        };

        let price = parse_f64(&entry["p"], "p")?;
        let volume = parse_f64(&entry["v"], "v")?;
        let exchange_ts_ms = parse_u64(&entry["t"], "t")?;

        if !price.is_finite() || !volume.is_finite() || volume < 0.0 {
            bail!("out-of-range price {price} / volume {volume}");
        }

        Ok(Some(TradeEvent {
            symbol: id,
            price,
            volume,
            exchange_ts_ms,
        }))
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Numeric fields may arrive as JSON numbers or numeric strings.
fn parse_f64(val: &Value, name: &str) -> Result<f64> {
    match val {
        Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        Value::Null => bail!("missing field {name}"),
        _ => bail!("field {name} has unexpected JSON type"),
    }
}

fn parse_u64(val: &Value, name: &str) -> Result<u64> {
    match val {
        Value::Number(n) => n
            .as_u64()
            .with_context(|| format!("field {name} is not a valid u64")),
        Value::String(s) => s
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name} as u64: {s}")),
        Value::Null => bail!("missing field {name}"),
        _ => bail!("field {name} has unexpected JSON type"),
    }
}

// =============================================================================
// Tests
// =============================================================================
