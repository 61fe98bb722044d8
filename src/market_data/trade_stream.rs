// =============================================================================
// Trade Stream — Finnhub WebSocket connection feeding the ingest stage
// =============================================================================

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::market_data::{SymbolRegistry, TradeDecoder};
use crate::pipeline::shutdown::ShutdownSignal;
use crate::types::TradeEvent;

/// Receives each decoded frame's trades as one batch.
pub trait TradeSink {
    /// Returns how many trades were accepted.
    fn publish(&mut self, trades: &[TradeEvent]) -> usize;
}

/// How a connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the stream; reconnect.
    Disconnected,
    /// Shutdown was requested; do not reconnect.
    Shutdown,
}

/// Build the authenticated stream URL.
pub fn stream_url(endpoint: &str, api_key: &str) -> String {
    format!("{}/?token={}", endpoint.trim_end_matches('/'), api_key)
}

/// Subscription message for one symbol.
pub fn subscribe_message(symbol: &str) -> String {
    serde_json::json!({ "type": "subscribe", "symbol": symbol }).to_string()
}

/// Connect, subscribe to every registry symbol, and pump frames into `sink`
/// until the stream ends, fails, or shutdown is signalled.
pub async fn run_trade_stream<S: TradeSink>(
    endpoint: &str,
    api_key: &str,
    registry: &SymbolRegistry,
    decoder: &mut TradeDecoder,
    sink: &mut S,
    shutdown: &ShutdownSignal,
) -> Result<StreamEnd> {
    info!(endpoint = %endpoint, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(stream_url(endpoint, api_key))
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(endpoint = %endpoint, "trade WebSocket connected");
    let (mut write, mut read) = ws_stream.split();

    for (_, symbol) in registry.iter() {
        debug!(symbol = %symbol, "subscribing");
        write
            .send(Message::Text(subscribe_message(symbol)))
            .await
            .with_context(|| format!("failed to subscribe to {symbol}"))?;
    }
    info!(count = registry.len(), "subscriptions sent");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                info!("trade WebSocket closed for shutdown");
                return Ok(StreamEnd::Shutdown);
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let trades = decoder.decode(&text);
                    if !trades.is_empty() {
                        // Enqueue may block briefly on a full queue.
                        tokio::task::block_in_place(|| sink.publish(&trades));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "server closed trade WebSocket");
                    return Ok(StreamEnd::Disconnected);
                }
                // Ping / Pong / Binary -- tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(e).context("trade WebSocket read error");
                }
                None => {
                    warn!("trade WebSocket stream ended");
                    return Ok(StreamEnd::Disconnected);
                }
            }
        }
    }
}
