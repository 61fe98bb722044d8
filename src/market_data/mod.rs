pub mod candlestick;
pub mod decoder;
pub mod moving_average;
pub mod reconnect;
pub mod symbol_buffer;
pub mod symbols;
pub mod trade_stream;

pub use candlestick::CandleBar;
pub use decoder::TradeDecoder;
pub use symbol_buffer::{AverageLine, MinuteSummary, SymbolBuffer};
pub use symbols::SymbolRegistry;
