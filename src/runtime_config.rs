// =============================================================================
// Runtime Configuration — pipeline settings loaded from JSON + environment
// =============================================================================
//
// Every tunable of the pipeline lives here: the symbol list, worker and queue
// sizing, the run-time limit, the output root and the provider connection.
// All fields carry `#[serde(default)]` so a partial (or empty) file loads.
// The API key is never read from or written to the JSON file; it comes from
// the environment or the command line.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::reconnect::{BackoffStrategy, ReconnectPolicy};
use crate::pipeline::queue::DEFAULT_CAPACITY;

pub const DEFAULT_CONFIG_PATH: &str = "pipeline_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    [
        "AAPL",
        "NIO",
        "INTC",
        "AMZN",
        "NVDA",
        "TSLA",
        "GOOGL",
        "AMD",
        "MSFT",
        "META",
        "BRK.B",
        "BINANCE:BTCUSDT",
        "BINANCE:ETHUSDT",
        "BINANCE:BNBUSDT",
        "BINANCE:SOLUSDT",
        "BINANCE:DOGEUSDT",
        "OANDA:EUR_USD",
        "OANDA:USD_JPY",
        "OANDA:GBP_USD",
        "OANDA:AUD_USD",
        "OANDA:USD_CAD",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_writer_count() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_hour_limit() -> u64 {
    48
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_endpoint() -> String {
    "wss://ws.finnhub.io".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

// =============================================================================
// ReconnectConfig
// =============================================================================

/// Delay between connection attempts to the trade provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Fixed delay, or the first delay of the exponential schedule.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap for the exponential schedule.  Ignored by `fixed`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> Box<dyn ReconnectPolicy> {
        self.strategy.build(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
        )
    }
}

// =============================================================================
// PipelineConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Provider symbols to subscribe to; one set of log files per symbol.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Number of writer threads draining the ingest queue.
    #[serde(default = "default_writer_count")]
    pub writer_count: usize,

    /// Capacity of each of the two stage queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Stop after this many hours of minute directives.  0 runs until
    /// interrupted.
    #[serde(default = "default_hour_limit")]
    pub hour_limit: u64,

    /// Root under which the log directories are created.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// WebSocket endpoint; the token query is appended at connect time.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(skip)]
    pub api_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            writer_count: default_writer_count(),
            queue_capacity: default_queue_capacity(),
            hour_limit: default_hour_limit(),
            output_dir: default_output_dir(),
            endpoint: default_endpoint(),
            reconnect: ReconnectConfig::default(),
            api_key: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pipeline config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = config.symbols.len(),
            writers = config.writer_count,
            "pipeline config loaded"
        );

        Ok(config)
    }

    /// Apply `PIPELINE_SYMBOLS`, `PIPELINE_OUTPUT_DIR` and `FINNHUB_API_KEY`
    /// when they are set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(syms) = lookup("PIPELINE_SYMBOLS") {
            self.symbols = syms
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(dir) = lookup("PIPELINE_OUTPUT_DIR").filter(|d| !d.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("FINNHUB_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = key.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("pipeline config has no symbols");
        }
        if self.writer_count == 0 {
            bail!("writer_count must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.endpoint.trim().is_empty() {
            bail!("endpoint must not be empty");
        }
        Ok(())
    }
}
