// =============================================================================
// Output Layout — directory tree for every log category
// =============================================================================

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::market_data::SymbolRegistry;
use crate::storage::{CsvBatch, DelayLog};

pub const TRADE_LOGS_DIR: &str = "trade_logs";
pub const CANDLESTICKS_DIR: &str = "candlesticks";
pub const MOVING_AVG_DIR: &str = "moving_avg";
pub const DELAYS_DIR: &str = "delays";

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trade_logs(&self) -> PathBuf {
        self.root.join(TRADE_LOGS_DIR)
    }

    pub fn candlesticks(&self) -> PathBuf {
        self.root.join(CANDLESTICKS_DIR)
    }

    pub fn moving_avg(&self) -> PathBuf {
        self.root.join(MOVING_AVG_DIR)
    }

    pub fn delays(&self) -> PathBuf {
        self.root.join(DELAYS_DIR)
    }

    /// Create every directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.trade_logs(),
            self.candlesticks(),
            self.moving_avg(),
            self.delays(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        info!(root = %self.root.display(), "output directories ready");
        Ok(())
    }

    pub fn open_trade_logs(&self, registry: &SymbolRegistry) -> Result<CsvBatch<BufWriter<File>>> {
        open_symbol_batch(&self.trade_logs(), registry)
    }

    pub fn open_candlesticks(&self, registry: &SymbolRegistry) -> Result<CsvBatch<BufWriter<File>>> {
        open_symbol_batch(&self.candlesticks(), registry)
    }

    pub fn open_moving_avg(&self, registry: &SymbolRegistry) -> Result<CsvBatch<BufWriter<File>>> {
        open_symbol_batch(&self.moving_avg(), registry)
    }

    pub fn open_writer_delays(&self, writer: usize) -> Result<DelayLog<BufWriter<File>>> {
        let path = self.delays().join(format!("writer_{writer}.csv"));
        Ok(DelayLog::new(open_append(&path)?))
    }

    pub fn open_calculator_delays(&self) -> Result<DelayLog<BufWriter<File>>> {
        let path = self.delays().join("calculator.csv");
        Ok(DelayLog::new(open_append(&path)?))
    }
}

fn open_symbol_batch(dir: &Path, registry: &SymbolRegistry) -> Result<CsvBatch<BufWriter<File>>> {
    let writers = registry
        .iter()
        .map(|(_, symbol)| open_append(&dir.join(format!("{symbol}.csv"))))
        .collect::<Result<Vec<_>>>()?;
    Ok(CsvBatch::new(writers))
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufWriter::new(file))
}
