// =============================================================================
// Symbol Registry — ordered list of tracked symbols with reverse lookup
// =============================================================================

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::warn;

use crate::types::SymbolId;

/// Tracked symbols in configuration order.  A symbol's position is its
/// [`SymbolId`], which indexes every per-symbol buffer and file batch.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    names: Vec<String>,
    index: HashMap<String, SymbolId>,
}

impl SymbolRegistry {
    /// Build a registry from `symbols`, dropping duplicates (first one wins).
    pub fn new<I, S>(symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = Vec::new();
        let mut index = HashMap::new();

        for symbol in symbols {
            let symbol: String = symbol.into();
            let symbol = symbol.trim().to_string();
            if symbol.is_empty() {
                bail!("symbol names must not be empty");
            }
            if index.contains_key(&symbol) {
                warn!(symbol = %symbol, "duplicate symbol ignored");
                continue;
            }
            index.insert(symbol.clone(), SymbolId(names.len()));
            names.push(symbol);
        }

        if names.is_empty() {
            bail!("at least one symbol must be tracked");
        }

        Ok(Self { names, index })
    }

    pub fn lookup(&self, symbol: &str) -> Option<SymbolId> {
        self.index.get(symbol).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (SymbolId(i), name.as_str()))
    }
}
