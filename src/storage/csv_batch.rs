// =============================================================================
// CsvBatch — one append log per symbol, each behind its own lock
// =============================================================================

use std::io::Write;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::types::SymbolId;

/// Per-symbol writers indexed by [`SymbolId`].  The lock around each writer
/// covers the write only, so workers touching different symbols never wait
/// on each other.
pub struct CsvBatch<W> {
    writers: Vec<Mutex<W>>,
}

impl<W: Write> CsvBatch<W> {
    pub fn new(writers: Vec<W>) -> Self {
        Self {
            writers: writers.into_iter().map(Mutex::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Append `line` plus a newline to the symbol's log.
    pub fn append(&self, id: SymbolId, line: &str) -> Result<()> {
        self.with_writer(id, |w| writeln!(w, "{line}").map_err(Into::into))
    }

    /// Run `f` while holding the symbol's lock.
    pub fn with_writer<R>(&self, id: SymbolId, f: impl FnOnce(&mut W) -> Result<R>) -> Result<R> {
        let slot = self
            .writers
            .get(id.index())
            .with_context(|| format!("no log open for symbol {id}"))?;
        let mut w = slot.lock();
        f(&mut *w).with_context(|| format!("write failed for symbol {id}"))
    }

    pub fn flush_all(&self) -> Result<()> {
        for (i, slot) in self.writers.iter().enumerate() {
            slot.lock()
                .flush()
                .with_context(|| format!("flush failed for symbol #{i}"))?;
        }
        Ok(())
    }
}

impl<W> std::fmt::Debug for CsvBatch<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvBatch")
            .field("files", &self.writers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::SharedBuf;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lines_land_in_the_right_symbol() {
        let bufs = vec![SharedBuf::new(), SharedBuf::new()];
        let batch = CsvBatch::new(bufs.clone());
        batch.append(SymbolId(1), "a").unwrap();
        batch.append(SymbolId(0), "b").unwrap();
        batch.append(SymbolId(1), "c").unwrap();
        assert_eq!(bufs[0].lines(), vec!["b"]);
        assert_eq!(bufs[1].lines(), vec!["a", "c"]);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let batch = CsvBatch::new(vec![SharedBuf::new()]);
        assert!(batch.append(SymbolId(3), "x").is_err());
    }

    #[test]
    fn concurrent_appends_never_interleave_within_a_line() {
        let buf = SharedBuf::new();
        let batch = Arc::new(CsvBatch::new(vec![buf.clone()]));
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let batch = batch.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        batch
                            .with_writer(SymbolId(0), |w| {
                                write!(w, "{t},")?;
                                writeln!(w, "{i}")?;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let lines = buf.lines();
        assert_eq!(lines.len(), 2_000);
        assert!(lines.iter().all(|l| l.split(',').count() == 2));
    }
}
