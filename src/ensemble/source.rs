use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::Ensemble;
use crate::error::{AverageError, Result};

pub trait EnsembleSource: Send {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>>;
}

/// Reads one JSON-encoded ensemble per line. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    line_number: usize,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead + Send> EnsembleSource for JsonLinesSource<R> {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| AverageError::Parse(format!("line {}: {}", self.line_number, e)));
        }
    }
}

/// Replays ensembles already held in memory
pub struct MemorySource {
    ensembles: VecDeque<Ensemble>,
}

impl MemorySource {
    pub fn new(ensembles: Vec<Ensemble>) -> Self {
        Self {
            ensembles: ensembles.into(),
        }
    }
}

impl EnsembleSource for MemorySource {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>> {
        Ok(self.ensembles.pop_front())
    }
}

impl EnsembleSource for Box<dyn EnsembleSource> {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>> {
        (**self).next_ensemble()
    }
}

/// Drains each source in turn
pub struct ChainedSource {
    sources: VecDeque<Box<dyn EnsembleSource>>,
}

impl ChainedSource {
    pub fn new(sources: Vec<Box<dyn EnsembleSource>>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

impl EnsembleSource for ChainedSource {
    fn next_ensemble(&mut self) -> Result<Option<Ensemble>> {
        while let Some(source) = self.sources.front_mut() {
            if let Some(ensemble) = source.next_ensemble()? {
                return Ok(Some(ensemble));
            }
            self.sources.pop_front();
        }
        Ok(None)
    }
}
