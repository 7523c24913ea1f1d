//! Prediction output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// One scored (user, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub user_idx: i64,
    pub item_idx: i64,
    pub score: f32,
    pub label: f32,
}

/// Writes prediction records as JSON lines.
#[derive(Debug)]
pub struct PredictionWriter<W: Write> {
    writer: W,
    written: usize,
}

impl PredictionWriter<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> PredictionWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, record: &PredictionRecord) -> DataResult<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(|source| DataError::Json {
            line: self.written + 1,
            source,
        })?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'a, I>(&mut self, records: I) -> DataResult<()>
    where
        I: IntoIterator<Item = &'a PredictionRecord>,
    {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Flushes and returns the inner writer.
    pub fn finish(mut self) -> DataResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
