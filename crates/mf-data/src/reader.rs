//! JSON-lines batch reading.
//!
//! Each non-empty line of the input holds one JSON batch object (see
//! [`RawBatch`](crate::batch::RawBatch)).
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use mf_data::JsonlBatchReader;
//!
//! let line = r#"{"user_idx":[1],"item_idx":[2],"user_feature_hashes":[[0]],"item_feature_hashes":[[1]],"label":[1.0],"weight":[1.0]}"#;
//! let reader = JsonlBatchReader::new(Cursor::new(format!("{line}\n\n{line}\n")));
//! let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(batches.len(), 2);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::batch::{Batch, RawBatch};
use crate::error::{DataError, DataResult};

/// Iterator over the batches of a JSON-lines source.
#[derive(Debug)]
pub struct JsonlBatchReader<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl JsonlBatchReader<BufReader<File>> {
    /// Opens a JSON-lines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened batch file");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlBatchReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Reads every remaining batch, stopping at the first error.
    pub fn read_all(self) -> DataResult<Vec<Batch>> {
        self.collect()
    }

    fn next_batch(&mut self) -> Option<DataResult<Batch>> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line += 1,
                Err(e) => return Some(Err(DataError::Io(e))),
            }
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            let line = self.line;
            let parsed = serde_json::from_str::<RawBatch>(text)
                .map_err(|source| DataError::Json { line, source })
                .and_then(Batch::try_from);
            return Some(parsed);
        }
    }
}

impl<R: BufRead> Iterator for JsonlBatchReader<R> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
