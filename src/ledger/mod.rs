// src/ledger/mod.rs

//! Completion ledger.
//!
//! The ledger is a JSONL file with one [`UnitResult`] per completed unit. It is
//! read once at start-up to find out which units are already done, and then
//! appended to by the scheduler as results arrive.
//!
//! - [`load`] reads the file into a [`LedgerSnapshot`].
//! - [`writer`] owns the append handle for the duration of a run.
//!
//! A final line without a trailing newline is the signature of a write cut
//! short by a crash. If it does not parse it is ignored (its unit is not
//! completed) and [`LedgerWriter::open`] cuts it off before the run starts.
//! Any other unparseable line is a [`BatchError::CorruptLedgerEntry`].

pub mod writer;

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{BatchError, Result};
use crate::unit::{UnitId, UnitResult};

pub use writer::LedgerWriter;

/// File name of the ledger inside the output directory.
pub const LEDGER_FILE_NAME: &str = "output.jsonl";

/// Identifiers already present in the ledger at start-up.
pub type CompletedSet = HashSet<UnitId>;

/// State of the ledger's last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTail {
    /// Empty file, or the last record ends with a newline.
    Clean,
    /// The last record parsed but has no trailing newline.
    MissingNewline,
    /// The last line is an unterminated fragment that does not parse.
    Truncated { line: usize },
}

/// Result of reading a ledger file.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub path: PathBuf,
    pub completed: CompletedSet,
    /// Number of well-formed records read.
    pub records: usize,
    /// Byte length of the well-formed prefix of the file.
    pub valid_len: u64,
    pub tail: LedgerTail,
}

impl LedgerSnapshot {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            completed: CompletedSet::new(),
            records: 0,
            valid_len: 0,
            tail: LedgerTail::Clean,
        }
    }

    pub fn is_completed(&self, id: UnitId) -> bool {
        self.completed.contains(&id)
    }
}

/// Read the ledger at `path`.
///
/// A missing file is an empty ledger.
pub fn load(path: impl AsRef<Path>) -> Result<LedgerSnapshot> {
    let path = path.as_ref();

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = ?path, "no ledger file yet; starting empty");
            return Ok(LedgerSnapshot::empty(path));
        }
        Err(e) => return Err(e.into()),
    };

    let mut snapshot = LedgerSnapshot::empty(path);
    let mut offset = 0usize;
    let mut line_no = 0usize;

    while offset < bytes.len() {
        line_no += 1;

        let (end, terminated) = match bytes[offset..].iter().position(|&b| b == b'\n') {
            Some(pos) => (offset + pos, true),
            None => (bytes.len(), false),
        };
        let line = &bytes[offset..end];
        let next = if terminated { end + 1 } else { end };

        if line.iter().all(u8::is_ascii_whitespace) {
            if terminated {
                snapshot.valid_len = next as u64;
            } else {
                snapshot.tail = LedgerTail::Truncated { line: line_no };
            }
            offset = next;
            continue;
        }

        match serde_json::from_slice::<UnitResult>(line) {
            Ok(result) => {
                snapshot.completed.insert(result.id());
                snapshot.records += 1;
                snapshot.valid_len = next as u64;
                if !terminated {
                    snapshot.tail = LedgerTail::MissingNewline;
                }
            }
            Err(e) if !terminated => {
                warn!(
                    path = ?path,
                    line = line_no,
                    error = %e,
                    "ignoring truncated final ledger line; its issue will run again"
                );
                snapshot.tail = LedgerTail::Truncated { line: line_no };
            }
            Err(source) => {
                return Err(BatchError::CorruptLedgerEntry {
                    path: path.to_path_buf(),
                    line: line_no,
                    source,
                });
            }
        }

        offset = next;
    }

    debug!(
        path = ?path,
        records = snapshot.records,
        completed = snapshot.completed.len(),
        tail = ?snapshot.tail,
        "loaded ledger"
    );

    Ok(snapshot)
}
