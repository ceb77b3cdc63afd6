// src/ledger/writer.rs

//! Append handle for the completion ledger.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::ledger::{LedgerSnapshot, LedgerTail};
use crate::unit::UnitResult;

/// Single writer of the ledger file, opened once in append mode per run.
///
/// Every [`append`](Self::append) is flushed and synced before it returns, so
/// a crash right after an acknowledged append cannot lose the line.
#[derive(Debug)]
pub struct LedgerWriter {
    path: PathBuf,
    file: File,
    appended: usize,
}

impl LedgerWriter {
    /// Open the ledger the snapshot was read from, repairing its tail first.
    ///
    /// - a truncated fragment is cut back to the well-formed prefix
    /// - a complete record without a trailing newline gets one
    pub async fn open(snapshot: &LedgerSnapshot) -> Result<Self> {
        let path = snapshot.path.as_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        repair_tail(path, snapshot)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        info!(path = ?path, "ledger opened for appending");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines appended through this writer.
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Append one result as a single newline-terminated line.
    pub async fn append(&mut self, result: &UnitResult) -> Result<()> {
        let mut line = result.to_line()?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.appended += 1;

        debug!(unit = result.id(), path = ?self.path, "ledger line appended");
        Ok(())
    }

    /// Flush and close the ledger. No writes are possible afterwards.
    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        info!(path = ?self.path, appended = self.appended, "ledger closed");
        Ok(())
    }
}

fn repair_tail(path: &Path, snapshot: &LedgerSnapshot) -> Result<()> {
    match snapshot.tail {
        LedgerTail::Clean => {}
        LedgerTail::Truncated { line } => {
            warn!(
                path = ?path,
                line,
                valid_len = snapshot.valid_len,
                "cutting truncated ledger line before appending"
            );
            let file = fs::OpenOptions::new().write(true).open(path)?;
            file.set_len(snapshot.valid_len)?;
            file.sync_all()?;
        }
        LedgerTail::MissingNewline => {
            debug!(path = ?path, "terminating last ledger record");
            let mut file = fs::OpenOptions::new().append(true).open(path)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
    }
    Ok(())
}
