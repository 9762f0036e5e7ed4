use crate::checkpoint::{Checkpoint, RestoreResult};
use crate::plan::executor::ExecutionRecord;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LEDGER_FILE_NAME: &str = "ledger.jsonl";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode ledger entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Ledger line {line} is corrupt: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One line of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Checkpoint(Checkpoint),
    Execution(ExecutionRecord),
    Restore(RestoreResult),
}

impl From<Checkpoint> for LedgerEntry {
    fn from(checkpoint: Checkpoint) -> Self {
        LedgerEntry::Checkpoint(checkpoint)
    }
}

impl From<ExecutionRecord> for LedgerEntry {
    fn from(record: ExecutionRecord) -> Self {
        LedgerEntry::Execution(record)
    }
}

impl From<RestoreResult> for LedgerEntry {
    fn from(result: RestoreResult) -> Self {
        LedgerEntry::Restore(result)
    }
}

/// Append-only record of checkpoints, plan executions and restores for one repository
///
/// Stored as JSON Lines under the repository's control directory. Entries
/// are only ever appended; order in the file is creation order.
#[derive(Debug, Clone)]
pub struct SessionLedger {
    path: PathBuf,
    fsync: bool,
}

impl SessionLedger {
    /// Open (creating on first use) the ledger in `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, LedgerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(LEDGER_FILE_NAME),
            fsync: true,
        })
    }

    /// Whether every append is flushed to disk before returning
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let line = serde_json::to_string(entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let result = self
            .drop_torn_tail(&mut file)
            .and_then(|_| writeln!(file, "{}", line))
            .and_then(|_| if self.fsync { file.sync_all() } else { Ok(()) });

        let _ = FileExt::unlock(&file);
        result?;
        Ok(())
    }

    /// A crash mid-append can leave a final line without its newline.
    /// Cut it off so the next entry starts on a fresh line.
    fn drop_torn_tail(&self, file: &mut File) -> io::Result<()> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let mut contents = Vec::with_capacity(len as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut contents)?;
        let keep = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);

        tracing::warn!(
            path = %self.path.display(),
            dropped_bytes = contents.len() - keep,
            "discarding torn ledger tail"
        );
        file.set_len(keep as u64)?;
        Ok(())
    }

    /// Every entry in append order
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<String> = BufReader::new(file).lines().collect::<io::Result<_>>()?;
        let last_line = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if Some(index) == last_line && e.is_eof() => {
                    tracing::warn!(line = index + 1, "ignoring incomplete final ledger line");
                }
                Err(source) => {
                    return Err(LedgerError::Corrupt {
                        line: index + 1,
                        source,
                    });
                }
            }
        }

        Ok(entries)
    }

    /// Latest checkpoint by append order, the input to rollback
    pub fn most_recent_checkpoint(&self) -> Result<Option<Checkpoint>, LedgerError> {
        Ok(self.checkpoints()?.into_iter().next())
    }

    /// Checkpoints, most recent first
    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .filter_map(|entry| match entry {
                LedgerEntry::Checkpoint(checkpoint) => Some(checkpoint),
                _ => None,
            })
            .collect())
    }

    pub fn checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, LedgerError> {
        Ok(self.checkpoints()?.into_iter().find(|c| c.id == id))
    }

    /// Execution records, most recent first
    pub fn history(&self) -> Result<Vec<ExecutionRecord>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .filter_map(|entry| match entry {
                LedgerEntry::Execution(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Restores, most recent first
    pub fn restores(&self) -> Result<Vec<RestoreResult>, LedgerError> {
        Ok(self
            .entries()?
            .into_iter()
            .rev()
            .filter_map(|entry| match entry {
                LedgerEntry::Restore(result) => Some(result),
                _ => None,
            })
            .collect())
    }
}
