//! Pending log
//!
//! Every accepted leaf is appended to `pending.log` as 32 raw bytes before
//! `submit` returns. Sealing a batch renames the log to `batch-<N>.pending`,
//! which is removed once the batch completes. On startup the segments and
//! the log are read back so leaves that never reached an archive are
//! fossilized again.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use fossil_types::Id32;
use tracing::{debug, warn};

use crate::{archive::archive_file_name, error::PersistenceError};

/// Name of the log of the batch being filled.
pub const PENDING_LOG: &str = "pending.log";

/// File name of the sealed segment of batch `batch_number`.
pub fn segment_file_name(batch_number: u64) -> String {
    format!("batch-{batch_number}.pending")
}

/// Single writer of `pending.log`.
#[derive(Debug)]
pub(crate) struct PendingLog {
    dir: PathBuf,
    fsync: bool,
    /// Opened on first append, closed on seal.
    file: Option<File>,
}

impl PendingLog {
    pub(crate) const fn new(dir: PathBuf, fsync: bool) -> Self {
        Self { dir, fsync, file: None }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(PENDING_LOG)
    }

    /// Append one leaf.
    pub(crate) fn append(&mut self, leaf: &Id32) -> Result<(), PersistenceError> {
        let path = self.path();
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(PersistenceError::io(&path))?,
        };
        let file = self.file.insert(file);

        file.write_all(leaf.as_bytes()).map_err(PersistenceError::io(&path))?;
        if self.fsync {
            file.sync_data().map_err(PersistenceError::io(&path))?;
        }
        Ok(())
    }

    /// Close the log and move it to `batch-<N>.pending`.
    ///
    /// Returns the segment path, or `None` when nothing was logged.
    pub(crate) fn seal(&mut self, batch_number: u64) -> Result<Option<PathBuf>, PersistenceError> {
        self.file = None;

        let from = self.path();
        if !from.exists() {
            return Ok(None);
        }
        let to = self.dir.join(segment_file_name(batch_number));
        fs::rename(&from, &to).map_err(PersistenceError::io(&to))?;
        Ok(Some(to))
    }

    /// Release the file handle without touching the log.
    pub(crate) fn close(&mut self) {
        self.file = None;
    }
}

/// Result of scanning the persistence directory on startup.
#[derive(Debug, Default)]
pub(crate) struct Recovered {
    /// Leaves of unfinished segments (ascending batch number), then of
    /// `pending.log`.
    pub(crate) leaves: Vec<Id32>,
    /// First unused batch number.
    pub(crate) next_batch: u64,
    /// Segments read into `leaves`, to delete once they are rewritten.
    pub(crate) segments: Vec<PathBuf>,
}

/// Scan `dir`, creating it if missing.
pub(crate) fn recover(dir: &Path) -> Result<Recovered, PersistenceError> {
    fs::create_dir_all(dir).map_err(PersistenceError::io(dir))?;

    let mut segments = Vec::new();
    let mut next_batch = 0u64;
    for entry in fs::read_dir(dir).map_err(PersistenceError::io(dir))? {
        let entry = entry.map_err(PersistenceError::io(dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if let Some(n) = parse_batch_file(name, ".archive") {
            next_batch = next_batch.max(n + 1);
        } else if let Some(n) = parse_batch_file(name, ".pending") {
            next_batch = next_batch.max(n + 1);
            segments.push((n, entry.path()));
        }
    }
    segments.sort_unstable_by_key(|(n, _)| *n);

    let mut recovered = Recovered { next_batch, ..Recovered::default() };
    for (n, path) in segments {
        // Archived but not yet cleaned up: the batch completed.
        if dir.join(archive_file_name(n)).exists() {
            debug!(target: "fossilizer", batch = n, "dropping segment of archived batch");
            fs::remove_file(&path).map_err(PersistenceError::io(&path))?;
            continue;
        }
        recovered.leaves.extend(read_leaves(&path)?);
        recovered.segments.push(path);
    }

    let log = dir.join(PENDING_LOG);
    if log.exists() {
        recovered.leaves.extend(read_leaves(&log)?);
    }

    Ok(recovered)
}

/// Write `leaves` to `dir/name` through a temporary file and a rename.
pub(crate) fn write_leaves(
    dir: &Path,
    name: &str,
    leaves: &[Id32],
    fsync: bool,
) -> Result<PathBuf, PersistenceError> {
    let path = dir.join(name);
    let tmp = dir.join(format!("{name}.tmp"));

    let mut file = File::create(&tmp).map_err(PersistenceError::io(&tmp))?;
    for leaf in leaves {
        file.write_all(leaf.as_bytes()).map_err(PersistenceError::io(&tmp))?;
    }
    if fsync {
        file.sync_all().map_err(PersistenceError::io(&tmp))?;
    }
    drop(file);

    fs::rename(&tmp, &path).map_err(PersistenceError::io(&path))?;
    Ok(path)
}

fn read_leaves(path: &Path) -> Result<Vec<Id32>, PersistenceError> {
    let bytes = fs::read(path).map_err(PersistenceError::io(path))?;
    let chunks = bytes.chunks_exact(Id32::LEN);
    if !chunks.remainder().is_empty() {
        warn!(
            target: "fossilizer",
            ?path,
            dropped = chunks.remainder().len(),
            "ignoring torn entry at end of pending file"
        );
    }
    Ok(chunks.map(|chunk| Id32::from_slice(chunk).unwrap_or_default()).collect())
}

/// `batch-<N><suffix>` -> `N`.
fn parse_batch_file(name: &str, suffix: &str) -> Option<u64> {
    name.strip_prefix("batch-")?.strip_suffix(suffix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn leaf(i: u8) -> Id32 {
        Id32::new([i; 32])
    }

    #[test]
    fn test_append_and_seal() {
        let dir = TempDir::new().unwrap();
        let mut log = PendingLog::new(dir.path().to_path_buf(), true);

        assert_eq!(log.seal(0).unwrap(), None);

        log.append(&leaf(1)).unwrap();
        log.append(&leaf(2)).unwrap();
        let bytes = fs::read(dir.path().join(PENDING_LOG)).unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[32..], leaf(2).as_bytes());

        let segment = log.seal(3).unwrap().unwrap();
        assert_eq!(segment, dir.path().join("batch-3.pending"));
        assert!(!dir.path().join(PENDING_LOG).exists());

        // The next append starts a fresh log.
        log.append(&leaf(3)).unwrap();
        assert_eq!(fs::read(dir.path().join(PENDING_LOG)).unwrap().len(), 32);
    }

    #[test]
    fn test_recover_orders_segments_then_log() {
        let dir = TempDir::new().unwrap();
        write_leaves(dir.path(), &segment_file_name(10), &[leaf(10)], false).unwrap();
        write_leaves(dir.path(), &segment_file_name(2), &[leaf(2), leaf(3)], false).unwrap();
        write_leaves(dir.path(), PENDING_LOG, &[leaf(20)], false).unwrap();

        let recovered = recover(dir.path()).unwrap();
        assert_eq!(recovered.leaves, vec![leaf(2), leaf(3), leaf(10), leaf(20)]);
        assert_eq!(recovered.next_batch, 11);
        assert_eq!(recovered.segments.len(), 2);
    }

    #[test]
    fn test_recover_skips_archived_segments() {
        let dir = TempDir::new().unwrap();
        write_leaves(dir.path(), &segment_file_name(4), &[leaf(4)], false).unwrap();
        fs::write(dir.path().join(archive_file_name(4)), b"").unwrap();
        fs::write(dir.path().join(archive_file_name(6)), b"").unwrap();

        let recovered = recover(dir.path()).unwrap();
        assert!(recovered.leaves.is_empty());
        assert_eq!(recovered.next_batch, 7);
        assert!(!dir.path().join(segment_file_name(4)).exists());
    }

    #[test]
    fn test_recover_drops_torn_tail() {
        let dir = TempDir::new().unwrap();
        let mut bytes = leaf(9).as_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        fs::write(dir.path().join(PENDING_LOG), bytes).unwrap();

        assert_eq!(recover(dir.path()).unwrap().leaves, vec![leaf(9)]);
    }

    #[test]
    fn test_recover_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        let recovered = recover(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(recovered.next_batch, 0);
    }

    #[test]
    fn test_parse_batch_file() {
        assert_eq!(parse_batch_file("batch-12.pending", ".pending"), Some(12));
        assert_eq!(parse_batch_file("batch-12.archive", ".pending"), None);
        assert_eq!(parse_batch_file("batch-x.pending", ".pending"), None);
        assert_eq!(parse_batch_file("batch-1.archive.tmp", ".archive"), None);
    }
}
