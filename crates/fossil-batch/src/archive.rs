//! Completed batch archives
//!
//! Layout of `batch-<N>.archive`, all integers big-endian:
//!
//! ```text
//! batch number   u64
//! leaf count     u64
//! root           32 bytes
//! leaves         32 bytes each
//! receipt length u32
//! receipt        bytes
//! ```

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use fossil_merkle::{StaticTree, TreeError};
use fossil_types::Id32;

use crate::{
    anchor::AnchorReceipt,
    error::{ArchiveError, PersistenceError},
    evidence::Evidence,
};

const HEADER_LEN: usize = 8 + 8 + 32;

/// File name of the archive of batch `batch_number`.
pub fn archive_file_name(batch_number: u64) -> String {
    format!("batch-{batch_number}.archive")
}

/// A completed batch as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArchive {
    /// Batch number.
    pub batch_number: u64,
    /// Merkle root of `leaves`.
    pub root: Id32,
    /// Leaves in tree order.
    pub leaves: Vec<Id32>,
    /// Anchor receipt for `root`.
    pub receipt: AnchorReceipt,
}

impl BatchArchive {
    /// Encode to the on-disk layout.
    pub fn encode(&self) -> Vec<u8> {
        let len = HEADER_LEN + self.leaves.len() * Id32::LEN + 4 + self.receipt.len();
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&self.batch_number.to_be_bytes());
        out.extend_from_slice(&(self.leaves.len() as u64).to_be_bytes());
        out.extend_from_slice(self.root.as_bytes());
        for leaf in &self.leaves {
            out.extend_from_slice(leaf.as_bytes());
        }
        out.extend_from_slice(&(self.receipt.len() as u32).to_be_bytes());
        out.extend_from_slice(self.receipt.as_bytes());
        out
    }

    /// Decode the on-disk layout and check the root against the leaves.
    pub fn decode(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut reader = Reader { buf: bytes, offset: 0 };

        let batch_number = u64::from_be_bytes(reader.array()?);
        let count = u64::from_be_bytes(reader.array()?);
        let root = Id32::new(reader.array()?);

        if count == 0 {
            return Err(ArchiveError::Empty);
        }
        let count = usize::try_from(count).map_err(|_| reader.truncated(usize::MAX))?;
        let leaves_len = count.checked_mul(32).ok_or_else(|| reader.truncated(usize::MAX))?;
        let leaves = reader
            .take(leaves_len)?
            .chunks_exact(32)
            .map(|chunk| Id32::from_slice(chunk).unwrap_or_default())
            .collect::<Vec<_>>();

        let receipt_len = u32::from_be_bytes(reader.array()?) as usize;
        let receipt = AnchorReceipt::new(reader.take(receipt_len)?.to_vec());

        if reader.remaining() > 0 {
            return Err(ArchiveError::TrailingBytes(reader.remaining()));
        }

        let computed = StaticTree::new(&leaves).map_err(|_| ArchiveError::Empty)?.root();
        if computed != root {
            return Err(ArchiveError::RootMismatch { stored: root, computed });
        }

        Ok(Self { batch_number, root, leaves, receipt })
    }

    /// Write `batch-<N>.archive` into `dir` through a temporary file and a
    /// rename, so readers never see a partial archive.
    pub fn write(&self, dir: &Path, fsync: bool) -> Result<PathBuf, PersistenceError> {
        let path = dir.join(archive_file_name(self.batch_number));
        let tmp = path.with_extension("archive.tmp");

        let mut file = fs::File::create(&tmp).map_err(PersistenceError::io(&tmp))?;
        file.write_all(&self.encode()).map_err(PersistenceError::io(&tmp))?;
        if fsync {
            file.sync_all().map_err(PersistenceError::io(&tmp))?;
        }
        drop(file);

        fs::rename(&tmp, &path).map_err(PersistenceError::io(&path))?;
        Ok(path)
    }

    /// Read and decode an archive file.
    pub fn read(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = fs::read(path).map_err(PersistenceError::io(path))?;
        Self::decode(&bytes)
            .map_err(|source| PersistenceError::Corrupt { path: path.to_path_buf(), source })
    }

    /// Rebuild the tree and regenerate the evidence of every leaf.
    pub fn evidences(&self) -> Result<Vec<Evidence>, TreeError> {
        let tree = StaticTree::new(&self.leaves)?;
        (0..self.leaves.len())
            .map(|index| {
                Ok(Evidence {
                    leaf_hash: self.leaves[index],
                    batch_number: self.batch_number,
                    root: tree.root(),
                    path: tree.path(index)?,
                    receipt: self.receipt.clone(),
                })
            })
            .collect()
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn truncated(&self, needed: usize) -> ArchiveError {
        ArchiveError::Truncated { offset: self.offset, needed }
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let out = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ArchiveError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fossil_merkle::Sha256Hasher;
    use tempfile::TempDir;

    fn sample(n: u8) -> BatchArchive {
        let leaves: Vec<Id32> = (0..n).map(|i| Sha256Hasher::hash(&[i])).collect();
        BatchArchive {
            batch_number: 7,
            root: StaticTree::new(&leaves).unwrap().root(),
            leaves,
            receipt: AnchorReceipt::new(b"txid".to_vec()),
        }
    }

    #[test]
    fn test_encode_layout() {
        let archive = sample(2);
        let bytes = archive.encode();
        assert_eq!(bytes.len(), 8 + 8 + 32 + 64 + 4 + 4);
        assert_eq!(&bytes[..8], &7u64.to_be_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_be_bytes());
        assert_eq!(&bytes[16..48], archive.root.as_bytes());
        assert_eq!(&bytes[112..116], &4u32.to_be_bytes());
        assert_eq!(&bytes[116..], b"txid");
        assert_eq!(BatchArchive::decode(&bytes).unwrap(), archive);
    }

    #[test]
    fn test_decode_errors() {
        let bytes = sample(3).encode();
        assert!(matches!(
            BatchArchive::decode(&bytes[..bytes.len() - 1]),
            Err(ArchiveError::Truncated { .. })
        ));
        assert!(matches!(
            BatchArchive::decode(&bytes[..10]),
            Err(ArchiveError::Truncated { offset: 8, needed: 8 })
        ));

        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(BatchArchive::decode(&extra), Err(ArchiveError::TrailingBytes(1)));

        let mut tampered = bytes.clone();
        tampered[50] ^= 1;
        assert!(matches!(BatchArchive::decode(&tampered), Err(ArchiveError::RootMismatch { .. })));

        let mut empty = bytes[..48].to_vec();
        empty[8..16].copy_from_slice(&0u64.to_be_bytes());
        empty.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(BatchArchive::decode(&empty), Err(ArchiveError::Empty));

        let mut huge = bytes;
        huge[8..16].copy_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(BatchArchive::decode(&huge), Err(ArchiveError::Truncated { .. })));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let archive = sample(5);
        let path = archive.write(dir.path(), true).unwrap();
        assert_eq!(path.file_name().unwrap(), "batch-7.archive");
        assert!(!dir.path().join("batch-7.archive.tmp").exists());
        assert_eq!(BatchArchive::read(&path).unwrap(), archive);

        fs::write(&path, b"short").unwrap();
        assert!(matches!(BatchArchive::read(&path), Err(PersistenceError::Corrupt { .. })));
        assert!(matches!(
            BatchArchive::read(&dir.path().join("missing.archive")),
            Err(PersistenceError::Io { .. })
        ));
    }

    #[test]
    fn test_evidences_verify() {
        let archive = sample(6);
        let evidences = archive.evidences().unwrap();
        assert_eq!(evidences.len(), 6);
        for (i, ev) in evidences.iter().enumerate() {
            assert_eq!(ev.leaf_hash, archive.leaves[i]);
            assert_eq!(ev.batch_number, 7);
            assert!(ev.verify().is_ok());
        }
    }
}
