//! Journal file management.

use super::entry::{JournalEntry, JournalOp};
use crate::error::{ReadModelError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"ORJ\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Magic + version.
const HEADER_SIZE: u64 = 5;

/// Length prefix + checksum around each encoded entry.
const FRAME_OVERHEAD: u64 = 8;

/// Sanity bound for a single entry.
const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;

/// Borrowing twin of [`JournalEntry`]; encodes to the same bytes.
#[derive(Serialize)]
struct EntryRef<'a> {
    seq: u64,
    timestamp: i64,
    op: &'a JournalOp,
}

/// Append-side state, guarded by one mutex.
struct JournalWriter {
    file: BufWriter<File>,
    next_seq: u64,
    size: u64,
    writes_since_sync: u64,
    /// Set when a failed append could not be rolled back; the file tail is
    /// unknown until the journal is reopened.
    poisoned: bool,
}

/// Append-only journal of read model mutations.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// fsync every N appends.
    sync_interval: u64,
}

impl Journal {
    /// Appends between fsyncs when none is configured.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a journal, returning the intact entries to replay.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            Self::recover(&path)?
        } else {
            Self::write_header(&path)?;
            Vec::new()
        };

        let size = fs::metadata(&path)?.len();
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);
        let file = OpenOptions::new().append(true).open(&path)?;

        let journal = Self {
            path,
            writer: Mutex::new(JournalWriter {
                file: BufWriter::new(file),
                next_seq,
                size,
                writes_since_sync: 0,
                poisoned: false,
            }),
            sync_interval: sync_interval.max(1),
        };

        Ok((journal, entries))
    }

    /// Append an operation, returning its sequence number.
    ///
    /// A failed append is cut back off the file, so the journal never holds
    /// an entry the caller was told did not happen.
    pub fn append(&self, op: &JournalOp) -> Result<u64> {
        let mut writer = self.writer.lock();
        if writer.poisoned {
            return Err(ReadModelError::Corruption(
                "Journal tail unknown after a failed append; reopen required".into(),
            ));
        }
        let seq = writer.next_seq;

        let frame = Self::encode_frame(&EntryRef {
            seq,
            timestamp: Utc::now().timestamp_micros(),
            op,
        })?;

        if let Err(e) = self.write_frame(&mut writer, &frame) {
            tracing::error!(path = %self.path.display(), seq, error = %e, "journal append failed");
            if let Err(rollback) = self.roll_back(&mut writer) {
                tracing::error!(error = %rollback, "journal rollback failed");
                writer.poisoned = true;
            }
            return Err(e);
        }

        writer.next_seq += 1;
        writer.size += frame.len() as u64;
        Ok(seq)
    }

    fn write_frame(&self, writer: &mut JournalWriter, frame: &[u8]) -> Result<()> {
        writer.file.write_all(frame)?;
        writer.file.flush()?;
        writer.writes_since_sync += 1;
        if writer.writes_since_sync >= self.sync_interval {
            writer.file.get_ref().sync_data()?;
            writer.writes_since_sync = 0;
        }
        Ok(())
    }

    /// Discard buffered bytes and truncate the file to the last good frame.
    fn roll_back(&self, writer: &mut JournalWriter) -> Result<()> {
        let fresh = OpenOptions::new().append(true).open(&self.path)?;
        let failed = std::mem::replace(&mut writer.file, BufWriter::new(fresh));
        let (failed, _unwritten) = failed.into_parts();
        failed.set_len(writer.size)?;
        failed.sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Force pending appends to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;
        writer.file.get_ref().sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Replace the whole journal with `ops`.
    ///
    /// The new file is written next to the old one and renamed over it, so a
    /// crash leaves either the old or the new journal intact.
    pub fn rewrite(&self, ops: &[JournalOp]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;

        let tmp_path = self.path.with_extension("journal.tmp");
        let timestamp = Utc::now().timestamp_micros();
        let mut size = HEADER_SIZE;
        {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            out.write_all(JOURNAL_MAGIC)?;
            out.write_all(&[JOURNAL_VERSION])?;
            for (i, op) in ops.iter().enumerate() {
                let frame = Self::encode_frame(&EntryRef {
                    seq: i as u64 + 1,
                    timestamp,
                    op,
                })?;
                out.write_all(&frame)?;
                size += frame.len() as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        *writer = JournalWriter {
            file: BufWriter::new(file),
            next_seq: ops.len() as u64 + 1,
            size,
            writes_since_sync: 0,
            poisoned: false,
        };

        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.writer.lock().size
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> u64 {
        self.writer.lock().next_seq - 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(JOURNAL_MAGIC)?;
        file.write_all(&[JOURNAL_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn encode_frame(entry: &EntryRef<'_>) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(entry)?;

        let mut frame = Vec::with_capacity(encoded.len() + FRAME_OVERHEAD as usize);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());

        Ok(frame)
    }

    /// Read every intact entry, cutting off a torn trailing frame.
    fn recover(path: &Path) -> Result<Vec<JournalEntry>> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE {
            return Err(ReadModelError::InvalidFormat("Journal header missing".into()));
        }

        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(ReadModelError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(ReadModelError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < file_len {
            let remaining = file_len - offset;
            if remaining < 4 {
                break;
            }

            let mut len_bytes = [0u8; 4];
            reader.read_exact(&mut len_bytes)?;
            let len = u32::from_le_bytes(len_bytes) as u64;

            if len > MAX_ENTRY_SIZE {
                return Err(ReadModelError::Corruption(format!(
                    "Journal entry at offset {} too large ({} bytes)",
                    offset, len
                )));
            }
            if remaining < len + FRAME_OVERHEAD {
                break;
            }

            let mut encoded = vec![0u8; len as usize];
            reader.read_exact(&mut encoded)?;

            let mut checksum_bytes = [0u8; 4];
            reader.read_exact(&mut checksum_bytes)?;
            let stored_checksum = u32::from_le_bytes(checksum_bytes);
            let computed_checksum = crc32fast::hash(&encoded);
            if stored_checksum != computed_checksum {
                return Err(ReadModelError::ChecksumMismatch {
                    expected: stored_checksum,
                    got: computed_checksum,
                });
            }

            let entry: JournalEntry = rmp_serde::from_slice(&encoded).map_err(|e| {
                ReadModelError::Corruption(format!(
                    "Undecodable journal entry at offset {}: {}",
                    offset, e
                ))
            })?;
            entries.push(entry);
            offset += len + FRAME_OVERHEAD;
        }

        if offset < file_len {
            tracing::warn!(
                path = %path.display(),
                offset,
                discarded = file_len - offset,
                "truncating torn journal tail"
            );
            let file = reader.into_inner();
            file.set_len(offset)?;
            file.sync_all()?;
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Money, OrderId, OrderSummary};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn summary(id: u64, cents: i64) -> JournalOp {
        JournalOp::UpsertSummary(OrderSummary::new(
            OrderId(id),
            Money::from_cents(cents),
            NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
        ))
    }

    #[test]
    fn test_journal_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        {
            let (journal, entries) = Journal::open(&path, 1).unwrap();
            assert!(entries.is_empty());
            assert_eq!(journal.append(&summary(1, 100)).unwrap(), 1);
            assert_eq!(journal.append(&summary(2, 200)).unwrap(), 2);
            assert_eq!(journal.entry_count(), 2);
        }

        let (journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].op, summary(2, 200));

        // Sequence continues after the replayed entries
        assert_eq!(journal.append(&summary(3, 300)).unwrap(), 3);
    }

    #[test]
    fn test_journal_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        let intact_size = {
            let (journal, _) = Journal::open(&path, 1).unwrap();
            journal.append(&summary(1, 100)).unwrap();
            journal.size()
        };

        // Simulate a crash mid-append: a length prefix with no body
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&200u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }

        let (journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_size);
        assert_eq!(journal.append(&summary(2, 200)).unwrap(), 2);
    }

    #[test]
    fn test_rollback_drops_partial_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        let (journal, _) = Journal::open(&path, 1).unwrap();
        journal.append(&summary(1, 100)).unwrap();
        let intact_size = journal.size();

        {
            let mut writer = journal.writer.lock();
            // Part of a frame reached the file, the rest is still buffered
            writer.file.write_all(&300u32.to_le_bytes()).unwrap();
            writer.file.flush().unwrap();
            writer.file.write_all(b"unflushed").unwrap();
            journal.roll_back(&mut writer).unwrap();
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_size);

        assert_eq!(journal.append(&summary(2, 200)).unwrap(), 2);
        drop(journal);

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op, summary(2, 200));
    }

    #[test]
    fn test_poisoned_journal_refuses_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        let (journal, _) = Journal::open(&path, 1).unwrap();
        journal.append(&summary(1, 100)).unwrap();
        journal.writer.lock().poisoned = true;

        assert!(matches!(
            journal.append(&summary(2, 200)),
            Err(ReadModelError::Corruption(_))
        ));
        assert_eq!(journal.entry_count(), 1);
    }

    #[test]
    fn test_journal_detects_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        {
            let (journal, _) = Journal::open(&path, 1).unwrap();
            journal.append(&summary(1, 100)).unwrap();
        }

        // Flip a payload byte of the first entry
        let mut bytes = fs::read(&path).unwrap();
        let target = HEADER_SIZE as usize + 4 + 1;
        bytes[target] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let result = Journal::open(&path, 1);
        assert!(matches!(result, Err(ReadModelError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_journal_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");
        fs::write(&path, b"NOPE\x01").unwrap();

        let result = Journal::open(&path, 1);
        assert!(matches!(result, Err(ReadModelError::InvalidFormat(_))));
    }

    #[test]
    fn test_journal_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.journal");

        {
            let (journal, _) = Journal::open(&path, 1).unwrap();
            for i in 0..10 {
                journal.append(&summary(1, i)).unwrap();
            }
            let before = journal.size();

            journal.rewrite(&[summary(1, 9)]).unwrap();
            assert!(journal.size() < before);
            assert_eq!(journal.entry_count(), 1);

            journal.append(&summary(2, 5)).unwrap();
        }

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].op, summary(1, 9));
        assert_eq!(entries[1].seq, 2);
    }
}
