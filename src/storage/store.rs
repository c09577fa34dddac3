//! File-backed read model.

use super::tables::Tables;
use super::ReadModelStore;
use crate::config::StorageConfig;
use crate::error::{ReadModelError, Result};
use crate::journal::{Journal, JournalOp};
use crate::migration::MigrationState;
use crate::types::{LineItem, OrderId, OrderLineItem, OrderSummary};
use chrono::NaiveDate;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Magic bytes for the read model manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"ORL\0";

/// Current read model format version.
const MANIFEST_VERSION: u8 = 1;

/// Magic bytes for the migration state file.
const MIGRATION_MAGIC: &[u8; 4] = b"ORM\0";

const MIGRATION_VERSION: u8 = 1;

const JOURNAL_FILE: &str = "readmodel.journal";
const MIGRATION_FILE: &str = "migration.bin";

/// Row counts and on-disk size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadModelStats {
    pub summary_count: u64,
    pub item_count: u64,
    pub journal_entries: u64,
    pub journal_size_bytes: u64,
    pub generation: u64,
}

/// The read model store.
///
/// Directory layout:
/// - `MANIFEST`: magic + format version
/// - `LOCK`: exclusive advisory lock held while open
/// - `readmodel.journal`: every table mutation, replayed on open
/// - `migration.bin`: the migration state record
pub struct ReadModel {
    config: StorageConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    journal: Journal,

    tables: RwLock<Tables>,

    /// Serializes journal append + table apply.
    write_lock: Mutex<()>,

    generation: AtomicU64,
}

impl ReadModel {
    /// Open an existing read model or create a new one.
    pub fn open_or_create(config: StorageConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(ReadModelError::NotInitialized)
        }
    }

    /// Create a new read model. Refuses a directory that already holds one.
    pub fn create(config: StorageConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() || config.path.join(JOURNAL_FILE).exists() {
            return Err(ReadModelError::AlreadyExists);
        }
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (journal, _) = Journal::open(config.path.join(JOURNAL_FILE), config.sync_interval)?;

        tracing::debug!(path = %config.path.display(), "created read model");

        Ok(Self {
            config,
            _lock_file: lock_file,
            journal,
            tables: RwLock::new(Tables::default()),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Open an existing read model, replaying its journal.
    pub fn open(config: StorageConfig) -> Result<Self> {
        if !config.path.join("MANIFEST").exists() {
            return Err(ReadModelError::NotInitialized);
        }
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (journal, entries) =
            Journal::open(config.path.join(JOURNAL_FILE), config.sync_interval)?;

        let mut tables = Tables::default();
        for entry in &entries {
            tables.apply(&entry.op);
        }

        tracing::debug!(
            path = %config.path.display(),
            replayed = entries.len(),
            summaries = tables.summary_count(),
            items = tables.item_count(),
            "opened read model"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            journal,
            tables: RwLock::new(tables),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Rewrite the journal as the minimal set of entries for the live rows.
    pub fn compact(&self) -> Result<()> {
        let _lock = self.write_lock.lock();

        let before = self.journal.size();
        let ops = self.tables.read().snapshot_ops();
        self.journal.rewrite(&ops)?;

        tracing::info!(
            entries = ops.len(),
            before_bytes = before,
            after_bytes = self.journal.size(),
            "compacted read model journal"
        );
        Ok(())
    }

    pub fn stats(&self) -> ReadModelStats {
        let tables = self.tables.read();
        ReadModelStats {
            summary_count: tables.summary_count() as u64,
            item_count: tables.item_count() as u64,
            journal_entries: self.journal.entry_count(),
            journal_size_bytes: self.journal.size(),
            generation: self.generation(),
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.journal.sync()
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Journal `op`, then apply it. Caller holds `write_lock`.
    fn commit(&self, op: JournalOp) -> Result<usize> {
        self.journal.append(&op)?;
        let affected = self.tables.write().apply(&op);
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::trace!(op = op.kind(), affected, "applied read model write");
        Ok(affected)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;

        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&[MANIFEST_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MANIFEST_MAGIC {
            return Err(ReadModelError::InvalidFormat("Invalid read model magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != MANIFEST_VERSION {
            return Err(ReadModelError::InvalidFormat(format!(
                "Unsupported read model version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| ReadModelError::Locked)?;

        Ok(lock_file)
    }
}

impl ReadModelStore for ReadModel {
    fn upsert_summary(&self, summary: &OrderSummary) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.commit(JournalOp::UpsertSummary(summary.clone()))?;
        Ok(())
    }

    fn replace_items(
        &self,
        order_id: OrderId,
        report_date: NaiveDate,
        items: &[LineItem],
    ) -> Result<usize> {
        let _lock = self.write_lock.lock();
        let first_row = {
            let tables = self.tables.read();
            if items.is_empty() && !tables.has_items(order_id) {
                return Ok(0);
            }
            tables.next_row()
        };
        self.commit(JournalOp::ReplaceItems {
            order_id,
            report_date,
            first_row,
            items: items.to_vec(),
        })
    }

    fn delete_summary(&self, order_id: OrderId) -> Result<bool> {
        let _lock = self.write_lock.lock();
        if !self.tables.read().contains_summary(order_id) {
            return Ok(false);
        }
        Ok(self.commit(JournalOp::DeleteSummary(order_id))? > 0)
    }

    fn delete_items(&self, order_id: OrderId) -> Result<usize> {
        let _lock = self.write_lock.lock();
        if self.tables.read().item_count_for(order_id) == 0 {
            return Ok(0);
        }
        self.commit(JournalOp::DeleteItems(order_id))
    }

    fn insert_summaries_ignore(&self, rows: &[OrderSummary]) -> Result<usize> {
        let _lock = self.write_lock.lock();

        let fresh: Vec<OrderSummary> = {
            let tables = self.tables.read();
            let mut seen = HashSet::new();
            rows.iter()
                .filter(|row| !tables.contains_summary(row.order_id) && seen.insert(row.order_id))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            return Ok(0);
        }

        self.commit(JournalOp::InsertSummaries(fresh))
    }

    fn summary(&self, order_id: OrderId) -> Option<OrderSummary> {
        self.tables.read().summary(order_id)
    }

    fn items_for_order(&self, order_id: OrderId) -> Vec<OrderLineItem> {
        self.tables.read().items_for_order(order_id)
    }

    fn summaries_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderSummary> {
        self.tables.read().summaries_between(start, end)
    }

    fn items_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderLineItem> {
        self.tables.read().items_between(start, end)
    }

    fn order_ids(&self) -> Vec<OrderId> {
        self.tables.read().order_ids()
    }

    fn has_items(&self, order_id: OrderId) -> bool {
        self.tables.read().has_items(order_id)
    }

    fn purge_orders_from(&self, min_id: OrderId) -> Result<usize> {
        let _lock = self.write_lock.lock();
        if !self.tables.read().any_order_from(min_id) {
            return Ok(0);
        }
        self.commit(JournalOp::PurgeFrom(min_id))
    }

    fn load_migration_state(&self) -> Result<Option<MigrationState>> {
        let path = self.config.path.join(MIGRATION_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MIGRATION_MAGIC {
            return Err(ReadModelError::InvalidFormat("Invalid migration state magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != MIGRATION_VERSION {
            return Err(ReadModelError::InvalidFormat(format!(
                "Unsupported migration state version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut encoded = vec![0u8; len];
        file.read_exact(&mut encoded)?;

        Ok(Some(rmp_serde::from_slice(&encoded)?))
    }

    fn save_migration_state(&self, state: &MigrationState) -> Result<()> {
        let path = self.config.path.join(MIGRATION_FILE);
        let tmp_path = path.with_extension("bin.tmp");

        let encoded = rmp_serde::to_vec(state)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MIGRATION_MAGIC)?;
            file.write_all(&[MIGRATION_VERSION])?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Drop for ReadModel {
    fn drop(&mut self) {
        // Best-effort sync on drop
        if let Err(e) = self.sync() {
            tracing::warn!(error = %e, "failed to sync read model on drop");
        }
    }
}
