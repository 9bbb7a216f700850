//! Synchronization coordinator.
//!
//! [`MappingService`] owns the store handle and both registries. `init`
//! detects a fresh install, runs schema migrations and warms the registries;
//! `shutdown` releases the store, rolling back a bulk session left open.

use crate::{ColorRegistry, PartRegistry, Upserted};
use brickmap_core::{
    compute_content_hash, content_hash_hex, BrickmapConfig, BrickmapResult, ColorEquivalence,
    ConfigError, FormatError, PartEquivalence, StorageError, Table, Timestamp,
};
use brickmap_snapshot::{read_snapshot, write_snapshot, SnapshotRecord};
use brickmap_storage::{MappingStore, SqliteStore};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Version assumed when the ledger has no entry.
pub const UNVERSIONED: i32 = -1;

// ============================================================================
// MIGRATIONS
// ============================================================================

/// One idempotent schema upgrade step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Migration {
    /// Installs that predate the ledger may lack the color table.
    EnsureColorTable,
}

/// Upgrade steps, ordered by the version they start from.
const MIGRATIONS: [Migration; 1] = [Migration::EnsureColorTable];

impl Migration {
    fn from_version(&self) -> i32 {
        match self {
            Migration::EnsureColorTable => UNVERSIONED,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Migration::EnsureColorTable => "ensure color table",
        }
    }

    fn apply<S: MappingStore + ?Sized>(&self, store: &S) -> BrickmapResult<()> {
        match self {
            Migration::EnsureColorTable => store.create_table(Table::Colors),
        }
    }
}

fn migrate<S: MappingStore + ?Sized>(store: &S, key: &str, stored: i32) -> BrickmapResult<()> {
    for step in MIGRATIONS
        .iter()
        .filter(|m| m.from_version() >= stored && m.from_version() < CURRENT_SCHEMA_VERSION)
    {
        info!(from = step.from_version(), step = step.description(), "Running migration");
        step.apply(store)?;
    }
    store.set_schema_version(key, CURRENT_SCHEMA_VERSION)?;
    info!(from = stored, to = CURRENT_SCHEMA_VERSION, "Schema upgraded");
    Ok(())
}

// ============================================================================
// IMPORT / EXPORT TYPES
// ============================================================================

/// How an import treats a record that fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Log and skip the record.
    SkipMalformed,
    /// Roll back and return the error.
    #[default]
    AbortOnError,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportReport {
    /// Records written.
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Records of both registries, each ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedRecords {
    pub colors: Vec<ColorEquivalence>,
    pub parts: Vec<PartEquivalence>,
}

impl ModifiedRecords {
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.parts.is_empty()
    }
}

/// Decode records from `input` and hand each to `write`.
///
/// XML syntax errors always abort: the rest of the document is unreadable.
fn apply_records<T, R, F>(input: R, policy: ImportPolicy, mut write: F) -> BrickmapResult<ImportReport>
where
    T: SnapshotRecord,
    R: BufRead,
    F: FnMut(&T) -> BrickmapResult<Upserted>,
{
    let mut report = ImportReport::default();
    for (index, record) in read_snapshot::<R, T>(input).enumerate() {
        match record {
            Ok(record) => match write(&record)? {
                Upserted::Inserted(_) => report.inserted += 1,
                Upserted::Updated(_) => report.updated += 1,
            },
            Err(err @ FormatError::Xml { .. }) => return Err(err.into()),
            Err(err) if policy == ImportPolicy::SkipMalformed => {
                warn!(element = T::ELEMENT, index, error = %err, "Skipped malformed record");
                report.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(report)
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct MappingService<S: MappingStore + ?Sized> {
    store: Arc<S>,
    config: BrickmapConfig,
    colors: ColorRegistry<S>,
    parts: PartRegistry<S>,
}

impl MappingService<SqliteStore> {
    /// Open the SQLite database named by `config.database_path` and
    /// initialize it.
    pub fn open(config: BrickmapConfig) -> BrickmapResult<Self> {
        let path = config
            .database_path
            .clone()
            .ok_or(ConfigError::InvalidValue {
                field: "database_path",
                reason: "required to open a SQLite store".to_string(),
            })?;
        let store = SqliteStore::open(&path)?;
        Self::init(Arc::new(store), config)
    }
}

impl<S: MappingStore + ?Sized> MappingService<S> {
    /// Prepare `store` for use: create or upgrade the schema, build the part
    /// full-text index and load the color cache.
    pub fn init(store: Arc<S>, config: BrickmapConfig) -> BrickmapResult<Self> {
        config.validate()?;
        let key = config.schema_version_key.as_str();

        if !store.table_exists(Table::PartMapping)? {
            store.create_table(Table::PartMapping)?;
            store.create_table(Table::Colors)?;
            store.set_schema_version(key, CURRENT_SCHEMA_VERSION)?;
            info!(version = CURRENT_SCHEMA_VERSION, "Fresh install");
        } else {
            let stored = store.schema_version(key)?.unwrap_or(UNVERSIONED);
            if stored > CURRENT_SCHEMA_VERSION {
                return Err(StorageError::SchemaTooNew {
                    found: stored,
                    supported: CURRENT_SCHEMA_VERSION,
                }
                .into());
            }
            if stored < CURRENT_SCHEMA_VERSION {
                migrate(store.as_ref(), key, stored)?;
            }
        }

        let colors = ColorRegistry::new(Arc::clone(&store));
        let parts =
            PartRegistry::new(Arc::clone(&store)).with_recent_window(config.recent_window()?);
        parts.init()?;
        colors.refresh()?;
        info!(
            colors = colors.count()?,
            parts = parts.count()?,
            "Mapping service ready"
        );

        Ok(Self {
            store,
            config,
            colors,
            parts,
        })
    }

    /// Release the store. A bulk session still open is rolled back.
    pub fn shutdown(self) -> BrickmapResult<()> {
        if self.parts.in_bulk_session() {
            warn!("Bulk session open at shutdown, rolling back");
            self.parts.abort_bulk_session()?;
        }
        info!("Mapping service shut down");
        Ok(())
    }

    pub fn colors(&self) -> &ColorRegistry<S> {
        &self.colors
    }

    pub fn parts(&self) -> &PartRegistry<S> {
        &self.parts
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &BrickmapConfig {
        &self.config
    }

    /// Version recorded in the schema ledger.
    pub fn schema_version(&self) -> BrickmapResult<i32> {
        Ok(self
            .store
            .schema_version(&self.config.schema_version_key)?
            .unwrap_or(UNVERSIONED))
    }

    // === Incremental export ===

    /// Distinct color modification days, limited by `color_bucket_limit`.
    pub fn color_modified_buckets(&self) -> BrickmapResult<Vec<Timestamp>> {
        self.colors.modified_buckets(self.config.color_bucket_limit)
    }

    /// Distinct part modification days, limited by `part_bucket_limit`.
    pub fn part_modified_buckets(&self) -> BrickmapResult<Vec<Timestamp>> {
        self.parts.modified_buckets(self.config.part_bucket_limit)
    }

    /// Records of both registries modified at or after `since`.
    pub fn export_modified_since(&self, since: Timestamp) -> BrickmapResult<ModifiedRecords> {
        Ok(ModifiedRecords {
            colors: self.colors.export_since(since)?,
            parts: self.parts.export_since(since)?,
        })
    }

    pub fn export_all(&self) -> BrickmapResult<ModifiedRecords> {
        Ok(ModifiedRecords {
            colors: self.colors.export_all()?,
            parts: self.parts.export_all()?,
        })
    }

    // === Snapshots ===

    /// Write colors (all, or those modified since `since`) as a snapshot.
    /// Returns the record count.
    pub fn write_color_snapshot<W: Write>(
        &self,
        out: W,
        since: Option<Timestamp>,
    ) -> BrickmapResult<usize> {
        let colors = match since {
            Some(since) => self.colors.export_since(since)?,
            None => self.colors.export_all()?,
        };
        Ok(write_snapshot(out, &colors)?)
    }

    pub fn write_part_snapshot<W: Write>(
        &self,
        out: W,
        since: Option<Timestamp>,
    ) -> BrickmapResult<usize> {
        let parts = match since {
            Some(since) => self.parts.export_since(since)?,
            None => self.parts.export_all()?,
        };
        Ok(write_snapshot(out, &parts)?)
    }

    /// Import a color snapshot in one transaction. Validation conflicts and
    /// (under [`ImportPolicy::AbortOnError`]) malformed records roll the whole
    /// import back. The cache is refreshed either way.
    pub fn import_colors<R: BufRead>(
        &self,
        input: R,
        policy: ImportPolicy,
    ) -> BrickmapResult<ImportReport> {
        if self.parts.in_bulk_session() {
            return Err(StorageError::TransactionFailed {
                reason: "color import during an open bulk session".to_string(),
            }
            .into());
        }
        self.store.set_autocommit(false)?;
        let outcome = match apply_records::<ColorEquivalence, _, _>(input, policy, |color| {
            self.colors.write(color)
        }) {
            Ok(report) => self.store.set_autocommit(true).map(|()| report),
            Err(err) => {
                if let Err(rollback_err) = self
                    .store
                    .rollback()
                    .and_then(|()| self.store.set_autocommit(true))
                {
                    warn!(error = %rollback_err, "Failed to roll back color import");
                }
                Err(err)
            }
        };
        if let Err(refresh_err) = self.colors.refresh() {
            if outcome.is_ok() {
                return Err(refresh_err);
            }
            warn!(error = %refresh_err, "Failed to refresh color cache after failed import");
        }
        let report = outcome?;
        info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "Imported colors"
        );
        Ok(report)
    }

    /// Import a part snapshot inside a bulk session.
    pub fn import_parts<R: BufRead>(
        &self,
        input: R,
        policy: ImportPolicy,
    ) -> BrickmapResult<ImportReport> {
        let report = self
            .parts
            .with_bulk_session(|parts| {
                apply_records::<PartEquivalence, _, _>(input, policy, |part| parts.write(part))
            })?;
        info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "Imported part mappings"
        );
        Ok(report)
    }

    /// Hex SHA-256 over the canonical JSON of every stored record.
    pub fn state_digest(&self) -> BrickmapResult<String> {
        let state = (self.colors.export_all()?, self.parts.export_all()?);
        let bytes = serde_json::to_vec(&state).map_err(|e| StorageError::Backend {
            reason: format!("failed to encode state: {e}"),
        })?;
        Ok(content_hash_hex(&compute_content_hash(&bytes)))
    }
}
