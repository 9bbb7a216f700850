//! SQLite store.
//!
//! One connection behind a mutex. Timestamps are stored as fixed-width UTC
//! text (`YYYY-MM-DD HH:MM:SS.ffffff`) so lexical order is time order. The
//! full-text index is an external-content FTS5 table kept in sync by
//! triggers.

use crate::{fulltext, store_now, MappingStore};
use brickmap_core::{
    parse_timestamp, BrickmapError, BrickmapResult, Catalog, ColorEquivalence, Direction,
    DirectionSet, FormatError, MapId, PartEquivalence, Rgba, StorageError, Table, Timestamp,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const COLOR_COLUMNS: &str = "mapid, ldd, bl, ldraw, r, g, b, a, inuse, metal, transparent, \
                             glitter, lddname, colgrp, notes, lastmod";

const PART_COLUMNS: &str = "mapid, masterid, designid, decorid, name, blid, ldrawid, \
                            ldd2bl, bl2ldd, ldd2dat, dat2ldd, bl2dat, dat2bl, lastmod";

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_ledger (
    key TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL
)";

const CREATE_COLORS: &str = "CREATE TABLE IF NOT EXISTS colors (
    mapid INTEGER PRIMARY KEY AUTOINCREMENT,
    ldd INTEGER NOT NULL DEFAULT 0,
    bl INTEGER NOT NULL DEFAULT 0,
    ldraw INTEGER NOT NULL DEFAULT -1,
    r INTEGER NOT NULL DEFAULT 0,
    g INTEGER NOT NULL DEFAULT 0,
    b INTEGER NOT NULL DEFAULT 0,
    a INTEGER NOT NULL DEFAULT 255,
    inuse INTEGER NOT NULL DEFAULT 0,
    metal INTEGER NOT NULL DEFAULT 0,
    transparent INTEGER NOT NULL DEFAULT 0,
    glitter INTEGER NOT NULL DEFAULT 0,
    lddname TEXT NOT NULL DEFAULT '',
    colgrp INTEGER NOT NULL DEFAULT 0,
    notes TEXT NOT NULL DEFAULT '',
    lastmod TEXT
);
CREATE INDEX IF NOT EXISTS color_ldd ON colors(ldd);
CREATE INDEX IF NOT EXISTS color_bl ON colors(bl);
CREATE INDEX IF NOT EXISTS color_ldr ON colors(ldraw);";

const CREATE_PARTS: &str = "CREATE TABLE IF NOT EXISTS partmapping (
    mapid INTEGER PRIMARY KEY AUTOINCREMENT,
    masterid TEXT NOT NULL DEFAULT '',
    designid TEXT NOT NULL DEFAULT '',
    decorid TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    blid TEXT NOT NULL DEFAULT '',
    ldrawid TEXT NOT NULL DEFAULT '',
    ldd2bl INTEGER NOT NULL DEFAULT 0,
    bl2ldd INTEGER NOT NULL DEFAULT 0,
    ldd2dat INTEGER NOT NULL DEFAULT 0,
    dat2ldd INTEGER NOT NULL DEFAULT 0,
    bl2dat INTEGER NOT NULL DEFAULT 0,
    dat2bl INTEGER NOT NULL DEFAULT 0,
    lastmod TEXT
);
CREATE INDEX IF NOT EXISTS pm_lddid ON partmapping(designid);
CREATE INDEX IF NOT EXISTS pm_masterid ON partmapping(masterid);
CREATE INDEX IF NOT EXISTS pm_blid ON partmapping(blid);
CREATE INDEX IF NOT EXISTS pm_ldrawid ON partmapping(ldrawid);";

fn backend(e: rusqlite::Error) -> BrickmapError {
    StorageError::Backend {
        reason: e.to_string(),
    }
    .into()
}

fn transaction_failed(e: rusqlite::Error) -> BrickmapError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
    .into()
}

fn fts_name(table: Table) -> String {
    format!("{}_fts", table.name())
}

fn sql_timestamp(ts: &Timestamp) -> String {
    ts.format(SQL_TIMESTAMP_FORMAT).to_string()
}

fn color_code_column(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Primary => "ldd",
        Catalog::Marketplace => "bl",
        Catalog::OpenFormat => "ldraw",
    }
}

fn part_id_column(catalog: Catalog) -> &'static str {
    match catalog {
        Catalog::Primary => "designid",
        Catalog::Marketplace => "blid",
        Catalog::OpenFormat => "ldrawid",
    }
}

fn conversion_failure(idx: usize, error: FormatError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error))
}

fn read_timestamp(row: &Row<'_>, idx: usize, table: Table) -> rusqlite::Result<Option<Timestamp>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(text) => match parse_timestamp(&text) {
            Some(ts) => Ok(Some(ts)),
            None => Err(conversion_failure(
                idx,
                FormatError::InvalidTimestamp {
                    element: table.name(),
                    value: text,
                },
            )),
        },
    }
}

fn read_date(row: &Row<'_>, idx: usize, table: Table) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|_| {
        conversion_failure(
            idx,
            FormatError::InvalidTimestamp {
                element: table.name(),
                value: text.clone(),
            },
        )
    })
}

fn color_from_row(row: &Row<'_>) -> rusqlite::Result<ColorEquivalence> {
    Ok(ColorEquivalence {
        map_id: row.get(0)?,
        primary: Catalog::Primary.decode_color_code(row.get(1)?),
        marketplace: Catalog::Marketplace.decode_color_code(row.get(2)?),
        open_format: Catalog::OpenFormat.decode_color_code(row.get(3)?),
        color: Rgba::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
        in_production: row.get(8)?,
        metallic: row.get(9)?,
        transparent: row.get(10)?,
        glitter: row.get(11)?,
        name: row.get(12)?,
        group: row.get(13)?,
        notes: row.get(14)?,
        last_modified: read_timestamp(row, 15, Table::Colors)?,
    })
}

fn part_from_row(row: &Row<'_>) -> rusqlite::Result<PartEquivalence> {
    let mut directions = DirectionSet::empty();
    for (offset, direction) in Direction::ALL.iter().enumerate() {
        if row.get::<_, bool>(7 + offset)? {
            directions |= direction.flag();
        }
    }
    Ok(PartEquivalence {
        map_id: row.get(0)?,
        master_id: row.get(1)?,
        design_id: row.get(2)?,
        decoration_id: row.get(3)?,
        name: row.get(4)?,
        marketplace_id: row.get(5)?,
        open_format_id: row.get(6)?,
        directions,
        last_modified: read_timestamp(row, 13, Table::PartMapping)?,
    })
}

/// Store backed by a SQLite database file or an in-memory database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Mutex<Option<Timestamp>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> BrickmapResult<Self> {
        let conn = Connection::open(path).map_err(backend)?;
        info!(path = %path.display(), "Opened SQLite mapping store");
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> BrickmapResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> BrickmapResult<Self> {
        conn.execute_batch(CREATE_LEDGER).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Mutex::new(None),
        })
    }

    /// Stamp every following write with `at`.
    pub fn freeze_clock(&self, at: Timestamp) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        *clock = Some(at);
    }

    /// Move a frozen clock forward by `by`. No effect on a live clock.
    pub fn advance_clock(&self, by: chrono::Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(at) = clock.as_mut() {
            *at += by;
        }
    }

    fn now(&self) -> Timestamp {
        let clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        clock.unwrap_or_else(store_now)
    }

    fn conn(&self) -> BrickmapResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn object_exists(conn: &Connection, name: &str) -> BrickmapResult<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        Ok(found.is_some())
    }

    fn require(conn: &Connection, table: Table) -> BrickmapResult<()> {
        if Self::object_exists(conn, table.name())? {
            Ok(())
        } else {
            Err(StorageError::TableMissing { table }.into())
        }
    }

    fn query_colors<P: rusqlite::Params>(
        &self,
        clause: &str,
        params: P,
    ) -> BrickmapResult<Vec<ColorEquivalence>> {
        let conn = self.conn()?;
        Self::require(&conn, Table::Colors)?;
        let sql = format!("SELECT {} FROM colors {} ORDER BY mapid", COLOR_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt.query_map(params, color_from_row).map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn query_parts<P: rusqlite::Params>(
        &self,
        clause: &str,
        params: P,
    ) -> BrickmapResult<Vec<PartEquivalence>> {
        let conn = self.conn()?;
        Self::require(&conn, Table::PartMapping)?;
        let sql = format!("SELECT {} FROM partmapping {} ORDER BY mapid", PART_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt.query_map(params, part_from_row).map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn modified_dates(&self, table: Table, limit: usize) -> BrickmapResult<Vec<NaiveDate>> {
        let conn = self.conn()?;
        Self::require(&conn, table)?;
        let sql = format!(
            "SELECT DISTINCT substr(lastmod, 1, 10) AS day FROM {} \
             WHERE lastmod IS NOT NULL ORDER BY day DESC LIMIT ?1",
            table.name()
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map([limit], |row| read_date(row, 0, table))
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn count(&self, table: Table) -> BrickmapResult<usize> {
        let conn = self.conn()?;
        Self::require(&conn, table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl MappingStore for SqliteStore {
    // === Schema ===

    fn table_exists(&self, table: Table) -> BrickmapResult<bool> {
        let conn = self.conn()?;
        Self::object_exists(&conn, table.name())
    }

    fn create_table(&self, table: Table) -> BrickmapResult<()> {
        let conn = self.conn()?;
        let ddl = match table {
            Table::Colors => CREATE_COLORS,
            Table::PartMapping => CREATE_PARTS,
        };
        conn.execute_batch(ddl).map_err(backend)?;
        debug!(table = %table, "Ensured table and indexes");
        Ok(())
    }

    fn schema_version(&self, key: &str) -> BrickmapResult<Option<i32>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT version FROM schema_ledger WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)
    }

    fn set_schema_version(&self, key: &str, version: i32) -> BrickmapResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO schema_ledger (key, version) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET version = excluded.version",
            params![key, version],
        )
        .map_err(backend)?;
        Ok(())
    }

    // === Transactions ===

    fn set_autocommit(&self, enabled: bool) -> BrickmapResult<()> {
        let conn = self.conn()?;
        match (enabled, conn.is_autocommit()) {
            (true, false) => conn.execute_batch("COMMIT").map_err(transaction_failed),
            (false, true) => conn.execute_batch("BEGIN").map_err(transaction_failed),
            _ => Ok(()),
        }
    }

    fn is_autocommit(&self) -> BrickmapResult<bool> {
        Ok(self.conn()?.is_autocommit())
    }

    fn commit(&self) -> BrickmapResult<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Err(StorageError::TransactionFailed {
                reason: "commit requested in auto-commit mode".to_string(),
            }
            .into());
        }
        conn.execute_batch("COMMIT; BEGIN").map_err(transaction_failed)
    }

    fn rollback(&self) -> BrickmapResult<()> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            return Err(StorageError::TransactionFailed {
                reason: "rollback requested in auto-commit mode".to_string(),
            }
            .into());
        }
        conn.execute_batch("ROLLBACK; BEGIN").map_err(transaction_failed)
    }

    // === Full-text index ===

    fn fulltext_exists(&self, table: Table) -> BrickmapResult<bool> {
        let conn = self.conn()?;
        Self::object_exists(&conn, &fts_name(table))
    }

    fn create_fulltext(&self, table: Table, columns: &[&str]) -> BrickmapResult<()> {
        let fts = fts_name(table);
        let index_error = |reason: String| -> BrickmapError {
            StorageError::IndexError {
                index_name: fts.clone(),
                reason,
            }
            .into()
        };

        let allowed = fulltext::text_columns(table);
        if columns.is_empty() {
            return Err(index_error("no columns given".to_string()));
        }
        if let Some(bad) = columns.iter().find(|c| !allowed.contains(*c)) {
            return Err(index_error(format!("column '{}' cannot be indexed", bad)));
        }

        let conn = self.conn()?;
        Self::require(&conn, table)?;
        let cols = columns.join(", ");
        let new_values = columns
            .iter()
            .map(|c| format!("new.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let old_values = columns
            .iter()
            .map(|c| format!("old.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let t = table.name();
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5({cols}, content='{t}', content_rowid='mapid');
             CREATE TRIGGER IF NOT EXISTS {fts}_ai AFTER INSERT ON {t} BEGIN
                 INSERT INTO {fts}(rowid, {cols}) VALUES (new.mapid, {new_values});
             END;
             CREATE TRIGGER IF NOT EXISTS {fts}_ad AFTER DELETE ON {t} BEGIN
                 INSERT INTO {fts}({fts}, rowid, {cols}) VALUES ('delete', old.mapid, {old_values});
             END;
             CREATE TRIGGER IF NOT EXISTS {fts}_au AFTER UPDATE ON {t} BEGIN
                 INSERT INTO {fts}({fts}, rowid, {cols}) VALUES ('delete', old.mapid, {old_values});
                 INSERT INTO {fts}(rowid, {cols}) VALUES (new.mapid, {new_values});
             END;
             INSERT INTO {fts}({fts}) VALUES ('rebuild');"
        );
        conn.execute_batch(&sql)
            .map_err(|e| index_error(e.to_string()))?;
        info!(index = %fts, "Built full-text index");
        Ok(())
    }

    fn drop_fulltext(&self, table: Table) -> BrickmapResult<()> {
        let fts = fts_name(table);
        let conn = self.conn()?;
        let sql = format!(
            "DROP TRIGGER IF EXISTS {fts}_ai;
             DROP TRIGGER IF EXISTS {fts}_ad;
             DROP TRIGGER IF EXISTS {fts}_au;
             DROP TABLE IF EXISTS {fts};"
        );
        conn.execute_batch(&sql).map_err(|e| -> BrickmapError {
            StorageError::IndexError {
                index_name: fts.clone(),
                reason: e.to_string(),
            }
            .into()
        })?;
        info!(index = %fts, "Dropped full-text index");
        Ok(())
    }

    fn fulltext_search(&self, table: Table, query: &str) -> BrickmapResult<Vec<(MapId, f32)>> {
        let fts = fts_name(table);
        let conn = self.conn()?;
        if !Self::object_exists(&conn, &fts)? {
            return Err(StorageError::IndexError {
                index_name: fts,
                reason: "index does not exist".to_string(),
            }
            .into());
        }
        let Some(expression) = fulltext::fts5_query(query) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT rowid, bm25({fts}) AS rank FROM {fts} WHERE {fts} MATCH ?1 ORDER BY rank, rowid"
        );
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map([expression], |row| {
                let id: MapId = row.get(0)?;
                let rank: f64 = row.get(1)?;
                // bm25 ranks better matches lower
                Ok((id, -rank as f32))
            })
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    // === Color Operations ===

    fn color_insert(&self, color: &ColorEquivalence) -> BrickmapResult<MapId> {
        let now = sql_timestamp(&self.now());
        let conn = self.conn()?;
        Self::require(&conn, Table::Colors)?;
        conn.execute(
            "INSERT INTO colors (ldd, bl, ldraw, r, g, b, a, inuse, metal, transparent, glitter,
                                 lddname, colgrp, notes, lastmod)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                Catalog::Primary.encode_color_code(color.primary),
                Catalog::Marketplace.encode_color_code(color.marketplace),
                Catalog::OpenFormat.encode_color_code(color.open_format),
                color.color.r,
                color.color.g,
                color.color.b,
                color.color.a,
                color.in_production,
                color.metallic,
                color.transparent,
                color.glitter,
                color.name,
                color.group,
                color.notes,
                now,
            ],
        )
        .map_err(backend)?;
        MapId::try_from(conn.last_insert_rowid()).map_err(|e| {
            StorageError::Backend {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn color_update(&self, color: &ColorEquivalence) -> BrickmapResult<()> {
        let now = sql_timestamp(&self.now());
        let conn = self.conn()?;
        Self::require(&conn, Table::Colors)?;
        let changed = conn
            .execute(
                "UPDATE colors SET ldd = ?1, bl = ?2, ldraw = ?3, r = ?4, g = ?5, b = ?6, a = ?7,
                    inuse = ?8, metal = ?9, transparent = ?10, glitter = ?11, lddname = ?12,
                    colgrp = ?13, notes = ?14, lastmod = ?15
                 WHERE mapid = ?16",
                params![
                    Catalog::Primary.encode_color_code(color.primary),
                    Catalog::Marketplace.encode_color_code(color.marketplace),
                    Catalog::OpenFormat.encode_color_code(color.open_format),
                    color.color.r,
                    color.color.g,
                    color.color.b,
                    color.color.a,
                    color.in_production,
                    color.metallic,
                    color.transparent,
                    color.glitter,
                    color.name,
                    color.group,
                    color.notes,
                    now,
                    color.map_id,
                ],
            )
            .map_err(backend)?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                table: Table::Colors,
                id: color.map_id,
            }
            .into());
        }
        Ok(())
    }

    fn color_get(&self, id: MapId) -> BrickmapResult<Option<ColorEquivalence>> {
        Ok(self.query_colors("WHERE mapid = ?1", [id])?.into_iter().next())
    }

    fn color_list(&self) -> BrickmapResult<Vec<ColorEquivalence>> {
        self.query_colors("", [])
    }

    fn color_find_by_code(&self, catalog: Catalog, code: i32) -> BrickmapResult<Vec<ColorEquivalence>> {
        if code == catalog.absent_color_code() {
            return Ok(Vec::new());
        }
        let column = color_code_column(catalog);
        let clause = format!(
            "WHERE {column} = ?1 AND {column} <> {}",
            catalog.absent_color_code()
        );
        self.query_colors(&clause, [code])
    }

    fn color_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<ColorEquivalence>> {
        self.query_colors("WHERE lastmod >= ?1", [sql_timestamp(&since)])
    }

    fn color_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>> {
        self.modified_dates(Table::Colors, limit)
    }

    fn color_count(&self) -> BrickmapResult<usize> {
        self.count(Table::Colors)
    }

    // === Part Operations ===

    fn part_insert(&self, part: &PartEquivalence) -> BrickmapResult<MapId> {
        let now = sql_timestamp(&self.now());
        let conn = self.conn()?;
        Self::require(&conn, Table::PartMapping)?;
        conn.execute(
            "INSERT INTO partmapping (masterid, designid, decorid, name, blid, ldrawid,
                                      ldd2bl, bl2ldd, ldd2dat, dat2ldd, bl2dat, dat2bl, lastmod)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                part.master_id,
                part.design_id,
                part.decoration_id,
                part.name,
                part.marketplace_id,
                part.open_format_id,
                part.enables(Direction::PrimaryToMarketplace),
                part.enables(Direction::MarketplaceToPrimary),
                part.enables(Direction::PrimaryToOpenFormat),
                part.enables(Direction::OpenFormatToPrimary),
                part.enables(Direction::MarketplaceToOpenFormat),
                part.enables(Direction::OpenFormatToMarketplace),
                now,
            ],
        )
        .map_err(backend)?;
        MapId::try_from(conn.last_insert_rowid()).map_err(|e| {
            StorageError::Backend {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn part_update(&self, part: &PartEquivalence) -> BrickmapResult<()> {
        let now = sql_timestamp(&self.now());
        let conn = self.conn()?;
        Self::require(&conn, Table::PartMapping)?;
        let changed = conn
            .execute(
                "UPDATE partmapping SET masterid = ?1, designid = ?2, decorid = ?3, name = ?4,
                    blid = ?5, ldrawid = ?6, ldd2bl = ?7, bl2ldd = ?8, ldd2dat = ?9,
                    dat2ldd = ?10, bl2dat = ?11, dat2bl = ?12, lastmod = ?13
                 WHERE mapid = ?14",
                params![
                    part.master_id,
                    part.design_id,
                    part.decoration_id,
                    part.name,
                    part.marketplace_id,
                    part.open_format_id,
                    part.enables(Direction::PrimaryToMarketplace),
                    part.enables(Direction::MarketplaceToPrimary),
                    part.enables(Direction::PrimaryToOpenFormat),
                    part.enables(Direction::OpenFormatToPrimary),
                    part.enables(Direction::MarketplaceToOpenFormat),
                    part.enables(Direction::OpenFormatToMarketplace),
                    now,
                    part.map_id,
                ],
            )
            .map_err(backend)?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                table: Table::PartMapping,
                id: part.map_id,
            }
            .into());
        }
        Ok(())
    }

    fn part_get(&self, id: MapId) -> BrickmapResult<Option<PartEquivalence>> {
        Ok(self.query_parts("WHERE mapid = ?1", [id])?.into_iter().next())
    }

    fn part_list(&self) -> BrickmapResult<Vec<PartEquivalence>> {
        self.query_parts("", [])
    }

    fn part_find_by_source(
        &self,
        direction: Direction,
        source_id: &str,
        decoration_id: &str,
    ) -> BrickmapResult<Vec<PartEquivalence>> {
        let clause = format!(
            "WHERE {} = ?1 AND decorid = ?2 AND {} <> 0",
            part_id_column(direction.source()),
            direction.column()
        );
        self.query_parts(&clause, params![source_id, decoration_id])
    }

    fn part_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<PartEquivalence>> {
        self.query_parts("WHERE lastmod >= ?1", [sql_timestamp(&since)])
    }

    fn part_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>> {
        self.modified_dates(Table::PartMapping, limit)
    }

    fn part_latest_modified(&self) -> BrickmapResult<Option<Timestamp>> {
        let conn = self.conn()?;
        Self::require(&conn, Table::PartMapping)?;
        conn.query_row("SELECT MAX(lastmod) FROM partmapping", [], |row| {
            read_timestamp(row, 0, Table::PartMapping)
        })
        .map_err(backend)
    }

    fn part_trim_text_fields(&self) -> BrickmapResult<usize> {
        let parts = self.query_parts("", [])?;
        let mut conn = self.conn()?;
        let savepoint = conn.savepoint().map_err(transaction_failed)?;
        let mut changed = 0;
        for part in parts {
            let trimmed = part.trimmed();
            if trimmed == part {
                continue;
            }
            savepoint
                .execute(
                    "UPDATE partmapping SET masterid = ?1, designid = ?2, decorid = ?3,
                        name = ?4, blid = ?5, ldrawid = ?6
                     WHERE mapid = ?7",
                    params![
                        trimmed.master_id,
                        trimmed.design_id,
                        trimmed.decoration_id,
                        trimmed.name,
                        trimmed.marketplace_id,
                        trimmed.open_format_id,
                        trimmed.map_id,
                    ],
                )
                .map_err(backend)?;
            changed += 1;
        }
        savepoint.commit().map_err(transaction_failed)?;
        Ok(changed)
    }

    fn part_count(&self) -> BrickmapResult<usize> {
        self.count(Table::PartMapping)
    }
}
