use crate::entities::SwiftCode;
use crate::store::{BranchUpdate, Event, RegistryStats, RegistryStore, StoreError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // SWIFT codes (one row per entity)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS swift_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            swift_code TEXT UNIQUE NOT NULL,
            prefix TEXT NOT NULL,
            country_iso2 TEXT NOT NULL,
            code_type TEXT NOT NULL,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            town_name TEXT NOT NULL,
            country_name TEXT NOT NULL,
            time_zone TEXT NOT NULL,
            is_headquarter INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Branch links (a headquarters' branch list, one row per member)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS branch_links (
            headquarter_code TEXT NOT NULL,
            branch_code TEXT NOT NULL,
            PRIMARY KEY (headquarter_code, branch_code)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================

    // prefix -> headquarters: at most one headquarters per prefix
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_headquarter_prefix
         ON swift_codes(prefix) WHERE is_headquarter = 1",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prefix ON swift_codes(prefix, is_headquarter)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_country_iso2 ON swift_codes(country_iso2)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_branch_links_branch ON branch_links(branch_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const SELECT_COLUMNS: &str = "swift_code, country_iso2, code_type, name, address,
    town_name, country_name, time_zone, is_headquarter";

fn row_to_swift_code(row: &Row) -> rusqlite::Result<SwiftCode> {
    Ok(SwiftCode {
        swift_code: row.get(0)?,
        country_iso2: row.get(1)?,
        code_type: row.get(2)?,
        name: row.get(3)?,
        address: row.get(4)?,
        town_name: row.get(5)?,
        country_name: row.get(6)?,
        time_zone: row.get(7)?,
        is_headquarter: row.get(8)?,
        branches: Vec::new(),
    })
}

fn load_branches(conn: &Connection, entity: &mut SwiftCode) -> rusqlite::Result<()> {
    if !entity.is_headquarter {
        return Ok(());
    }

    let mut stmt = conn.prepare_cached(
        "SELECT branch_code FROM branch_links
         WHERE headquarter_code = ?1
         ORDER BY rowid",
    )?;
    entity.branches = stmt
        .query_map([&entity.swift_code], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(())
}

fn query_codes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<SwiftCode>> {
    let mut stmt = conn.prepare(sql)?;
    let mut codes = stmt
        .query_map(params, row_to_swift_code)?
        .collect::<Result<Vec<_>, _>>()?;

    for code in codes.iter_mut() {
        load_branches(conn, code)?;
    }

    Ok(codes)
}

fn find_one(conn: &Connection, code: &str) -> rusqlite::Result<Option<SwiftCode>> {
    let found = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM swift_codes WHERE swift_code = ?1"),
            [code],
            row_to_swift_code,
        )
        .optional()?;

    match found {
        Some(mut entity) => {
            load_branches(conn, &mut entity)?;
            Ok(Some(entity))
        }
        None => Ok(None),
    }
}

/// Translate a constraint violation into the invariant it protects
fn map_insert_error(err: rusqlite::Error, entity: &SwiftCode) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let on_prefix = message
                .as_deref()
                .map(|m| m.contains("swift_codes.prefix"))
                .unwrap_or(false);

            if on_prefix {
                StoreError::HeadquarterExists(entity.prefix().to_string())
            } else {
                StoreError::Duplicate(entity.swift_code.clone())
            }
        }
        _ => StoreError::Backend(err),
    }
}

fn insert_one(conn: &Connection, entity: &SwiftCode) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO swift_codes (
            swift_code, prefix, country_iso2, code_type, name, address,
            town_name, country_name, time_zone, is_headquarter
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity.swift_code,
            entity.prefix(),
            entity.country_iso2,
            entity.code_type,
            entity.name,
            entity.address,
            entity.town_name,
            entity.country_name,
            entity.time_zone,
            entity.is_headquarter,
        ],
    )
    .map_err(|e| map_insert_error(e, entity))?;

    if entity.is_headquarter {
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO branch_links (headquarter_code, branch_code) VALUES (?1, ?2)",
        )?;
        for branch in &entity.branches {
            stmt.execute(params![entity.swift_code, branch])?;
        }
    }

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// `RegistryStore` over a single SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut *conn)
    }
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<SwiftCode>> {
        self.with_conn(|conn| Ok(find_one(conn, code)?))
    }

    async fn find_by_codes(&self, codes: &[String]) -> StoreResult<Vec<SwiftCode>> {
        self.with_conn(|conn| {
            let mut found = Vec::with_capacity(codes.len());
            for code in codes {
                if let Some(entity) = find_one(conn, code)? {
                    found.push(entity);
                }
            }
            Ok(found)
        })
    }

    async fn find_by_prefix(
        &self,
        prefix: &str,
        is_headquarter: bool,
    ) -> StoreResult<Option<SwiftCode>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM swift_codes
                 WHERE prefix = ?1 AND is_headquarter = ?2
                 ORDER BY id LIMIT 1"
            );
            let mut found = query_codes(conn, &sql, params![prefix, is_headquarter])?;
            Ok(found.pop())
        })
    }

    async fn find_branches_by_prefix(&self, prefix: &str) -> StoreResult<Vec<SwiftCode>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM swift_codes
                 WHERE prefix = ?1 AND is_headquarter = 0
                 ORDER BY id"
            );
            Ok(query_codes(conn, &sql, [prefix])?)
        })
    }

    async fn find_by_country(&self, iso2: &str) -> StoreResult<Vec<SwiftCode>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM swift_codes
                 WHERE country_iso2 = ?1
                 ORDER BY id"
            );
            Ok(query_codes(conn, &sql, [iso2])?)
        })
    }

    async fn insert(&self, entity: &SwiftCode) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            insert_one(&tx, entity)?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn update_branch_list(
        &self,
        headquarter_code: &str,
        update: BranchUpdate,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            match update {
                // Single statement: the headquarters check and the set-add
                // cannot interleave with another writer.
                BranchUpdate::Add(branch) => {
                    conn.execute(
                        "INSERT OR IGNORE INTO branch_links (headquarter_code, branch_code)
                         SELECT swift_code, ?2 FROM swift_codes
                         WHERE swift_code = ?1 AND is_headquarter = 1",
                        params![headquarter_code, branch],
                    )?;
                }
                BranchUpdate::Remove(branch) => {
                    conn.execute(
                        "DELETE FROM branch_links WHERE headquarter_code = ?1 AND branch_code = ?2",
                        params![headquarter_code, branch],
                    )?;
                }
            }
            Ok(())
        })
    }

    async fn delete(&self, code: &str) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            // The branch list belongs to the headquarters record; the branch
            // records themselves stay.
            tx.execute("DELETE FROM branch_links WHERE headquarter_code = ?1", [code])?;
            let deleted = tx.execute("DELETE FROM swift_codes WHERE swift_code = ?1", [code])?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    async fn replace_all(&self, entities: &[SwiftCode]) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM branch_links", [])?;
            tx.execute("DELETE FROM swift_codes", [])?;

            for entity in entities {
                insert_one(&tx, entity)?;
            }

            tx.commit()?;
            Ok(entities.len())
        })
    }

    async fn stats(&self) -> StoreResult<RegistryStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };

            let total = count("SELECT COUNT(*) FROM swift_codes")?;
            let headquarters = count("SELECT COUNT(*) FROM swift_codes WHERE is_headquarter = 1")?;
            let linked_branches = count(
                "SELECT COUNT(*) FROM swift_codes s
                 WHERE s.is_headquarter = 0
                   AND EXISTS (SELECT 1 FROM branch_links l WHERE l.branch_code = s.swift_code)",
            )?;
            let branches = total - headquarters;

            Ok(RegistryStats {
                total,
                headquarters,
                branches,
                linked_branches,
                orphaned_branches: branches - linked_branches,
            })
        })
    }

    async fn record_event(&self, event: &Event) -> StoreResult<()> {
        let data_json = serde_json::to_string(&event.data)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (
                    event_id, timestamp, event_type, entity_id, data, actor
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.event_id,
                    event.timestamp.to_rfc3339(),
                    event.event_type,
                    event.entity_id,
                    data_json,
                    event.actor,
                ],
            )?;
            Ok(())
        })
    }

    async fn events_for(&self, entity_id: &str) -> StoreResult<Vec<Event>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, timestamp, event_type, entity_id, data, actor
                 FROM events
                 WHERE entity_id = ?1
                 ORDER BY timestamp DESC, id DESC",
            )?;

            let events = stmt
                .query_map([entity_id], |row| {
                    let timestamp_str: String = row.get(1)?;
                    let data_json: String = row.get(4)?;

                    Ok(Event {
                        event_id: row.get(0)?,
                        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                            .map_err(|e| {
                                rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                            })?
                            .with_timezone(&Utc),
                        event_type: row.get(2)?,
                        entity_id: row.get(3)?,
                        data: serde_json::from_str(&data_json).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
                        })?,
                        actor: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(events)
        })
    }
}
