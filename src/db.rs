//! Local SQLite database layer for Tableside.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, the transaction
//! helper every multi-step write goes through, and the managed state shared
//! by the command layer.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};

/// Managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection. A poisoned lock is recovered: SQLite itself keeps
    /// the data consistent and an open transaction is rolled back on the next
    /// `BEGIN`.
    pub fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Current schema version. Bump when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/tableside.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations.
pub fn init(data_dir: &Path) -> EngineResult<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| EngineError::Internal(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("tableside.db");
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> EngineResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: tenants, orders, per-table order sequences, customers.
fn migrate_v1(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS restaurants (
            id TEXT PRIMARY KEY,
            short_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT,
            table_id TEXT NOT NULL,
            order_number TEXT NOT NULL,
            items TEXT NOT NULL DEFAULT '[]',
            total REAL NOT NULL CHECK (total >= 0),
            status TEXT NOT NULL DEFAULT 'pending',
            payment_method TEXT NOT NULL,
            payment_status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT,
            customer_session_id TEXT NOT NULL,
            customer_phone TEXT,
            deposit_used REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- One row per (tenant, table); last_seq is the most recently issued
        -- sequence number. scope_key is the restaurant id or '' when unscoped.
        CREATE TABLE IF NOT EXISTS order_sequences (
            scope_key TEXT NOT NULL,
            table_id TEXT NOT NULL,
            last_seq INTEGER NOT NULL,
            PRIMARY KEY (scope_key, table_id)
        );

        CREATE TABLE IF NOT EXISTS customers (
            phone TEXT PRIMARY KEY,
            deposit_balance REAL NOT NULL DEFAULT 0 CHECK (deposit_balance >= 0),
            total_visits INTEGER NOT NULL DEFAULT 0,
            total_spent REAL NOT NULL DEFAULT 0,
            last_visit TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_table_number
            ON orders(COALESCE(restaurant_id, ''), table_id, order_number);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_session ON orders(customer_session_id);
        CREATE INDEX IF NOT EXISTS idx_orders_phone ON orders(customer_phone);
        CREATE INDEX IF NOT EXISTS idx_orders_restaurant ON orders(restaurant_id);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        EngineError::from(e)
    })?;
    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: staff directory, staff calls, staff notifications.
fn migrate_v2(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS staff (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            phone TEXT,
            assigned_tables TEXT NOT NULL DEFAULT '[]',
            active INTEGER NOT NULL DEFAULT 1,
            is_online INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS staff_calls (
            id TEXT PRIMARY KEY,
            restaurant_id TEXT,
            table_id TEXT NOT NULL,
            table_number INTEGER NOT NULL,
            zone_name TEXT,
            reason TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            original_staff_id TEXT,
            reassigned_to TEXT,
            reassign_reason TEXT,
            acknowledged_at TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS staff_notifications (
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            call_id TEXT,
            notification_type TEXT NOT NULL,
            message TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_staff_restaurant ON staff(restaurant_id);
        CREATE INDEX IF NOT EXISTS idx_staff_calls_status ON staff_calls(status);
        CREATE INDEX IF NOT EXISTS idx_staff_calls_table ON staff_calls(table_number);
        CREATE INDEX IF NOT EXISTS idx_staff_notifications_staff
            ON staff_notifications(staff_id, read);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        EngineError::from(e)
    })?;
    info!("Applied migration v2");
    Ok(())
}

/// Run `f` inside `BEGIN IMMEDIATE ... COMMIT`, rolling back on any error.
///
/// `IMMEDIATE` takes the write lock up front, so read-then-write sequences
/// inside `f` (sequence bump, balance check) cannot interleave with another
/// writer on the same file.
pub(crate) fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> EngineResult<T>,
) -> EngineResult<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")?;
        Ok(value)
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!("rollback failed: {e}");
        }
    }
    result
}

/// Fixed-width UTC timestamp (`2026-01-01T12:00:00.000Z`). Fixed width keeps
/// lexical comparison in SQL equal to chronological comparison.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    ts(Utc::now())
}

/// True for UNIQUE / PRIMARY KEY collisions.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// In-memory database with the full schema, for unit tests.
#[cfg(test)]
pub(crate) fn test_db() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .expect("pragma setup");
    run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
