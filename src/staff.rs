//! Staff directory: records, table assignments and presence.
//!
//! A table may be assigned to any number of staff at once. Overlaps are a
//! dashboard warning, not an error. Lookups that need a single responsible
//! person take the earliest-created match.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{now_ts, ts, DbState};
use crate::error::{or_not_found, EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaffRole {
    Waiter,
    Manager,
    Host,
    Bartender,
    Runner,
}

impl StaffRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiter => "Waiter",
            Self::Manager => "Manager",
            Self::Host => "Host",
            Self::Bartender => "Bartender",
            Self::Runner => "Runner",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiter" => Ok(Self::Waiter),
            "manager" => Ok(Self::Manager),
            "host" => Ok(Self::Host),
            "bartender" => Ok(Self::Bartender),
            "runner" => Ok(Self::Runner),
            other => Err(EngineError::validation(format!("Unknown staff role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    pub name: String,
    pub role: StaffRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub assigned_tables: Vec<i64>,
    pub active: bool,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Staff {
    pub fn covers_table(&self, table_number: i64) -> bool {
        self.assigned_tables.contains(&table_number)
    }
}

#[derive(Debug, Clone)]
pub struct NewStaff {
    pub restaurant_id: Option<String>,
    pub name: String,
    pub role: StaffRole,
    pub phone: Option<String>,
    pub assigned_tables: Vec<i64>,
}

/// Partial update. `phone: Some("")` clears the phone.
#[derive(Debug, Clone, Default)]
pub struct StaffUpdate {
    pub name: Option<String>,
    pub role: Option<StaffRole>,
    pub phone: Option<String>,
    pub assigned_tables: Option<Vec<i64>>,
}

const STAFF_COLUMNS: &str = "id, restaurant_id, name, role, phone, assigned_tables, active,
    is_online, last_seen, created_at, updated_at";

fn staff_from_row(row: &Row<'_>) -> rusqlite::Result<Staff> {
    let role: String = row.get(3)?;
    let tables: String = row.get(5)?;
    Ok(Staff {
        id: row.get(0)?,
        restaurant_id: row.get(1)?,
        name: row.get(2)?,
        role: role
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        phone: row.get(4)?,
        assigned_tables: serde_json::from_str(&tables)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        active: row.get(6)?,
        is_online: row.get(7)?,
        last_seen: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Sorted, de-duplicated, positive table numbers.
pub(crate) fn normalize_tables(tables: &[i64]) -> EngineResult<Vec<i64>> {
    if let Some(bad) = tables.iter().find(|t| **t <= 0) {
        return Err(EngineError::validation(format!(
            "Table numbers must be positive, got {bad}"
        )));
    }
    let mut out = tables.to_vec();
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

fn clean_phone(phone: Option<String>) -> Option<String> {
    phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub(crate) fn load_staff(conn: &Connection, staff_id: &str) -> EngineResult<Staff> {
    or_not_found(
        conn.query_row(
            &format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?1"),
            params![staff_id],
            staff_from_row,
        ),
        "staff",
        staff_id,
    )
}

/// Staff in creation order, optionally scoped and/or filtered to active.
pub(crate) fn list_staff_conn(
    conn: &Connection,
    restaurant_id: Option<&str>,
    active_only: bool,
) -> EngineResult<Vec<Staff>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff
         WHERE (?1 IS NULL OR restaurant_id = ?1) AND (?2 = 0 OR active = 1)
         ORDER BY rowid ASC"
    ))?;
    let rows = stmt
        .query_map(params![restaurant_id, active_only], staff_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_staff(db: &DbState, staff_id: &str) -> EngineResult<Staff> {
    let conn = db.lock();
    load_staff(&conn, staff_id)
}

pub fn list_staff(db: &DbState, restaurant_id: Option<&str>) -> EngineResult<Vec<Staff>> {
    let conn = db.lock();
    list_staff_conn(&conn, restaurant_id, false)
}

/// First active staff member (by creation order) assigned to `table_number`.
pub(crate) fn find_responsible_staff(
    conn: &Connection,
    restaurant_id: Option<&str>,
    table_number: i64,
) -> EngineResult<Option<Staff>> {
    Ok(list_staff_conn(conn, restaurant_id, true)?
        .into_iter()
        .find(|s| s.covers_table(table_number)))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

pub fn create_staff(db: &DbState, new: NewStaff) -> EngineResult<Staff> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(EngineError::validation("Staff name is required"));
    }
    let tables = normalize_tables(&new.assigned_tables)?;
    let phone = clean_phone(new.phone);
    let id = Uuid::new_v4().to_string();
    let now = now_ts();

    let conn = db.lock();
    conn.execute(
        "INSERT INTO staff (id, restaurant_id, name, role, phone, assigned_tables, active,
            is_online, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?7)",
        params![
            id,
            new.restaurant_id,
            name,
            new.role.as_str(),
            phone,
            serde_json::to_string(&tables)?,
            now,
        ],
    )?;

    info!(staff_id = %id, name = %name, role = %new.role, "Staff created");
    load_staff(&conn, &id)
}

pub fn update_staff(db: &DbState, staff_id: &str, update: StaffUpdate) -> EngineResult<Staff> {
    let conn = db.lock();
    let mut staff = load_staff(&conn, staff_id)?;

    if let Some(name) = update.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::validation("Staff name is required"));
        }
        staff.name = name;
    }
    if let Some(role) = update.role {
        staff.role = role;
    }
    if update.phone.is_some() {
        staff.phone = clean_phone(update.phone);
    }
    if let Some(tables) = update.assigned_tables {
        staff.assigned_tables = normalize_tables(&tables)?;
    }

    staff.updated_at = now_ts();
    conn.execute(
        "UPDATE staff SET name = ?1, role = ?2, phone = ?3, assigned_tables = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            staff.name,
            staff.role.as_str(),
            staff.phone,
            serde_json::to_string(&staff.assigned_tables)?,
            staff.updated_at,
            staff_id,
        ],
    )?;

    info!(staff_id = %staff_id, "Staff updated");
    Ok(staff)
}

pub(crate) fn set_assigned_tables(
    conn: &Connection,
    staff: &mut Staff,
    tables: &[i64],
    at: &str,
) -> EngineResult<()> {
    staff.assigned_tables = normalize_tables(tables)?;
    staff.updated_at = at.to_string();
    conn.execute(
        "UPDATE staff SET assigned_tables = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            serde_json::to_string(&staff.assigned_tables)?,
            staff.updated_at,
            staff.id
        ],
    )?;
    Ok(())
}

/// Flip `active`. Deactivated staff are kept but never chosen for calls.
pub fn toggle_staff_active(db: &DbState, staff_id: &str) -> EngineResult<Staff> {
    let conn = db.lock();
    let mut staff = load_staff(&conn, staff_id)?;
    staff.active = !staff.active;
    staff.updated_at = now_ts();
    conn.execute(
        "UPDATE staff SET active = ?1, updated_at = ?2 WHERE id = ?3",
        params![staff.active, staff.updated_at, staff_id],
    )?;
    info!(staff_id = %staff_id, active = staff.active, "Staff active toggled");
    Ok(staff)
}

pub fn remove_staff(db: &DbState, staff_id: &str) -> EngineResult<()> {
    let conn = db.lock();
    let removed = conn.execute("DELETE FROM staff WHERE id = ?1", params![staff_id])?;
    if removed == 0 {
        return Err(EngineError::not_found("staff", staff_id));
    }
    info!(staff_id = %staff_id, "Staff removed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Explicit sign-out from the staff portal.
pub fn set_staff_offline(db: &DbState, staff_id: &str) -> EngineResult<()> {
    let conn = db.lock();
    let changed = conn.execute(
        "UPDATE staff SET is_online = 0, updated_at = ?1 WHERE id = ?2",
        params![now_ts(), staff_id],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("staff", staff_id));
    }
    info!(staff_id = %staff_id, "Staff signed out");
    Ok(())
}

/// Heartbeat from an open staff portal: marks the member online.
pub fn update_staff_last_seen(db: &DbState, staff_id: &str) -> EngineResult<()> {
    update_staff_last_seen_at(db, staff_id, Utc::now())
}

pub(crate) fn update_staff_last_seen_at(
    db: &DbState,
    staff_id: &str,
    at: DateTime<Utc>,
) -> EngineResult<()> {
    let conn = db.lock();
    let at = ts(at);
    let changed = conn.execute(
        "UPDATE staff SET is_online = 1, last_seen = ?1, updated_at = ?1 WHERE id = ?2",
        params![at, staff_id],
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("staff", staff_id));
    }
    debug!(staff_id = %staff_id, "Staff heartbeat");
    Ok(())
}

/// Flip online staff whose last heartbeat is older than `ttl_secs` to offline.
/// Returns the number of members flipped.
pub fn expire_stale_presence(db: &DbState, ttl_secs: i64, now: DateTime<Utc>) -> EngineResult<usize> {
    let cutoff = ts(now - Duration::seconds(ttl_secs));
    let conn = db.lock();
    let flipped = conn.execute(
        "UPDATE staff SET is_online = 0, updated_at = ?1
         WHERE is_online = 1 AND (last_seen IS NULL OR last_seen < ?2)",
        params![ts(now), cutoff],
    )?;
    if flipped > 0 {
        info!(flipped, ttl_secs, "Expired stale staff presence");
    }
    Ok(flipped)
}

// ===========================================================================
// Tests
// ===========================================================================
