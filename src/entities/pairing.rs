// 💞 Pairing + Clutch - breeding sessions and their egg batches
//
// Lifecycle:
//   create      → status active, both parents set to `breeding`
//   end session → status inactive, ended_at set, parents back to `stock`
//   delete      → parents back to `stock` when the pairing was still active
//
// The "not already paired" check and the insert are two statements. Within
// one server the connection mutex serializes them; two processes sharing the
// database file can still both pass the check.

use super::pigeon::{self, row_to_summary, PigeonStatus, PigeonSummary, SUMMARY_COLUMNS};
use super::{ensure_owner, Gender, Page};
use crate::db::now;
use crate::error::{LoftError, Result};
use crate::validation::{Validator, MAX_STRING};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Longest clutch note accepted
pub const MAX_CLUTCH_NOTES: usize = 1000;

const ALREADY_PAIRED: &str = "One or both pigeons are already in an active pairing.";

string_enum! {
    PairingStatus {
        Active => "active",
        Inactive => "inactive",
    }
    default Active
}

string_enum! {
    /// Outcome of an egg batch
    ClutchStatus {
        Pending => "pending",
        Successful => "successful",
        Unsuccessful => "unsuccessful",
    }
    default Pending
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Pairing {
    pub id: i64,
    pub user_id: i64,
    pub sire_id: i64,
    pub dam_id: i64,
    pub pair_name: Option<String>,
    pub status: PairingStatus,
    pub current_clutch_number: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Pairing {
    pub fn is_active(&self) -> bool {
        self.status == PairingStatus::Active
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Clutch {
    pub id: i64,
    pub pairing_id: i64,
    pub clutch_number: i64,
    pub eggs_laid_date: Option<NaiveDate>,
    pub hatched_date: Option<NaiveDate>,
    pub status: ClutchStatus,
    pub notes: Option<String>,
    pub is_fostered: bool,
    pub biological_pairing_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Row of the pairing listing
#[derive(Debug, Clone, Serialize)]
pub struct PairingSummary {
    #[serde(flatten)]
    pub pairing: Pairing,
    pub sire: Option<PigeonSummary>,
    pub dam: Option<PigeonSummary>,
    pub offspring_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairingDetail {
    #[serde(flatten)]
    pub pairing: Pairing,
    pub sire: Option<PigeonSummary>,
    pub dam: Option<PigeonSummary>,
    pub clutches: Vec<Clutch>,
    pub offspring: Vec<PigeonSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableParents {
    pub sires: Vec<PigeonSummary>,
    pub dams: Vec<PigeonSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairingInput {
    pub sire_id: Option<i64>,
    pub dam_id: Option<i64>,
    pub pair_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairingFilter {
    pub status: Option<String>,
    pub pair_name: Option<String>,
    /// Sire or dam name / ring number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClutchInput {
    pub eggs_laid_date: Option<String>,
    pub hatched_date: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub is_fostered: Option<bool>,
    pub biological_pairing_id: Option<i64>,
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const PAIRING_COLUMNS: &str = "pr.id, pr.user_id, pr.sire_id, pr.dam_id, pr.pair_name, pr.status, \
     pr.current_clutch_number, pr.started_at, pr.ended_at, pr.created_at";

const CLUTCH_COLUMNS: &str = "id, pairing_id, clutch_number, eggs_laid_date, hatched_date, status, \
     notes, is_fostered, biological_pairing_id, created_at";

fn row_to_pairing(row: &rusqlite::Row) -> rusqlite::Result<Pairing> {
    Ok(Pairing {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sire_id: row.get(2)?,
        dam_id: row.get(3)?,
        pair_name: row.get(4)?,
        status: row.get(5)?,
        current_clutch_number: row.get(6)?,
        started_at: row.get(7)?,
        ended_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_clutch(row: &rusqlite::Row) -> rusqlite::Result<Clutch> {
    Ok(Clutch {
        id: row.get(0)?,
        pairing_id: row.get(1)?,
        clutch_number: row.get(2)?,
        eggs_laid_date: row.get(3)?,
        hatched_date: row.get(4)?,
        status: row.get(5)?,
        notes: row.get(6)?,
        is_fostered: row.get(7)?,
        biological_pairing_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

// ============================================================================
// PAIRING QUERIES
// ============================================================================

/// Owned pairing (403 when it belongs to someone else)
pub fn get(conn: &Connection, owner: i64, id: i64) -> Result<Pairing> {
    let sql = format!("SELECT {} FROM pairings pr WHERE pr.id = ?1", PAIRING_COLUMNS);
    let pairing = conn
        .query_row(&sql, params![id], row_to_pairing)
        .optional()?
        .ok_or(LoftError::NotFound("pairing"))?;
    ensure_owner(pairing.user_id, owner)?;
    Ok(pairing)
}

fn offspring(conn: &Connection, column: &str, id: i64) -> Result<Vec<PigeonSummary>> {
    let sql = format!(
        "SELECT {} FROM pigeons p WHERE p.{} = ?1 ORDER BY p.hatch_date, p.id",
        SUMMARY_COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![id], row_to_summary)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn offspring_count(conn: &Connection, column: &str, id: i64) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM pigeons WHERE {} = ?1", column);
    Ok(conn.query_row(&sql, params![id], |row| row.get(0))?)
}

pub fn list(conn: &Connection, owner: i64, filter: &PairingFilter) -> Result<Page<PairingSummary>> {
    let mut clauses = vec!["pr.user_id = ?".to_string()];
    let mut values: Vec<Value> = vec![Value::Integer(owner)];

    if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("pr.status = ?".to_string());
        values.push(Value::Text(status.to_lowercase()));
    }
    if let Some(name) = filter.pair_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("pr.pair_name LIKE ?".to_string());
        values.push(Value::Text(format!("%{}%", name)));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(
            "EXISTS (SELECT 1 FROM pigeons p WHERE p.id IN (pr.sire_id, pr.dam_id) \
             AND (p.name LIKE ? OR p.ring_number LIKE ?))"
                .to_string(),
        );
        let pattern = format!("%{}%", search);
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    let where_sql = clauses.join(" AND ");
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM pairings pr WHERE {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let sql = format!(
        "SELECT {} FROM pairings pr WHERE {} ORDER BY pr.created_at DESC, pr.id DESC LIMIT {} OFFSET {}",
        PAIRING_COLUMNS,
        where_sql,
        per_page,
        Page::<PairingSummary>::offset(page, per_page)
    );
    let mut stmt = conn.prepare(&sql)?;
    let pairings = stmt
        .query_map(params_from_iter(values.iter()), row_to_pairing)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut data = Vec::with_capacity(pairings.len());
    for pairing in pairings {
        data.push(PairingSummary {
            sire: pigeon::summary(conn, pairing.sire_id)?,
            dam: pigeon::summary(conn, pairing.dam_id)?,
            offspring_count: offspring_count(conn, "pairing_id", pairing.id)?,
            pairing,
        });
    }
    Ok(Page::new(data, total, page, per_page))
}

pub fn detail(conn: &Connection, owner: i64, id: i64) -> Result<PairingDetail> {
    let pairing = get(conn, owner, id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM clutches WHERE pairing_id = ?1 ORDER BY clutch_number",
        CLUTCH_COLUMNS
    ))?;
    let clutches = stmt
        .query_map(params![id], row_to_clutch)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(PairingDetail {
        sire: pigeon::summary(conn, pairing.sire_id)?,
        dam: pigeon::summary(conn, pairing.dam_id)?,
        offspring: offspring(conn, "pairing_id", id)?,
        clutches,
        pairing,
    })
}

/// True when the pigeon is a parent in any active pairing (other than `ignore`)
pub fn in_active_pairing(conn: &Connection, pigeon_id: i64, ignore: Option<i64>) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pairings
         WHERE status = 'active' AND (sire_id = ?1 OR dam_id = ?1) AND id != ?2)",
        params![pigeon_id, ignore.unwrap_or(0)],
        |row| row.get(0),
    )?)
}

fn available(conn: &Connection, owner: i64, gender: Gender, editing: Option<&Pairing>) -> Result<Vec<PigeonSummary>> {
    let current = editing.map(|p| match gender {
        Gender::Male => p.sire_id,
        Gender::Female => p.dam_id,
    });
    let sql = format!(
        "SELECT {} FROM pigeons p
         WHERE p.user_id = ?1 AND p.gender = ?2
           AND p.status NOT IN ('deceased', 'missing', 'flyaway')
           AND (p.id = ?3 OR NOT EXISTS (
                SELECT 1 FROM pairings pr
                WHERE pr.status = 'active' AND (pr.sire_id = p.id OR pr.dam_id = p.id)))
         ORDER BY p.name, p.ring_number",
        SUMMARY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner, gender, current.unwrap_or(0)], row_to_summary)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Pigeons that can be paired; when editing, the pairing's own parents stay listed
pub fn available_parents(conn: &Connection, owner: i64, editing: Option<i64>) -> Result<AvailableParents> {
    let pairing = match editing {
        Some(id) => Some(get(conn, owner, id)?),
        None => None,
    };
    Ok(AvailableParents {
        sires: available(conn, owner, Gender::Male, pairing.as_ref())?,
        dams: available(conn, owner, Gender::Female, pairing.as_ref())?,
    })
}

// ============================================================================
// PAIRING WRITES
// ============================================================================

fn owned_parent(conn: &Connection, owner: i64, id: i64, gender: Gender) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pigeons WHERE id = ?1 AND user_id = ?2 AND gender = ?3)",
        params![id, owner, gender],
        |row| row.get(0),
    )?)
}

pub fn create(conn: &Connection, owner: i64, input: &PairingInput) -> Result<Pairing> {
    let mut v = Validator::new();
    let pair_name = v.optional("pair_name", input.pair_name.as_deref(), Some(MAX_STRING));

    for (field, id, gender) in [
        ("sire_id", input.sire_id, Gender::Male),
        ("dam_id", input.dam_id, Gender::Female),
    ] {
        match id {
            None => v.error(field, format!("The {} field is required.", field.replace('_', " "))),
            Some(id) if !owned_parent(conn, owner, id, gender)? => {
                v.error(field, format!("The selected {} is invalid.", field.replace('_', " ")))
            }
            Some(_) => {}
        }
    }
    v.finish()?;

    // Both present once validation passed
    let (sire_id, dam_id) = match (input.sire_id, input.dam_id) {
        (Some(s), Some(d)) => (s, d),
        _ => return Err(LoftError::Internal("parents missing after validation".into())),
    };

    if in_active_pairing(conn, sire_id, None)? || in_active_pairing(conn, dam_id, None)? {
        return Err(LoftError::validation("sire_id", ALREADY_PAIRED));
    }

    let previous: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pairings WHERE user_id = ?1 AND sire_id = ?2 AND dam_id = ?3",
        params![owner, sire_id, dam_id],
        |row| row.get(0),
    )?;
    let clutch_number = previous + 1;
    let pair_name = pair_name.unwrap_or_else(|| format!("Pair #{}", clutch_number));
    let timestamp = now();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO pairings (user_id, sire_id, dam_id, pair_name, status,
                               current_clutch_number, started_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            owner,
            sire_id,
            dam_id,
            pair_name,
            PairingStatus::Active,
            clutch_number,
            timestamp
        ],
    )?;
    let id = tx.last_insert_rowid();
    pigeon::set_status(&tx, &[sire_id, dam_id], PigeonStatus::Breeding)?;
    tx.commit()?;

    tracing::info!(pairing_id = id, sire_id, dam_id, "pairing started");
    get(conn, owner, id)
}

/// Rename and/or change status; status transitions move the parents like
/// ending or starting a session would
pub fn update(conn: &Connection, owner: i64, id: i64, input: &PairingInput) -> Result<Pairing> {
    let pairing = get(conn, owner, id)?;

    let mut v = Validator::new();
    let pair_name = v.optional("pair_name", input.pair_name.as_deref(), Some(MAX_STRING));
    let status = v.required_choice::<PairingStatus>("status", input.status.as_deref());
    v.finish()?;

    let parents = [pairing.sire_id, pairing.dam_id];
    let tx = conn.unchecked_transaction()?;
    match (pairing.status, status) {
        (PairingStatus::Active, PairingStatus::Inactive) => {
            tx.execute(
                "UPDATE pairings SET ended_at = ?1 WHERE id = ?2",
                params![now(), id],
            )?;
            pigeon::set_status(&tx, &parents, PigeonStatus::Stock)?;
        }
        (PairingStatus::Inactive, PairingStatus::Active) => {
            if in_active_pairing(&tx, pairing.sire_id, Some(id))?
                || in_active_pairing(&tx, pairing.dam_id, Some(id))?
            {
                return Err(LoftError::validation("status", ALREADY_PAIRED));
            }
            tx.execute("UPDATE pairings SET ended_at = NULL WHERE id = ?1", params![id])?;
            pigeon::set_status(&tx, &parents, PigeonStatus::Breeding)?;
        }
        _ => {}
    }
    tx.execute(
        "UPDATE pairings SET pair_name = ?1, status = ?2 WHERE id = ?3",
        params![pair_name, status, id],
    )?;
    tx.commit()?;

    get(conn, owner, id)
}

pub fn delete(conn: &Connection, owner: i64, id: i64) -> Result<()> {
    let pairing = get(conn, owner, id)?;
    let tx = conn.unchecked_transaction()?;
    if pairing.is_active() {
        pigeon::set_status(&tx, &[pairing.sire_id, pairing.dam_id], PigeonStatus::Stock)?;
    }
    tx.execute("DELETE FROM pairings WHERE id = ?1", params![id])?;
    tx.commit()?;
    tracing::info!(pairing_id = id, "pairing deleted");
    Ok(())
}

pub fn end_session(conn: &Connection, owner: i64, id: i64) -> Result<Pairing> {
    let pairing = get(conn, owner, id)?;
    if !pairing.is_active() {
        return Err(LoftError::validation("status", "This pairing is already inactive."));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE pairings SET status = ?1, ended_at = ?2 WHERE id = ?3",
        params![PairingStatus::Inactive, now(), id],
    )?;
    pigeon::set_status(&tx, &[pairing.sire_id, pairing.dam_id], PigeonStatus::Stock)?;
    tx.commit()?;

    tracing::info!(pairing_id = id, "pairing session ended");
    get(conn, owner, id)
}

// ============================================================================
// CLUTCHES
// ============================================================================

/// Clutch that hangs under the given (owned) pairing
pub fn get_clutch(conn: &Connection, owner: i64, pairing_id: i64, clutch_id: i64) -> Result<Clutch> {
    get(conn, owner, pairing_id)?;
    conn.query_row(
        &format!("SELECT {} FROM clutches WHERE id = ?1 AND pairing_id = ?2", CLUTCH_COLUMNS),
        params![clutch_id, pairing_id],
        row_to_clutch,
    )
    .optional()?
    .ok_or(LoftError::NotFound("clutch"))
}

fn validate_clutch_dates(v: &mut Validator, input: &ClutchInput) -> (Option<NaiveDate>, Option<NaiveDate>, Option<String>) {
    let laid = v.date("eggs_laid_date", input.eggs_laid_date.as_deref());
    let hatched = v.date("hatched_date", input.hatched_date.as_deref());
    v.not_before("hatched_date", hatched, "eggs_laid_date", laid);
    let notes = v.optional("notes", input.notes.as_deref(), Some(MAX_CLUTCH_NOTES));
    (laid, hatched, notes)
}

pub fn create_clutch(conn: &Connection, owner: i64, pairing_id: i64, input: &ClutchInput) -> Result<Clutch> {
    get(conn, owner, pairing_id)?;

    let mut v = Validator::new();
    let (laid, hatched, notes) = validate_clutch_dates(&mut v, input);
    v.finish()?;

    let max: Option<i64> = conn.query_row(
        "SELECT MAX(clutch_number) FROM clutches WHERE pairing_id = ?1",
        params![pairing_id],
        |row| row.get(0),
    )?;
    let number = max.unwrap_or(0) + 1;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO clutches (pairing_id, clutch_number, eggs_laid_date, hatched_date, status, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![pairing_id, number, laid, hatched, ClutchStatus::Pending, notes, now()],
    )?;
    let clutch_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE pairings SET current_clutch_number = ?1 WHERE id = ?2",
        params![number, pairing_id],
    )?;
    tx.commit()?;

    tracing::debug!(pairing_id, clutch_id, clutch_number = number, "clutch added");
    get_clutch(conn, owner, pairing_id, clutch_id)
}

pub fn update_clutch(
    conn: &Connection,
    owner: i64,
    pairing_id: i64,
    clutch_id: i64,
    input: &ClutchInput,
) -> Result<Clutch> {
    get_clutch(conn, owner, pairing_id, clutch_id)?;

    let mut v = Validator::new();
    let (laid, hatched, notes) = validate_clutch_dates(&mut v, input);
    let status = v.required_choice::<ClutchStatus>("status", input.status.as_deref());
    let is_fostered = input.is_fostered.unwrap_or(false);
    if let Some(bio) = input.biological_pairing_id {
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pairings WHERE id = ?1 AND user_id = ?2)",
            params![bio, owner],
            |row| row.get(0),
        )?;
        if !owned {
            v.error("biological_pairing_id", "The selected biological pairing id is invalid.");
        }
    }
    v.finish()?;

    conn.execute(
        "UPDATE clutches SET eggs_laid_date = ?1, hatched_date = ?2, status = ?3, notes = ?4,
                             is_fostered = ?5, biological_pairing_id = ?6
         WHERE id = ?7",
        params![
            laid,
            hatched,
            status,
            notes,
            is_fostered,
            input.biological_pairing_id.filter(|_| is_fostered),
            clutch_id
        ],
    )?;
    get_clutch(conn, owner, pairing_id, clutch_id)
}

/// Refused while any pigeon records this clutch as its origin
pub fn delete_clutch(conn: &Connection, owner: i64, pairing_id: i64, clutch_id: i64) -> Result<()> {
    get_clutch(conn, owner, pairing_id, clutch_id)?;
    if offspring_count(conn, "clutch_id", clutch_id)? > 0 {
        return Err(LoftError::Conflict(
            "Cannot delete clutch with offspring records.".to_string(),
        ));
    }
    conn.execute("DELETE FROM clutches WHERE id = ?1", params![clutch_id])?;
    Ok(())
}
