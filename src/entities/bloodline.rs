// 🧬 Bloodline - named strain a pigeon descends from
//
// Names are stored uppercase and unique per owner, so "janssen", "Janssen"
// and "JANSSEN" are the same bloodline.
// A pigeon may carry several bloodlines; at most one is flagged primary and
// its name is mirrored into the legacy `pigeons.bloodline` column.

use crate::db::now;
use crate::error::{LoftError, Result};
use crate::validation::{clean, Validator, MAX_STRING};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Rows returned by a search
pub const SEARCH_LIMIT: i64 = 20;

const DUPLICATE_NAME: &str = "You already have a bloodline with this name.";

#[derive(Debug, Clone, Serialize)]
pub struct Bloodline {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Bloodline as attached to one pigeon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BloodlineLink {
    pub id: i64,
    pub name: String,
    pub is_primary: bool,
}

/// One submitted bloodline: an existing id or a name to get-or-create
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BloodlineChoice {
    pub id: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl BloodlineChoice {
    pub fn existing(id: i64, is_primary: bool) -> Self {
        BloodlineChoice {
            id: Some(id),
            name: None,
            is_primary,
        }
    }

    pub fn named(name: &str, is_primary: bool) -> Self {
        BloodlineChoice {
            id: None,
            name: Some(name.to_string()),
            is_primary,
        }
    }
}

fn row_to_bloodline(row: &rusqlite::Row) -> rusqlite::Result<Bloodline> {
    Ok(Bloodline {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn list(conn: &Connection, owner: i64) -> Result<Vec<Bloodline>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, created_at FROM bloodlines
         WHERE user_id = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![owner], row_to_bloodline)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Substring search on name (case-insensitive); empty query lists everything
pub fn search(conn: &Connection, owner: i64, q: &str) -> Result<Vec<Bloodline>> {
    let pattern = format!("%{}%", q.trim().to_uppercase());
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, created_at FROM bloodlines
         WHERE user_id = ?1 AND UPPER(name) LIKE ?2
         ORDER BY name LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![owner, pattern, SEARCH_LIMIT], row_to_bloodline)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, owner: i64, id: i64) -> Result<Bloodline> {
    let bloodline = conn
        .query_row(
            "SELECT id, user_id, name, created_at FROM bloodlines WHERE id = ?1",
            params![id],
            row_to_bloodline,
        )
        .optional()?
        .ok_or(LoftError::NotFound("bloodline"))?;
    super::ensure_owner(bloodline.user_id, owner)?;
    Ok(bloodline)
}

fn find_by_name(
    conn: &Connection,
    owner: i64,
    name: &str,
    ignore: Option<i64>,
) -> Result<Option<Bloodline>> {
    let found = conn
        .query_row(
            "SELECT id, user_id, name, created_at FROM bloodlines
             WHERE user_id = ?1 AND UPPER(name) = ?2 AND id != ?3",
            params![owner, name.to_uppercase(), ignore.unwrap_or(0)],
            row_to_bloodline,
        )
        .optional()?;
    Ok(found)
}

fn validated_name(conn: &Connection, owner: i64, name: Option<&str>, ignore: Option<i64>) -> Result<String> {
    let mut v = Validator::new();
    let name = v.required("name", name, MAX_STRING).to_uppercase();
    if !v.has_error("name") && find_by_name(conn, owner, &name, ignore)?.is_some() {
        v.error("name", DUPLICATE_NAME);
    }
    v.finish()?;
    Ok(name)
}

pub fn create(conn: &Connection, owner: i64, name: Option<&str>) -> Result<Bloodline> {
    let name = validated_name(conn, owner, name, None)?;
    let created_at = now();
    conn.execute(
        "INSERT INTO bloodlines (user_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![owner, name, created_at],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(bloodline_id = id, name = %name, "bloodline created");
    Ok(Bloodline {
        id,
        user_id: owner,
        name,
        created_at,
    })
}

pub fn update(conn: &Connection, owner: i64, id: i64, name: Option<&str>) -> Result<Bloodline> {
    let mut bloodline = get(conn, owner, id)?;
    let name = validated_name(conn, owner, name, Some(id))?;
    conn.execute(
        "UPDATE bloodlines SET name = ?1 WHERE id = ?2",
        params![name, id],
    )?;
    bloodline.name = name;
    Ok(bloodline)
}

/// Number of pigeons carrying the bloodline
pub fn pigeon_count(conn: &Connection, id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM pigeon_bloodline WHERE bloodline_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Refused while any pigeon still carries the bloodline
pub fn delete(conn: &Connection, owner: i64, id: i64) -> Result<()> {
    get(conn, owner, id)?;
    let count = pigeon_count(conn, id)?;
    if count > 0 {
        return Err(LoftError::Conflict(format!(
            "Cannot delete bloodline. It is assigned to {} pigeon(s).",
            count
        )));
    }
    conn.execute("DELETE FROM bloodlines WHERE id = ?1", params![id])?;
    tracing::info!(bloodline_id = id, "bloodline deleted");
    Ok(())
}

/// Returns the bloodline and whether it was created by this call
pub fn get_or_create(conn: &Connection, owner: i64, name: Option<&str>) -> Result<(Bloodline, bool)> {
    let mut v = Validator::new();
    let name = v.required("name", name, MAX_STRING).to_uppercase();
    v.finish()?;

    match find_by_name(conn, owner, &name, None)? {
        Some(existing) => Ok((existing, false)),
        None => Ok((create(conn, owner, Some(&name))?, true)),
    }
}

// ============================================================================
// PIGEON LINKS
// ============================================================================

pub fn links_for_pigeon(conn: &Connection, pigeon_id: i64) -> Result<Vec<BloodlineLink>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.name, pb.is_primary
         FROM pigeon_bloodline pb JOIN bloodlines b ON b.id = pb.bloodline_id
         WHERE pb.pigeon_id = ?1
         ORDER BY pb.is_primary DESC, b.name",
    )?;
    let links = stmt
        .query_map(params![pigeon_id], |row| {
            Ok(BloodlineLink {
                id: row.get(0)?,
                name: row.get(1)?,
                is_primary: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(links)
}

/// Field checks for submitted choices (no writes)
pub(crate) fn validate_choices(
    conn: &Connection,
    owner: i64,
    choices: &[BloodlineChoice],
    v: &mut Validator,
) -> Result<()> {
    for (i, choice) in choices.iter().enumerate() {
        let field = format!("bloodlines.{}", i);
        match (choice.id, clean(choice.name.as_deref())) {
            (Some(id), _) => {
                let owned: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM bloodlines WHERE id = ?1 AND user_id = ?2)",
                    params![id, owner],
                    |row| row.get(0),
                )?;
                if !owned {
                    v.error(&field, "The selected bloodline is invalid.");
                }
            }
            (None, Some(name)) => {
                v.optional(&field, Some(name), Some(MAX_STRING));
            }
            (None, None) => {}
        }
    }
    Ok(())
}

/// Replace the pigeon's bloodline links and return the primary name.
///
/// Named choices are get-or-created. Choices with neither id nor name are
/// skipped. When several are flagged primary the first one is kept.
pub(crate) fn sync_pigeon(
    conn: &Connection,
    owner: i64,
    pigeon_id: i64,
    choices: &[BloodlineChoice],
) -> Result<Option<String>> {
    let mut resolved: Vec<(i64, String, bool)> = Vec::new();
    for choice in choices {
        let bloodline = match (choice.id, clean(choice.name.as_deref())) {
            (Some(id), _) => get(conn, owner, id)?,
            (None, Some(name)) => get_or_create(conn, owner, Some(name))?.0,
            (None, None) => continue,
        };
        if let Some(existing) = resolved.iter_mut().find(|(id, _, _)| *id == bloodline.id) {
            existing.2 |= choice.is_primary;
            continue;
        }
        resolved.push((bloodline.id, bloodline.name, choice.is_primary));
    }

    let mut primary_name = None;
    for (_, name, is_primary) in resolved.iter_mut() {
        if *is_primary {
            if primary_name.is_none() {
                primary_name = Some(name.clone());
            } else {
                *is_primary = false;
            }
        }
    }

    conn.execute(
        "DELETE FROM pigeon_bloodline WHERE pigeon_id = ?1",
        params![pigeon_id],
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO pigeon_bloodline (pigeon_id, bloodline_id, is_primary) VALUES (?1, ?2, ?3)",
    )?;
    for (bloodline_id, _, is_primary) in &resolved {
        insert.execute(params![pigeon_id, bloodline_id, is_primary])?;
    }

    conn.execute(
        "UPDATE pigeons SET bloodline = ?1 WHERE id = ?2",
        params![primary_name, pigeon_id],
    )?;
    Ok(primary_name)
}
