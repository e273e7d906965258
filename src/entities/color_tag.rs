// 🎨 Color Tag - user-defined colored label for pigeons

use crate::db::now;
use crate::error::{LoftError, Result};
use crate::validation::{Validator, MAX_STRING};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ColorTag {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColorTagInput {
    pub name: Option<String>,
    pub color: Option<String>,
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<ColorTag> {
    Ok(ColorTag {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn list(conn: &Connection, owner: i64) -> Result<Vec<ColorTag>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, color, created_at FROM color_tags
         WHERE user_id = ?1 ORDER BY name",
    )?;
    let tags = stmt
        .query_map(params![owner], row_to_tag)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

pub fn get(conn: &Connection, owner: i64, id: i64) -> Result<ColorTag> {
    let tag = conn
        .query_row(
            "SELECT id, user_id, name, color, created_at FROM color_tags WHERE id = ?1",
            params![id],
            row_to_tag,
        )
        .optional()?
        .ok_or(LoftError::NotFound("color tag"))?;
    super::ensure_owner(tag.user_id, owner)?;
    Ok(tag)
}

fn validate(
    conn: &Connection,
    owner: i64,
    input: &ColorTagInput,
    ignore: Option<i64>,
) -> Result<(String, String)> {
    let mut v = Validator::new();
    let name = v.required("name", input.name.as_deref(), MAX_STRING);
    let color = v.hex_color("color", input.color.as_deref());

    if !v.has_error("name") {
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM color_tags WHERE user_id = ?1 AND name = ?2 AND id != ?3)",
            params![owner, name, ignore.unwrap_or(0)],
            |row| row.get(0),
        )?;
        if taken {
            v.error("name", "You already have a color tag with this name.");
        }
    }
    v.finish()?;
    Ok((name, color))
}

pub fn create(conn: &Connection, owner: i64, input: &ColorTagInput) -> Result<ColorTag> {
    let (name, color) = validate(conn, owner, input, None)?;
    let created_at = now();
    conn.execute(
        "INSERT INTO color_tags (user_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![owner, name, color, created_at],
    )?;
    Ok(ColorTag {
        id: conn.last_insert_rowid(),
        user_id: owner,
        name,
        color,
        created_at,
    })
}

pub fn update(conn: &Connection, owner: i64, id: i64, input: &ColorTagInput) -> Result<ColorTag> {
    let mut tag = get(conn, owner, id)?;
    let (name, color) = validate(conn, owner, input, Some(id))?;
    conn.execute(
        "UPDATE color_tags SET name = ?1, color = ?2 WHERE id = ?3",
        params![name, color, id],
    )?;
    tag.name = name;
    tag.color = color;
    Ok(tag)
}

/// Deletes the tag and returns how many pigeons lost it
pub fn delete(conn: &Connection, owner: i64, id: i64) -> Result<i64> {
    get(conn, owner, id)?;
    let affected: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pigeons WHERE color_tag_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    conn.execute("DELETE FROM color_tags WHERE id = ?1", params![id])?;
    tracing::info!(color_tag_id = id, pigeons_affected = affected, "color tag deleted");
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_support::{add_pigeon, second_user, test_db};

    fn input(name: &str, color: &str) -> ColorTagInput {
        ColorTagInput {
            name: Some(name.to_string()),
            color: Some(color.to_string()),
        }
    }

    #[test]
    fn test_create_uppercases_color() {
        let (conn, owner) = test_db();
        let tag = create(&conn, owner, &input("Widowhood", "#ff5733")).unwrap();
        assert_eq!(tag.color, "#FF5733");
        assert_eq!(list(&conn, owner).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_color_and_duplicate_name() {
        let (conn, owner) = test_db();
        let err = create(&conn, owner, &input("Red", "red")).unwrap_err();
        match err {
            LoftError::Validation(e) => assert_eq!(
                e.get("color"),
                Some("Color must be a valid hex color (e.g., #FF5733).")
            ),
            other => panic!("unexpected error: {other}"),
        }

        create(&conn, owner, &input("Red", "#FF0000")).unwrap();
        let err = create(&conn, owner, &input("Red", "#EE0000")).unwrap_err();
        assert!(matches!(err, LoftError::Validation(e) if e.contains("name")));

        let other = second_user(&conn);
        assert!(create(&conn, other, &input("Red", "#FF0000")).is_ok());
    }

    #[test]
    fn test_update_keeps_own_name() {
        let (conn, owner) = test_db();
        let tag = create(&conn, owner, &input("Red", "#FF0000")).unwrap();
        let updated = update(&conn, owner, tag.id, &input("Red", "#00ff00")).unwrap();
        assert_eq!(updated.color, "#00FF00");
    }

    #[test]
    fn test_delete_clears_pigeons() {
        let (conn, owner) = test_db();
        let tag = create(&conn, owner, &input("Red", "#FF0000")).unwrap();
        let pigeon = add_pigeon(&conn, owner, "NL-2023-1", None);
        conn.execute(
            "UPDATE pigeons SET color_tag_id = ?1 WHERE id = ?2",
            params![tag.id, pigeon],
        )
        .unwrap();

        assert_eq!(delete(&conn, owner, tag.id).unwrap(), 1);
        let cleared: Option<i64> = conn
            .query_row("SELECT color_tag_id FROM pigeons WHERE id = ?1", [pigeon], |r| r.get(0))
            .unwrap();
        assert!(cleared.is_none());
    }

    #[test]
    fn test_foreign_tag_forbidden() {
        let (conn, owner) = test_db();
        let other = second_user(&conn);
        let tag = create(&conn, other, &input("Red", "#FF0000")).unwrap();
        assert!(matches!(
            update(&conn, owner, tag.id, &input("Blue", "#0000FF")),
            Err(LoftError::Forbidden)
        ));
    }
}
