// 👤 User - owner of every record in the ledger
// Identity comes from upstream; this table only maps ids to names/emails

use crate::db::now;
use crate::error::{LoftError, Result};
use crate::validation::{Validator, MAX_STRING};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

pub fn create_user(conn: &Connection, name: &str, email: &str) -> Result<User> {
    let mut v = Validator::new();
    let name = v.required("name", Some(name), MAX_STRING);
    let email = v.required("email", Some(email), MAX_STRING).to_lowercase();
    if !email.is_empty() && !email.contains('@') {
        v.error("email", "The email field must be a valid email address.");
    }
    v.finish()?;

    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )?;
    if taken {
        return Err(LoftError::validation(
            "email",
            "The email has already been taken.",
        ));
    }

    let created_at = now();
    conn.execute(
        "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
        params![name, email, created_at],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(user_id = id, "user created");

    Ok(User {
        id,
        name,
        email,
        created_at,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    #[test]
    fn test_create_and_get_user() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let user = create_user(&conn, "Ana", "Ana@Example.com").unwrap();
        assert_eq!(user.email, "ana@example.com");

        let loaded = get_user(&conn, user.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Ana");
        assert!(get_user(&conn, user.id + 1).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        create_user(&conn, "Ana", "ana@example.com").unwrap();
        let err = create_user(&conn, "Ana 2", "ana@example.com").unwrap_err();
        assert!(matches!(err, LoftError::Validation(e) if e.contains("email")));
    }
}
