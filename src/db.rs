use crate::entities::Circuit;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the database file and bring the schema up to date
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Current timestamp as stored in `created_at` / `updated_at` columns
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases answer "memory")
    let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Lookups: bloodlines and color tags
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bloodlines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS color_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, name)
        )",
        [],
    )?;

    // ==========================================================================
    // Pigeons (self-referential pedigree + legacy free-text ancestors)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pigeons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT,
            ring_number TEXT,
            personal_number TEXT,
            color TEXT,
            color_tag_id INTEGER REFERENCES color_tags(id) ON DELETE SET NULL,
            gender TEXT,
            hatch_date TEXT,
            status TEXT NOT NULL DEFAULT 'stock',
            bloodline TEXT,
            remarks TEXT,
            notes TEXT,
            photo_url TEXT,
            pedigree_images TEXT,
            for_sale INTEGER NOT NULL DEFAULT 0,
            sale_price REAL,
            hide_price INTEGER NOT NULL DEFAULT 0,
            sale_description TEXT,
            sire_id INTEGER REFERENCES pigeons(id) ON DELETE SET NULL,
            dam_id INTEGER REFERENCES pigeons(id) ON DELETE SET NULL,
            sire_name TEXT,
            sire_ring_number TEXT,
            sire_color TEXT,
            sire_notes TEXT,
            dam_name TEXT,
            dam_ring_number TEXT,
            dam_color TEXT,
            dam_notes TEXT,
            pairing_id INTEGER REFERENCES pairings(id) ON DELETE SET NULL,
            clutch_id INTEGER REFERENCES clutches(id) ON DELETE SET NULL,
            import_hash TEXT UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pigeon_bloodline (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pigeon_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            bloodline_id INTEGER NOT NULL REFERENCES bloodlines(id) ON DELETE CASCADE,
            is_primary INTEGER NOT NULL DEFAULT 0,
            UNIQUE (pigeon_id, bloodline_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Breeding: pairings and clutches
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pairings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            sire_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            dam_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            pair_name TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            current_clutch_number INTEGER NOT NULL DEFAULT 1,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clutches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pairing_id INTEGER NOT NULL REFERENCES pairings(id) ON DELETE CASCADE,
            clutch_number INTEGER NOT NULL,
            eggs_laid_date TEXT,
            hatched_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT,
            is_fostered INTEGER NOT NULL DEFAULT 0,
            biological_pairing_id INTEGER REFERENCES pairings(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Race circuits (clubs and one-loft races share one layout)
    // ==========================================================================
    for circuit in Circuit::ALL {
        conn.execute_batch(&circuit_schema(*circuit))?;
    }

    // ==========================================================================
    // Marketplace
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            pigeon_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            price REAL,
            hide_price INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            additional_photos TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            sold_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_pigeons_user ON pigeons(user_id);
         CREATE INDEX IF NOT EXISTS idx_pigeons_sire ON pigeons(sire_id);
         CREATE INDEX IF NOT EXISTS idx_pigeons_dam ON pigeons(dam_id);
         CREATE INDEX IF NOT EXISTS idx_pigeons_clutch ON pigeons(clutch_id);
         CREATE INDEX IF NOT EXISTS idx_pairings_user_status ON pairings(user_id, status);
         CREATE INDEX IF NOT EXISTS idx_pairings_parents ON pairings(sire_id, dam_id);
         CREATE INDEX IF NOT EXISTS idx_sales_status ON sales(status);",
    )?;

    Ok(())
}

/// DDL for one circuit's organization → season → race hierarchy
fn circuit_schema(circuit: Circuit) -> String {
    let t = circuit.tables();
    format!(
        "CREATE TABLE IF NOT EXISTS {org} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            organizer TEXT,
            location TEXT,
            country TEXT,
            website TEXT,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {season} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id INTEGER NOT NULL REFERENCES {org}(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            start_date TEXT,
            end_date TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {entry} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES {season}(id) ON DELETE CASCADE,
            pigeon_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            entry_number TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (season_id, pigeon_id)
        );
        CREATE TABLE IF NOT EXISTS {race} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season_id INTEGER NOT NULL REFERENCES {season}(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            release_point TEXT,
            distance REAL,
            distance_unit TEXT NOT NULL DEFAULT 'km',
            race_date TEXT,
            release_time TEXT,
            weather_conditions TEXT,
            wind_direction TEXT,
            notes TEXT,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {result} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            race_id INTEGER NOT NULL REFERENCES {race}(id) ON DELETE CASCADE,
            pigeon_id INTEGER NOT NULL REFERENCES pigeons(id) ON DELETE CASCADE,
            position INTEGER,
            arrival_time TEXT,
            speed REAL,
            notes TEXT,
            did_not_arrive INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (race_id, pigeon_id)
        );",
        org = t.organizations,
        season = t.seasons,
        entry = t.entries,
        race = t.races,
        result = t.results,
    )
}

/// Decode a JSON list column (`NULL` → empty)
pub(crate) fn json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Encode a list for a JSON column (empty → `NULL`)
pub(crate) fn to_json_list(values: &[String]) -> Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(values)?))
    }
}

/// True when the error is a UNIQUE / FK constraint failure
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_setup_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "users",
            "pigeons",
            "pigeon_bloodline",
            "bloodlines",
            "color_tags",
            "pairings",
            "clutches",
            "clubs",
            "club_seasons",
            "club_season_entries",
            "club_season_races",
            "club_race_results",
            "olr_races",
            "olr_seasons",
            "olr_season_entries",
            "olr_season_races",
            "olr_race_results",
            "sales",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_json_list_helpers() {
        assert!(json_list(None).is_empty());
        assert!(to_json_list(&[]).unwrap().is_none());

        let encoded = to_json_list(&["https://a/1.webp".to_string()]).unwrap();
        assert_eq!(json_list(encoded), vec!["https://a/1.webp".to_string()]);
    }
}
