// 🏁 Race Circuits - clubs and one-loft races (OLR)
//
// Both circuits share one layout, each in its own tables:
//
//   organization ─┬─ season ─┬─ entries  (pigeons enrolled for the season)
//                 │          └─ races ──── results (one per entered pigeon)
//                 └─ ...
//
// Every operation takes the `Circuit` it works on. The organization must
// belong to the caller (403 otherwise); seasons and races must hang under the
// organization in the path (404 otherwise).

use super::pigeon::{row_to_summary, row_to_summary_at, PigeonSummary, SUMMARY_COLUMNS};
use super::ensure_owner;
use crate::db::{is_constraint_violation, now};
use crate::error::{LoftError, Result};
use crate::validation::{Validator, MAX_STRING};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ============================================================================
// CIRCUIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Circuit {
    Club,
    Olr,
}

/// Table names of one circuit
#[derive(Debug, Clone, Copy)]
pub struct CircuitTables {
    pub organizations: &'static str,
    pub seasons: &'static str,
    pub entries: &'static str,
    pub races: &'static str,
    pub results: &'static str,
}

impl Circuit {
    pub const ALL: &'static [Circuit] = &[Circuit::Club, Circuit::Olr];

    pub fn tables(&self) -> CircuitTables {
        match self {
            Circuit::Club => CircuitTables {
                organizations: "clubs",
                seasons: "club_seasons",
                entries: "club_season_entries",
                races: "club_season_races",
                results: "club_race_results",
            },
            Circuit::Olr => CircuitTables {
                organizations: "olr_races",
                seasons: "olr_seasons",
                entries: "olr_season_entries",
                races: "olr_season_races",
                results: "olr_race_results",
            },
        }
    }

    /// Entity name used in "not found" errors
    pub fn organization_name(&self) -> &'static str {
        match self {
            Circuit::Club => "club",
            Circuit::Olr => "one-loft race",
        }
    }

    /// Path segment under `/api`
    pub fn route_prefix(&self) -> &'static str {
        match self {
            Circuit::Club => "clubs",
            Circuit::Olr => "olr-races",
        }
    }
}

string_enum! {
    OrganizationStatus {
        Active => "active",
        Inactive => "inactive",
    }
    default Active
}

string_enum! {
    SeasonStatus {
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
    default Active
}

string_enum! {
    DistanceUnit {
        Km => "km",
        Mi => "mi",
    }
    default Km
}

pub const MIN_YEAR: i64 = 2000;
pub const MAX_YEAR: i64 = 2100;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub id: i64,
    pub user_id: i64,
    pub circuit: Circuit,
    pub name: String,
    pub organizer: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub status: OrganizationStatus,
    pub created_at: DateTime<Utc>,
    pub seasons_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Season {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub year: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: SeasonStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonSummary {
    #[serde(flatten)]
    pub season: Season,
    pub entries_count: i64,
    pub races_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: Organization,
    pub seasons: Vec<SeasonSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonEntry {
    pub season_id: i64,
    pub pigeon_id: i64,
    pub entry_number: Option<String>,
    pub notes: Option<String>,
    pub pigeon: PigeonSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonRace {
    pub id: i64,
    pub season_id: i64,
    pub name: String,
    pub release_point: Option<String>,
    pub distance: Option<f64>,
    pub distance_unit: DistanceUnit,
    pub race_date: Option<NaiveDate>,
    pub release_time: Option<NaiveTime>,
    pub weather_conditions: Option<String>,
    pub wind_direction: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Results that arrived with a clocked time
    pub arrived_count: i64,
    /// Results recorded for the race
    pub total_entries: i64,
    pub display_name: String,
}

impl SeasonRace {
    /// `"<release point or name> <distance><unit> <arrived>/<total>"`
    pub fn compute_display_name(&self) -> String {
        let name = self.release_point.as_deref().unwrap_or(&self.name);
        let distance = match self.distance {
            Some(d) if d != 0.0 => format!("{:.2}{}", d, self.distance_unit),
            _ => String::new(),
        };
        let stats = format!("{}/{}", self.arrived_count, self.total_entries);
        [name, distance.as_str(), stats.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceResult {
    pub race_id: i64,
    pub pigeon_id: i64,
    pub position: Option<i64>,
    pub arrival_time: Option<NaiveTime>,
    pub speed: Option<f64>,
    pub notes: Option<String>,
    pub did_not_arrive: bool,
    pub pigeon: PigeonSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonDetail {
    #[serde(flatten)]
    pub season: Season,
    pub entries: Vec<SeasonEntry>,
    pub races: Vec<SeasonRace>,
    /// Owned racing pigeons not yet entered
    pub available_pigeons: Vec<PigeonSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceDetail {
    #[serde(flatten)]
    pub race: SeasonRace,
    pub results: Vec<RaceResult>,
    pub entries: Vec<SeasonEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationInput {
    pub name: Option<String>,
    pub organizer: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeasonInput {
    pub name: Option<String>,
    pub year: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryInput {
    pub pigeon_id: Option<i64>,
    pub entry_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaceInput {
    pub name: Option<String>,
    pub release_point: Option<String>,
    pub distance: Option<f64>,
    pub distance_unit: Option<String>,
    pub race_date: Option<String>,
    pub release_time: Option<String>,
    pub weather_conditions: Option<String>,
    pub wind_direction: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultInput {
    pub pigeon_id: Option<i64>,
    pub position: Option<i64>,
    pub arrival_time: Option<String>,
    pub speed: Option<f64>,
    pub notes: Option<String>,
    pub did_not_arrive: Option<bool>,
}

// ============================================================================
// ORGANIZATIONS
// ============================================================================

fn organization_sql(c: Circuit, filter: &str) -> String {
    let t = c.tables();
    format!(
        "SELECT o.id, o.user_id, o.name, o.organizer, o.location, o.country, o.website,
                o.description, o.status, o.created_at,
                (SELECT COUNT(*) FROM {seasons} s WHERE s.organization_id = o.id)
         FROM {orgs} o WHERE {filter}",
        seasons = t.seasons,
        orgs = t.organizations,
        filter = filter,
    )
}

fn row_to_organization(c: Circuit, row: &rusqlite::Row) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get(0)?,
        user_id: row.get(1)?,
        circuit: c,
        name: row.get(2)?,
        organizer: row.get(3)?,
        location: row.get(4)?,
        country: row.get(5)?,
        website: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
        seasons_count: row.get(10)?,
    })
}

pub fn list_organizations(conn: &Connection, c: Circuit, owner: i64) -> Result<Vec<Organization>> {
    let sql = format!("{} ORDER BY o.name", organization_sql(c, "o.user_id = ?1"));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner], |row| row_to_organization(c, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_organization(conn: &Connection, c: Circuit, owner: i64, id: i64) -> Result<Organization> {
    let organization = conn
        .query_row(&organization_sql(c, "o.id = ?1"), params![id], |row| {
            row_to_organization(c, row)
        })
        .optional()?
        .ok_or(LoftError::NotFound(c.organization_name()))?;
    ensure_owner(organization.user_id, owner)?;
    Ok(organization)
}

struct ValidOrganization {
    name: String,
    organizer: Option<String>,
    location: Option<String>,
    country: Option<String>,
    website: Option<String>,
    description: Option<String>,
    status: OrganizationStatus,
}

fn validate_organization(input: &OrganizationInput) -> Result<ValidOrganization> {
    let mut v = Validator::new();
    let valid = ValidOrganization {
        name: v.required("name", input.name.as_deref(), MAX_STRING),
        organizer: v.optional("organizer", input.organizer.as_deref(), Some(MAX_STRING)),
        location: v.optional("location", input.location.as_deref(), Some(MAX_STRING)),
        country: v.optional("country", input.country.as_deref(), Some(MAX_STRING)),
        website: v.optional("website", input.website.as_deref(), Some(MAX_STRING)),
        description: v.optional("description", input.description.as_deref(), None),
        status: v.required_choice("status", input.status.as_deref()),
    };
    v.finish()?;
    Ok(valid)
}

pub fn create_organization(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    input: &OrganizationInput,
) -> Result<Organization> {
    let o = validate_organization(input)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (user_id, name, organizer, location, country, website, description, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            c.tables().organizations
        ),
        params![
            owner,
            o.name,
            o.organizer,
            o.location,
            o.country,
            o.website,
            o.description,
            o.status,
            now()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(circuit = ?c, organization_id = id, "organization created");
    get_organization(conn, c, owner, id)
}

pub fn update_organization(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    id: i64,
    input: &OrganizationInput,
) -> Result<Organization> {
    get_organization(conn, c, owner, id)?;
    let o = validate_organization(input)?;
    conn.execute(
        &format!(
            "UPDATE {} SET name = ?1, organizer = ?2, location = ?3, country = ?4, website = ?5,
                           description = ?6, status = ?7
             WHERE id = ?8",
            c.tables().organizations
        ),
        params![
            o.name,
            o.organizer,
            o.location,
            o.country,
            o.website,
            o.description,
            o.status,
            id
        ],
    )?;
    get_organization(conn, c, owner, id)
}

pub fn delete_organization(conn: &Connection, c: Circuit, owner: i64, id: i64) -> Result<()> {
    get_organization(conn, c, owner, id)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", c.tables().organizations),
        params![id],
    )?;
    tracing::info!(circuit = ?c, organization_id = id, "organization deleted");
    Ok(())
}

/// Organization with its seasons, newest year first
pub fn organization_detail(conn: &Connection, c: Circuit, owner: i64, id: i64) -> Result<OrganizationDetail> {
    let organization = get_organization(conn, c, owner, id)?;
    let t = c.tables();
    let sql = format!(
        "SELECT {cols},
                (SELECT COUNT(*) FROM {entries} e WHERE e.season_id = s.id),
                (SELECT COUNT(*) FROM {races} r WHERE r.season_id = s.id)
         FROM {seasons} s WHERE s.organization_id = ?1
         ORDER BY s.year DESC, s.id DESC",
        cols = SEASON_COLUMNS,
        entries = t.entries,
        races = t.races,
        seasons = t.seasons,
    );
    let mut stmt = conn.prepare(&sql)?;
    let seasons = stmt
        .query_map(params![id], |row| {
            Ok(SeasonSummary {
                season: row_to_season(row)?,
                entries_count: row.get(8)?,
                races_count: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(OrganizationDetail {
        organization,
        seasons,
    })
}

// ============================================================================
// SEASONS
// ============================================================================

const SEASON_COLUMNS: &str =
    "s.id, s.organization_id, s.name, s.year, s.start_date, s.end_date, s.status, s.created_at";

fn row_to_season(row: &rusqlite::Row) -> rusqlite::Result<Season> {
    Ok(Season {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        year: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Season under an owned organization
pub fn get_season(conn: &Connection, c: Circuit, owner: i64, org_id: i64, season_id: i64) -> Result<Season> {
    get_organization(conn, c, owner, org_id)?;
    let sql = format!(
        "SELECT {} FROM {} s WHERE s.id = ?1 AND s.organization_id = ?2",
        SEASON_COLUMNS,
        c.tables().seasons
    );
    conn.query_row(&sql, params![season_id, org_id], row_to_season)
        .optional()?
        .ok_or(LoftError::NotFound("season"))
}

struct ValidSeason {
    name: String,
    year: i64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    status: SeasonStatus,
}

fn validate_season(input: &SeasonInput) -> Result<ValidSeason> {
    let mut v = Validator::new();
    let name = v.required("name", input.name.as_deref(), MAX_STRING);
    let year = v.integer_between("year", input.year, MIN_YEAR, MAX_YEAR);
    let start_date = v.date("start_date", input.start_date.as_deref());
    let end_date = v.date("end_date", input.end_date.as_deref());
    v.not_before("end_date", end_date, "start_date", start_date);
    let status = v.required_choice("status", input.status.as_deref());
    v.finish()?;
    Ok(ValidSeason {
        name,
        year,
        start_date,
        end_date,
        status,
    })
}

pub fn create_season(conn: &Connection, c: Circuit, owner: i64, org_id: i64, input: &SeasonInput) -> Result<Season> {
    get_organization(conn, c, owner, org_id)?;
    let s = validate_season(input)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (organization_id, name, year, start_date, end_date, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            c.tables().seasons
        ),
        params![org_id, s.name, s.year, s.start_date, s.end_date, s.status, now()],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(circuit = ?c, season_id = id, year = s.year, "season created");
    get_season(conn, c, owner, org_id, id)
}

pub fn update_season(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    input: &SeasonInput,
) -> Result<Season> {
    get_season(conn, c, owner, org_id, season_id)?;
    let s = validate_season(input)?;
    conn.execute(
        &format!(
            "UPDATE {} SET name = ?1, year = ?2, start_date = ?3, end_date = ?4, status = ?5 WHERE id = ?6",
            c.tables().seasons
        ),
        params![s.name, s.year, s.start_date, s.end_date, s.status, season_id],
    )?;
    get_season(conn, c, owner, org_id, season_id)
}

pub fn delete_season(conn: &Connection, c: Circuit, owner: i64, org_id: i64, season_id: i64) -> Result<()> {
    get_season(conn, c, owner, org_id, season_id)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", c.tables().seasons),
        params![season_id],
    )?;
    Ok(())
}

fn entries(conn: &Connection, c: Circuit, season_id: i64) -> Result<Vec<SeasonEntry>> {
    let sql = format!(
        "SELECT e.season_id, e.pigeon_id, e.entry_number, e.notes, {summary}
         FROM {entries} e JOIN pigeons p ON p.id = e.pigeon_id
         WHERE e.season_id = ?1
         ORDER BY e.entry_number, p.ring_number",
        summary = SUMMARY_COLUMNS,
        entries = c.tables().entries,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![season_id], |row| {
            Ok(SeasonEntry {
                season_id: row.get(0)?,
                pigeon_id: row.get(1)?,
                entry_number: row.get(2)?,
                notes: row.get(3)?,
                pigeon: row_to_summary_at(row, 4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn season_detail(conn: &Connection, c: Circuit, owner: i64, org_id: i64, season_id: i64) -> Result<SeasonDetail> {
    let season = get_season(conn, c, owner, org_id, season_id)?;
    let t = c.tables();

    let races = races_where(conn, c, "r.season_id = ?1 ORDER BY r.race_date DESC, r.id DESC", season_id)?;

    let sql = format!(
        "SELECT {summary} FROM pigeons p
         WHERE p.user_id = ?1 AND p.status = 'racing'
           AND NOT EXISTS (SELECT 1 FROM {entries} e WHERE e.season_id = ?2 AND e.pigeon_id = p.id)
         ORDER BY p.ring_number",
        summary = SUMMARY_COLUMNS,
        entries = t.entries,
    );
    let mut stmt = conn.prepare(&sql)?;
    let available_pigeons = stmt
        .query_map(params![owner, season_id], row_to_summary)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(SeasonDetail {
        entries: entries(conn, c, season_id)?,
        season,
        races,
        available_pigeons,
    })
}

// ============================================================================
// ENTRIES
// ============================================================================

fn get_entry(conn: &Connection, c: Circuit, season_id: i64, pigeon_id: i64) -> Result<SeasonEntry> {
    entries(conn, c, season_id)?
        .into_iter()
        .find(|e| e.pigeon_id == pigeon_id)
        .ok_or(LoftError::NotFound("entry"))
}

pub fn add_entry(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    input: &EntryInput,
) -> Result<SeasonEntry> {
    get_season(conn, c, owner, org_id, season_id)?;

    let mut v = Validator::new();
    let entry_number = v.optional("entry_number", input.entry_number.as_deref(), Some(MAX_STRING));
    let notes = v.optional("notes", input.notes.as_deref(), None);
    if input.pigeon_id.is_none() {
        v.error("pigeon_id", "The pigeon id field is required.");
    }
    v.finish()?;
    let pigeon_id = input.pigeon_id.unwrap_or_default();

    let owned: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pigeons WHERE id = ?1 AND user_id = ?2)",
        params![pigeon_id, owner],
        |row| row.get(0),
    )?;
    if !owned {
        return Err(LoftError::NotFound("pigeon"));
    }

    let inserted = conn.execute(
        &format!(
            "INSERT INTO {} (season_id, pigeon_id, entry_number, notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            c.tables().entries
        ),
        params![season_id, pigeon_id, entry_number, notes, now()],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LoftError::validation(
                "pigeon_id",
                "This pigeon is already entered in the season.",
            ))
        }
        Err(e) => return Err(e.into()),
    }
    tracing::debug!(circuit = ?c, season_id, pigeon_id, "season entry added");
    get_entry(conn, c, season_id, pigeon_id)
}

pub fn update_entry(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    pigeon_id: i64,
    input: &EntryInput,
) -> Result<SeasonEntry> {
    get_season(conn, c, owner, org_id, season_id)?;
    let mut v = Validator::new();
    let entry_number = v.optional("entry_number", input.entry_number.as_deref(), Some(MAX_STRING));
    let notes = v.optional("notes", input.notes.as_deref(), None);
    v.finish()?;

    let changed = conn.execute(
        &format!(
            "UPDATE {} SET entry_number = ?1, notes = ?2 WHERE season_id = ?3 AND pigeon_id = ?4",
            c.tables().entries
        ),
        params![entry_number, notes, season_id, pigeon_id],
    )?;
    if changed == 0 {
        return Err(LoftError::NotFound("entry"));
    }
    get_entry(conn, c, season_id, pigeon_id)
}

/// Withdraw a pigeon from the season, dropping its results in every race of it
pub fn remove_entry(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    pigeon_id: i64,
) -> Result<()> {
    get_season(conn, c, owner, org_id, season_id)?;
    let t = c.tables();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        &format!("DELETE FROM {} WHERE season_id = ?1 AND pigeon_id = ?2", t.entries),
        params![season_id, pigeon_id],
    )?;
    let results_removed = tx.execute(
        &format!(
            "DELETE FROM {results} WHERE pigeon_id = ?1
             AND race_id IN (SELECT id FROM {races} WHERE season_id = ?2)",
            results = t.results,
            races = t.races,
        ),
        params![pigeon_id, season_id],
    )?;
    tx.commit()?;

    tracing::debug!(circuit = ?c, season_id, pigeon_id, results_removed, "season entry removed");
    Ok(())
}

// ============================================================================
// RACES
// ============================================================================

fn races_where(conn: &Connection, c: Circuit, filter: &str, id: i64) -> Result<Vec<SeasonRace>> {
    let t = c.tables();
    let sql = format!(
        "SELECT r.id, r.season_id, r.name, r.release_point, r.distance, r.distance_unit,
                r.race_date, r.release_time, r.weather_conditions, r.wind_direction, r.notes,
                r.created_at,
                (SELECT COUNT(*) FROM {results} x
                 WHERE x.race_id = r.id AND x.did_not_arrive = 0 AND x.arrival_time IS NOT NULL),
                (SELECT COUNT(*) FROM {results} x WHERE x.race_id = r.id)
         FROM {races} r WHERE {filter}",
        results = t.results,
        races = t.races,
        filter = filter,
    );
    let mut stmt = conn.prepare(&sql)?;
    let races = stmt
        .query_map(params![id], |row| {
            let mut race = SeasonRace {
                id: row.get(0)?,
                season_id: row.get(1)?,
                name: row.get(2)?,
                release_point: row.get(3)?,
                distance: row.get(4)?,
                distance_unit: row.get(5)?,
                race_date: row.get(6)?,
                release_time: row.get(7)?,
                weather_conditions: row.get(8)?,
                wind_direction: row.get(9)?,
                notes: row.get(10)?,
                created_at: row.get(11)?,
                arrived_count: row.get(12)?,
                total_entries: row.get(13)?,
                display_name: String::new(),
            };
            race.display_name = race.compute_display_name();
            Ok(race)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(races)
}

/// Race under a season under an owned organization
pub fn get_race(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
) -> Result<SeasonRace> {
    get_season(conn, c, owner, org_id, season_id)?;
    races_where(conn, c, "r.id = ?1", race_id)?
        .into_iter()
        .find(|r| r.season_id == season_id)
        .ok_or(LoftError::NotFound("race"))
}

struct ValidRace {
    name: String,
    release_point: Option<String>,
    distance: Option<f64>,
    distance_unit: DistanceUnit,
    race_date: Option<NaiveDate>,
    release_time: Option<NaiveTime>,
    weather_conditions: Option<String>,
    wind_direction: Option<String>,
    notes: Option<String>,
}

fn validate_race(input: &RaceInput) -> Result<ValidRace> {
    let mut v = Validator::new();
    let valid = ValidRace {
        name: v.required("name", input.name.as_deref(), MAX_STRING),
        release_point: v.optional("release_point", input.release_point.as_deref(), Some(MAX_STRING)),
        distance: v.min_number("distance", input.distance, 0.0),
        distance_unit: v.required_choice("distance_unit", input.distance_unit.as_deref()),
        race_date: v.date("race_date", input.race_date.as_deref()),
        release_time: v.time("release_time", input.release_time.as_deref(), "%H:%M"),
        weather_conditions: v.optional("weather_conditions", input.weather_conditions.as_deref(), Some(MAX_STRING)),
        wind_direction: v.optional("wind_direction", input.wind_direction.as_deref(), Some(MAX_STRING)),
        notes: v.optional("notes", input.notes.as_deref(), None),
    };
    v.finish()?;
    Ok(valid)
}

pub fn create_race(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    input: &RaceInput,
) -> Result<SeasonRace> {
    get_season(conn, c, owner, org_id, season_id)?;
    let r = validate_race(input)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (season_id, name, release_point, distance, distance_unit, race_date,
                             release_time, weather_conditions, wind_direction, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            c.tables().races
        ),
        params![
            season_id,
            r.name,
            r.release_point,
            r.distance,
            r.distance_unit,
            r.race_date,
            r.release_time,
            r.weather_conditions,
            r.wind_direction,
            r.notes,
            now()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(circuit = ?c, race_id = id, "race created");
    get_race(conn, c, owner, org_id, season_id, id)
}

pub fn update_race(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
    input: &RaceInput,
) -> Result<SeasonRace> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;
    let r = validate_race(input)?;
    conn.execute(
        &format!(
            "UPDATE {} SET name = ?1, release_point = ?2, distance = ?3, distance_unit = ?4,
                           race_date = ?5, release_time = ?6, weather_conditions = ?7,
                           wind_direction = ?8, notes = ?9
             WHERE id = ?10",
            c.tables().races
        ),
        params![
            r.name,
            r.release_point,
            r.distance,
            r.distance_unit,
            r.race_date,
            r.release_time,
            r.weather_conditions,
            r.wind_direction,
            r.notes,
            race_id
        ],
    )?;
    get_race(conn, c, owner, org_id, season_id, race_id)
}

pub fn delete_race(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
) -> Result<()> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", c.tables().races),
        params![race_id],
    )?;
    Ok(())
}

fn results(conn: &Connection, c: Circuit, race_id: i64) -> Result<Vec<RaceResult>> {
    let sql = format!(
        "SELECT x.race_id, x.pigeon_id, x.position, x.arrival_time, x.speed, x.notes,
                x.did_not_arrive, {summary}
         FROM {results} x JOIN pigeons p ON p.id = x.pigeon_id
         WHERE x.race_id = ?1
         ORDER BY x.did_not_arrive, x.position IS NULL, x.position, x.arrival_time",
        summary = SUMMARY_COLUMNS,
        results = c.tables().results,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![race_id], |row| {
            Ok(RaceResult {
                race_id: row.get(0)?,
                pigeon_id: row.get(1)?,
                position: row.get(2)?,
                arrival_time: row.get(3)?,
                speed: row.get(4)?,
                notes: row.get(5)?,
                did_not_arrive: row.get(6)?,
                pigeon: row_to_summary_at(row, 7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn race_detail(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
) -> Result<RaceDetail> {
    let race = get_race(conn, c, owner, org_id, season_id, race_id)?;
    Ok(RaceDetail {
        results: results(conn, c, race_id)?,
        entries: entries(conn, c, season_id)?,
        race,
    })
}

// ============================================================================
// RESULTS
// ============================================================================

struct ValidResult {
    position: Option<i64>,
    arrival_time: Option<NaiveTime>,
    speed: Option<f64>,
    notes: Option<String>,
    did_not_arrive: bool,
}

fn validate_result(v: &mut Validator, input: &ResultInput) -> ValidResult {
    ValidResult {
        position: v.min_integer("position", input.position, 1),
        arrival_time: v.time("arrival_time", input.arrival_time.as_deref(), "%H:%M:%S"),
        speed: v.min_number("speed", input.speed, 0.0),
        notes: v.optional("notes", input.notes.as_deref(), None),
        did_not_arrive: input.did_not_arrive.unwrap_or(false),
    }
}

fn get_result(conn: &Connection, c: Circuit, race_id: i64, pigeon_id: i64) -> Result<RaceResult> {
    results(conn, c, race_id)?
        .into_iter()
        .find(|r| r.pigeon_id == pigeon_id)
        .ok_or(LoftError::NotFound("result"))
}

fn is_entered(conn: &Connection, c: Circuit, season_id: i64, pigeon_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE season_id = ?1 AND pigeon_id = ?2)",
            c.tables().entries
        ),
        params![season_id, pigeon_id],
        |row| row.get(0),
    )?)
}

/// Record a result for a pigeon entered in the race's season
pub fn add_result(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
    input: &ResultInput,
) -> Result<RaceResult> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;

    let mut v = Validator::new();
    let r = validate_result(&mut v, input);
    if input.pigeon_id.is_none() {
        v.error("pigeon_id", "The pigeon id field is required.");
    }
    v.finish()?;
    let pigeon_id = input.pigeon_id.unwrap_or_default();

    if !is_entered(conn, c, season_id, pigeon_id)? {
        return Err(LoftError::NotFound("entry"));
    }

    let inserted = conn.execute(
        &format!(
            "INSERT INTO {} (race_id, pigeon_id, position, arrival_time, speed, notes, did_not_arrive, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            c.tables().results
        ),
        params![
            race_id,
            pigeon_id,
            r.position,
            r.arrival_time,
            r.speed,
            r.notes,
            r.did_not_arrive,
            now()
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => {
            return Err(LoftError::validation(
                "pigeon_id",
                "This pigeon already has a result for this race.",
            ))
        }
        Err(e) => return Err(e.into()),
    }
    get_result(conn, c, race_id, pigeon_id)
}

#[allow(clippy::too_many_arguments)]
pub fn update_result(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
    pigeon_id: i64,
    input: &ResultInput,
) -> Result<RaceResult> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;
    let mut v = Validator::new();
    let r = validate_result(&mut v, input);
    v.finish()?;

    let changed = conn.execute(
        &format!(
            "UPDATE {} SET position = ?1, arrival_time = ?2, speed = ?3, notes = ?4, did_not_arrive = ?5
             WHERE race_id = ?6 AND pigeon_id = ?7",
            c.tables().results
        ),
        params![
            r.position,
            r.arrival_time,
            r.speed,
            r.notes,
            r.did_not_arrive,
            race_id,
            pigeon_id
        ],
    )?;
    if changed == 0 {
        return Err(LoftError::NotFound("result"));
    }
    get_result(conn, c, race_id, pigeon_id)
}

pub fn remove_result(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
    pigeon_id: i64,
) -> Result<()> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE race_id = ?1 AND pigeon_id = ?2", c.tables().results),
        params![race_id, pigeon_id],
    )?;
    Ok(())
}

/// Add an empty result for every season entry that has none; returns how many
pub fn add_all_entries(
    conn: &Connection,
    c: Circuit,
    owner: i64,
    org_id: i64,
    season_id: i64,
    race_id: i64,
) -> Result<usize> {
    get_race(conn, c, owner, org_id, season_id, race_id)?;
    let t = c.tables();
    let added = conn.execute(
        &format!(
            "INSERT INTO {results} (race_id, pigeon_id, did_not_arrive, created_at)
             SELECT ?1, e.pigeon_id, 0, ?3 FROM {entries} e
             WHERE e.season_id = ?2
               AND NOT EXISTS (SELECT 1 FROM {results} x WHERE x.race_id = ?1 AND x.pigeon_id = e.pigeon_id)",
            results = t.results,
            entries = t.entries,
        ),
        params![race_id, season_id, now()],
    )?;
    tracing::info!(circuit = ?c, race_id, added, "season entries added to race");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_support::{add_pigeon, pigeon_input, second_user, test_db};
    use crate::entities::{pigeon, PigeonStatus};

    fn org_input(name: &str) -> OrganizationInput {
        OrganizationInput {
            name: Some(name.to_string()),
            status: Some("active".into()),
            ..Default::default()
        }
    }

    fn season_input(year: i64) -> SeasonInput {
        SeasonInput {
            name: Some(format!("Season {}", year)),
            year: Some(year),
            status: Some("active".into()),
            ..Default::default()
        }
    }

    fn race_input(name: &str) -> RaceInput {
        RaceInput {
            name: Some(name.to_string()),
            distance_unit: Some("km".into()),
            ..Default::default()
        }
    }

    fn racer(conn: &Connection, owner: i64, ring: &str) -> i64 {
        pigeon::create(conn, owner, &pigeon_input(ring, None, PigeonStatus::Racing))
            .unwrap()
            .id
    }

    /// Organization + season + one race, for either circuit
    fn setup(conn: &Connection, c: Circuit, owner: i64) -> (i64, i64, i64) {
        let org = create_organization(conn, c, owner, &org_input("Noord")).unwrap();
        let season = create_season(conn, c, owner, org.id, &season_input(2025)).unwrap();
        let race = create_race(conn, c, owner, org.id, season.id, &race_input("Quievrain")).unwrap();
        (org.id, season.id, race.id)
    }

    #[test]
    fn test_organization_crud_both_circuits() {
        let (conn, owner) = test_db();
        for c in Circuit::ALL.iter().copied() {
            let org = create_organization(&conn, c, owner, &org_input("Het Noorden")).unwrap();
            assert_eq!(org.circuit, c);
            assert_eq!(org.seasons_count, 0);

            let mut input = org_input("Het Zuiden");
            input.status = Some("inactive".into());
            let updated = update_organization(&conn, c, owner, org.id, &input).unwrap();
            assert_eq!(updated.status, OrganizationStatus::Inactive);
            assert_eq!(list_organizations(&conn, c, owner).unwrap().len(), 1);

            delete_organization(&conn, c, owner, org.id).unwrap();
            assert!(matches!(get_organization(&conn, c, owner, org.id), Err(LoftError::NotFound(_))));
        }
    }

    #[test]
    fn test_circuits_are_separate() {
        let (conn, owner) = test_db();
        create_organization(&conn, Circuit::Club, owner, &org_input("Club")).unwrap();
        assert!(list_organizations(&conn, Circuit::Olr, owner).unwrap().is_empty());
    }

    #[test]
    fn test_organization_validation() {
        let (conn, owner) = test_db();
        let input = OrganizationInput {
            status: Some("paused".into()),
            website: Some("x".repeat(300)),
            ..Default::default()
        };
        let err = create_organization(&conn, Circuit::Club, owner, &input).unwrap_err();
        let LoftError::Validation(e) = err else { panic!("expected validation error") };
        assert!(e.contains("name"));
        assert!(e.contains("status"));
        assert!(e.contains("website"));
    }

    #[test]
    fn test_foreign_organization_forbidden() {
        let (conn, owner) = test_db();
        let (org, season, _) = setup(&conn, Circuit::Club, owner);
        let other = second_user(&conn);
        assert!(matches!(
            season_detail(&conn, Circuit::Club, other, org, season),
            Err(LoftError::Forbidden)
        ));
    }

    #[test]
    fn test_season_must_belong_to_organization() {
        let (conn, owner) = test_db();
        let (_, season, _) = setup(&conn, Circuit::Olr, owner);
        let other_org = create_organization(&conn, Circuit::Olr, owner, &org_input("Other")).unwrap();
        assert!(matches!(
            get_season(&conn, Circuit::Olr, owner, other_org.id, season),
            Err(LoftError::NotFound("season"))
        ));
    }

    #[test]
    fn test_season_validation() {
        let (conn, owner) = test_db();
        let org = create_organization(&conn, Circuit::Club, owner, &org_input("Noord")).unwrap();
        let input = SeasonInput {
            name: Some("Bad".into()),
            year: Some(1999),
            start_date: Some("2025-05-01".into()),
            end_date: Some("2025-04-01".into()),
            status: Some("active".into()),
        };
        let err = create_season(&conn, Circuit::Club, owner, org.id, &input).unwrap_err();
        let LoftError::Validation(e) = err else { panic!("expected validation error") };
        assert!(e.contains("year"));
        assert!(e.contains("end_date"));
    }

    #[test]
    fn test_organization_detail_counts() {
        let (conn, owner) = test_db();
        let (org, season, _) = setup(&conn, Circuit::Club, owner);
        create_season(&conn, Circuit::Club, owner, org, &season_input(2026)).unwrap();
        let pigeon = racer(&conn, owner, "BE-2024-1");
        add_entry(&conn, Circuit::Club, owner, org, season, &EntryInput { pigeon_id: Some(pigeon), ..Default::default() }).unwrap();

        let detail = organization_detail(&conn, Circuit::Club, owner, org).unwrap();
        assert_eq!(detail.organization.seasons_count, 2);
        assert_eq!(detail.seasons[0].season.year, 2026);
        assert_eq!(detail.seasons[1].entries_count, 1);
        assert_eq!(detail.seasons[1].races_count, 1);
    }

    #[test]
    fn test_entries_and_available_pigeons() {
        let (conn, owner) = test_db();
        let c = Circuit::Club;
        let (org, season, _) = setup(&conn, c, owner);
        let a = racer(&conn, owner, "BE-2024-1");
        let b = racer(&conn, owner, "BE-2024-2");
        add_pigeon(&conn, owner, "BE-2024-3", None); // stock, not available

        let entry = add_entry(
            &conn,
            c,
            owner,
            org,
            season,
            &EntryInput {
                pigeon_id: Some(a),
                entry_number: Some("17".into()),
                notes: None,
            },
        )
        .unwrap();
        assert_eq!(entry.entry_number.as_deref(), Some("17"));

        let dup = add_entry(&conn, c, owner, org, season, &EntryInput { pigeon_id: Some(a), ..Default::default() });
        assert!(matches!(dup, Err(LoftError::Validation(e)) if e.contains("pigeon_id")));

        let other = second_user(&conn);
        let foreign = add_pigeon(&conn, other, "DE-1", None);
        let err = add_entry(&conn, c, owner, org, season, &EntryInput { pigeon_id: Some(foreign), ..Default::default() });
        assert!(matches!(err, Err(LoftError::NotFound(_))));

        let detail = season_detail(&conn, c, owner, org, season).unwrap();
        assert_eq!(detail.entries.len(), 1);
        let available: Vec<i64> = detail.available_pigeons.iter().map(|p| p.id).collect();
        assert_eq!(available, vec![b]);

        let updated = update_entry(
            &conn,
            c,
            owner,
            org,
            season,
            a,
            &EntryInput { notes: Some("late".into()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(updated.entry_number, None);
        assert_eq!(updated.notes.as_deref(), Some("late"));
        assert!(matches!(
            update_entry(&conn, c, owner, org, season, b, &EntryInput::default()),
            Err(LoftError::NotFound(_))
        ));
    }

    #[test]
    fn test_race_validation_and_display_name() {
        let (conn, owner) = test_db();
        let c = Circuit::Olr;
        let (org, season, _) = setup(&conn, c, owner);

        let bad = RaceInput {
            name: Some("Hot spot".into()),
            distance: Some(-1.0),
            distance_unit: Some("leagues".into()),
            release_time: Some("7:30".into()),
            ..Default::default()
        };
        let err = create_race(&conn, c, owner, org, season, &bad).unwrap_err();
        let LoftError::Validation(e) = err else { panic!("expected validation error") };
        assert!(e.contains("distance") && e.contains("distance_unit") && e.contains("release_time"));

        let race = create_race(
            &conn,
            c,
            owner,
            org,
            season,
            &RaceInput {
                name: Some("Final".into()),
                release_point: Some("Orleans".into()),
                distance: Some(512.5),
                distance_unit: Some("km".into()),
                race_date: Some("2025-08-30".into()),
                release_time: Some("07:15".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(race.display_name, "Orleans 512.50km 0/0");
        assert_eq!(race.release_time, NaiveTime::from_hms_opt(7, 15, 0));
    }

    #[test]
    fn test_results_flow() {
        let (conn, owner) = test_db();
        let c = Circuit::Club;
        let (org, season, race) = setup(&conn, c, owner);
        let a = racer(&conn, owner, "BE-2024-1");
        let b = racer(&conn, owner, "BE-2024-2");
        let outsider = racer(&conn, owner, "BE-2024-3");
        for p in [a, b] {
            add_entry(&conn, c, owner, org, season, &EntryInput { pigeon_id: Some(p), ..Default::default() }).unwrap();
        }

        let result = add_result(
            &conn,
            c,
            owner,
            org,
            season,
            race,
            &ResultInput {
                pigeon_id: Some(a),
                position: Some(1),
                arrival_time: Some("11:02:45".into()),
                speed: Some(1432.7),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.position, Some(1));

        let not_entered = add_result(&conn, c, owner, org, season, race, &ResultInput { pigeon_id: Some(outsider), ..Default::default() });
        assert!(matches!(not_entered, Err(LoftError::NotFound("entry"))));

        let bad = ResultInput { pigeon_id: Some(b), position: Some(0), arrival_time: Some("11:02".into()), ..Default::default() };
        let err = add_result(&conn, c, owner, org, season, race, &bad).unwrap_err();
        assert!(matches!(err, LoftError::Validation(e) if e.contains("position") && e.contains("arrival_time")));

        // Only b is missing a result
        assert_eq!(add_all_entries(&conn, c, owner, org, season, race).unwrap(), 1);
        assert_eq!(add_all_entries(&conn, c, owner, org, season, race).unwrap(), 0);

        let detail = race_detail(&conn, c, owner, org, season, race).unwrap();
        assert_eq!(detail.results.len(), 2);
        assert_eq!(detail.race.arrived_count, 1);
        assert_eq!(detail.race.total_entries, 2);
        assert_eq!(detail.race.display_name, "Quievrain 1/2");

        let dna = update_result(
            &conn,
            c,
            owner,
            org,
            season,
            race,
            a,
            &ResultInput { did_not_arrive: Some(true), ..Default::default() },
        )
        .unwrap();
        assert!(dna.did_not_arrive);
        assert_eq!(get_race(&conn, c, owner, org, season, race).unwrap().arrived_count, 0);

        remove_result(&conn, c, owner, org, season, race, b).unwrap();
        assert_eq!(get_race(&conn, c, owner, org, season, race).unwrap().total_entries, 1);
    }

    #[test]
    fn test_removing_entry_drops_results() {
        let (conn, owner) = test_db();
        let c = Circuit::Olr;
        let (org, season, race) = setup(&conn, c, owner);
        let second_race = create_race(&conn, c, owner, org, season, &race_input("Second")).unwrap();
        let a = racer(&conn, owner, "BE-2024-1");
        add_entry(&conn, c, owner, org, season, &EntryInput { pigeon_id: Some(a), ..Default::default() }).unwrap();
        add_all_entries(&conn, c, owner, org, season, race).unwrap();
        add_all_entries(&conn, c, owner, org, season, second_race.id).unwrap();

        remove_entry(&conn, c, owner, org, season, a).unwrap();

        let detail = season_detail(&conn, c, owner, org, season).unwrap();
        assert!(detail.entries.is_empty());
        assert!(detail.races.iter().all(|r| r.total_entries == 0));
    }
}
