// 🐦 Pigeon Entity - the core record of the ledger
//
// A pigeon links to its parents twice:
// - `sire_id` / `dam_id` point at other pigeon records (self-referential pedigree)
// - `sire_*` / `dam_*` free-text fields describe ancestors never entered as records
//
// Ownership: every query is scoped to `user_id`. A foreign pigeon is reported
// as not found, never as forbidden.

use super::bloodline::{self, BloodlineChoice, BloodlineLink};
use super::color_tag::{self, ColorTag};
use super::Page;
use crate::db::{json_list, now, to_json_list};
use crate::error::{LoftError, Result};
use crate::pedigree::{self, PedigreeNode, MAX_GENERATIONS};
use crate::ring_match::{RingCheck, RingMatcher, RingRecord};
use crate::validation::{Validator, MAX_STRING};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{named_params, params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Sex of the bird; unknown until sexed
    Gender {
        Male => "male",
        Female => "female",
    }
    default Male
}

string_enum! {
    /// Where the pigeon is in its life in the loft
    PigeonStatus {
        Stock => "stock",
        Racing => "racing",
        Breeding => "breeding",
        Injured => "injured",
        Deceased => "deceased",
        Missing => "missing",
        Flyaway => "flyaway",
    }
    default Stock
}

impl PigeonStatus {
    /// Statuses that can no longer be paired
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            PigeonStatus::Deceased | PigeonStatus::Missing | PigeonStatus::Flyaway
        )
    }
}

/// Accepted page sizes for the pigeon listing
pub const PER_PAGE_OPTIONS: [u32; 4] = [12, 21, 52, 104];
pub const DEFAULT_PER_PAGE: u32 = 12;

/// Recent pigeons shown on the dashboard
const DASHBOARD_RECENT: i64 = 5;

// ============================================================================
// TYPES
// ============================================================================

/// Free-text description of an ancestor that has no record of its own
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyParent {
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
}

impl LegacyParent {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ring_number.is_none() && self.color.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pigeon {
    pub id: i64,
    pub user_id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub color_tag_id: Option<i64>,
    pub gender: Option<Gender>,
    pub hatch_date: Option<NaiveDate>,
    pub status: PigeonStatus,
    /// Name of the primary bloodline (kept for older records)
    pub bloodline: Option<String>,
    pub remarks: Option<String>,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
    pub pedigree_images: Vec<String>,
    pub for_sale: bool,
    pub sale_price: Option<f64>,
    pub hide_price: bool,
    pub sale_description: Option<String>,
    pub sire_id: Option<i64>,
    pub dam_id: Option<i64>,
    pub sire_legacy: LegacyParent,
    pub dam_legacy: LegacyParent,
    pub pairing_id: Option<i64>,
    pub clutch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pigeon {
    /// Name, ring number, personal number, or `Pigeon #id`
    pub fn label(&self) -> String {
        pedigree::display_label(
            self.id,
            self.name.as_deref(),
            self.ring_number.as_deref(),
            self.personal_number.as_deref(),
        )
    }
}

/// Short form embedded in other records (parents, matches, sales, entries)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PigeonSummary {
    pub id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub gender: Option<Gender>,
    pub status: PigeonStatus,
    pub bloodline: Option<String>,
    pub photo_url: Option<String>,
}

impl RingRecord for PigeonSummary {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn ring_number(&self) -> Option<&str> {
        self.ring_number.as_deref()
    }
}

/// A pigeon with its relations resolved
#[derive(Debug, Clone, Serialize)]
pub struct PigeonView {
    #[serde(flatten)]
    pub pigeon: Pigeon,
    pub bloodlines: Vec<BloodlineLink>,
    pub sire: Option<PigeonSummary>,
    pub dam: Option<PigeonSummary>,
    pub color_tag: Option<ColorTag>,
}

/// Raw create/update payload; strings are validated and trimmed on the way in
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PigeonInput {
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub color_tag_id: Option<i64>,
    pub gender: Option<String>,
    pub hatch_date: Option<String>,
    pub status: Option<String>,
    pub remarks: Option<String>,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
    /// `None` keeps the stored list on update
    pub pedigree_images: Option<Vec<String>>,
    pub for_sale: Option<bool>,
    pub sale_price: Option<f64>,
    pub hide_price: Option<bool>,
    pub sale_description: Option<String>,
    pub sire_id: Option<i64>,
    pub dam_id: Option<i64>,
    pub sire_name: Option<String>,
    pub sire_ring_number: Option<String>,
    pub sire_color: Option<String>,
    pub sire_notes: Option<String>,
    pub dam_name: Option<String>,
    pub dam_ring_number: Option<String>,
    pub dam_color: Option<String>,
    pub dam_notes: Option<String>,
    pub pairing_id: Option<i64>,
    pub clutch_id: Option<i64>,
    /// `None` keeps the current links, `Some(vec![])` clears them
    pub bloodlines: Option<Vec<BloodlineChoice>>,
}

/// Listing filters (query string of `GET /api/pigeons`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PigeonFilter {
    pub search: Option<String>,
    pub gender: Option<String>,
    /// One status or several separated by commas
    pub status: Option<String>,
    /// Bloodline id, or a legacy bloodline name
    pub bloodline: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PigeonFilter {
    pub fn per_page(&self) -> u32 {
        match self.per_page {
            Some(n) if PER_PAGE_OPTIONS.contains(&n) => n,
            _ => DEFAULT_PER_PAGE,
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Candidate parent shown in the sire/dam pickers
#[derive(Debug, Clone, Serialize)]
pub struct ParentOption {
    pub id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub bloodline: Option<String>,
    pub sire_ring_number: Option<String>,
    pub dam_ring_number: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParentOptions {
    pub sires: Vec<ParentOption>,
    pub dams: Vec<ParentOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub total_pigeons: i64,
    pub recent_pigeons: Vec<PigeonView>,
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const PIGEON_COLUMNS: &str = "p.id, p.user_id, p.name, p.ring_number, p.personal_number, \
     p.color, p.color_tag_id, p.gender, p.hatch_date, p.status, p.bloodline, p.remarks, \
     p.notes, p.photo_url, p.pedigree_images, p.for_sale, p.sale_price, p.hide_price, \
     p.sale_description, p.sire_id, p.dam_id, p.sire_name, p.sire_ring_number, p.sire_color, \
     p.sire_notes, p.dam_name, p.dam_ring_number, p.dam_color, p.dam_notes, p.pairing_id, \
     p.clutch_id, p.created_at, p.updated_at";

pub(crate) const SUMMARY_COLUMNS: &str = "p.id, p.name, p.ring_number, p.personal_number, \
     p.color, p.gender, p.status, p.bloodline, p.photo_url";

fn row_to_pigeon(row: &rusqlite::Row) -> rusqlite::Result<Pigeon> {
    Ok(Pigeon {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        ring_number: row.get(3)?,
        personal_number: row.get(4)?,
        color: row.get(5)?,
        color_tag_id: row.get(6)?,
        gender: row.get(7)?,
        hatch_date: row.get(8)?,
        status: row.get(9)?,
        bloodline: row.get(10)?,
        remarks: row.get(11)?,
        notes: row.get(12)?,
        photo_url: row.get(13)?,
        pedigree_images: json_list(row.get(14)?),
        for_sale: row.get(15)?,
        sale_price: row.get(16)?,
        hide_price: row.get(17)?,
        sale_description: row.get(18)?,
        sire_id: row.get(19)?,
        dam_id: row.get(20)?,
        sire_legacy: LegacyParent {
            name: row.get(21)?,
            ring_number: row.get(22)?,
            color: row.get(23)?,
            notes: row.get(24)?,
        },
        dam_legacy: LegacyParent {
            name: row.get(25)?,
            ring_number: row.get(26)?,
            color: row.get(27)?,
            notes: row.get(28)?,
        },
        pairing_id: row.get(29)?,
        clutch_id: row.get(30)?,
        created_at: row.get(31)?,
        updated_at: row.get(32)?,
    })
}

/// Maps `SUMMARY_COLUMNS` starting at column `start`
pub(crate) fn row_to_summary_at(row: &rusqlite::Row, start: usize) -> rusqlite::Result<PigeonSummary> {
    Ok(PigeonSummary {
        id: row.get(start)?,
        name: row.get(start + 1)?,
        ring_number: row.get(start + 2)?,
        personal_number: row.get(start + 3)?,
        color: row.get(start + 4)?,
        gender: row.get(start + 5)?,
        status: row.get(start + 6)?,
        bloodline: row.get(start + 7)?,
        photo_url: row.get(start + 8)?,
    })
}

pub(crate) fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<PigeonSummary> {
    row_to_summary_at(row, 0)
}

// ============================================================================
// READS
// ============================================================================

fn find(conn: &Connection, id: i64) -> Result<Option<Pigeon>> {
    let sql = format!("SELECT {} FROM pigeons p WHERE p.id = ?1", PIGEON_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_pigeon).optional()?)
}

/// Owned pigeon; foreign or missing ids are both "not found"
pub fn get(conn: &Connection, owner: i64, id: i64) -> Result<Pigeon> {
    match find(conn, id)? {
        Some(pigeon) if pigeon.user_id == owner => Ok(pigeon),
        _ => Err(LoftError::NotFound("pigeon")),
    }
}

pub fn summary(conn: &Connection, id: i64) -> Result<Option<PigeonSummary>> {
    let sql = format!("SELECT {} FROM pigeons p WHERE p.id = ?1", SUMMARY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_summary).optional()?)
}

/// Resolve parents, bloodlines and color tag
pub fn view(conn: &Connection, pigeon: Pigeon) -> Result<PigeonView> {
    let bloodlines = bloodline::links_for_pigeon(conn, pigeon.id)?;
    let sire = match pigeon.sire_id {
        Some(id) => summary(conn, id)?,
        None => None,
    };
    let dam = match pigeon.dam_id {
        Some(id) => summary(conn, id)?,
        None => None,
    };
    let color_tag = match pigeon.color_tag_id {
        Some(id) => color_tag::get(conn, pigeon.user_id, id).ok(),
        None => None,
    };
    Ok(PigeonView {
        pigeon,
        bloodlines,
        sire,
        dam,
        color_tag,
    })
}

pub fn get_view(conn: &Connection, owner: i64, id: i64) -> Result<PigeonView> {
    let pigeon = get(conn, owner, id)?;
    view(conn, pigeon)
}

/// Filtered, paginated listing, newest first
pub fn list(conn: &Connection, owner: i64, filter: &PigeonFilter) -> Result<Page<PigeonView>> {
    let mut clauses = vec!["p.user_id = ?".to_string()];
    let mut values: Vec<Value> = vec![Value::Integer(owner)];

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        clauses.push(
            "(p.name LIKE ? OR p.ring_number LIKE ? OR p.personal_number LIKE ? \
             OR p.bloodline LIKE ? OR p.color LIKE ? \
             OR EXISTS (SELECT 1 FROM pigeon_bloodline pb JOIN bloodlines b ON b.id = pb.bloodline_id \
                        WHERE pb.pigeon_id = p.id AND b.name LIKE ?))"
                .to_string(),
        );
        for _ in 0..6 {
            values.push(Value::Text(pattern.clone()));
        }
    }

    if let Some(gender) = filter.gender.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("p.gender = ?".to_string());
        values.push(Value::Text(gender.to_lowercase()));
    }

    if let Some(status) = filter.status.as_deref() {
        let statuses: Vec<&str> = status
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !statuses.is_empty() {
            let marks = vec!["?"; statuses.len()].join(", ");
            clauses.push(format!("p.status IN ({})", marks));
            values.extend(statuses.iter().map(|s| Value::Text(s.to_lowercase())));
        }
    }

    if let Some(bloodline) = filter.bloodline.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match bloodline.parse::<i64>() {
            Ok(id) => {
                clauses.push(
                    "EXISTS (SELECT 1 FROM pigeon_bloodline pb WHERE pb.pigeon_id = p.id AND pb.bloodline_id = ?)"
                        .to_string(),
                );
                values.push(Value::Integer(id));
            }
            Err(_) => {
                clauses.push("p.bloodline = ?".to_string());
                values.push(Value::Text(bloodline.to_string()));
            }
        }
    }

    let where_sql = clauses.join(" AND ");
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM pigeons p WHERE {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let (page, per_page) = (filter.page(), filter.per_page());
    let sql = format!(
        "SELECT {} FROM pigeons p WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT {} OFFSET {}",
        PIGEON_COLUMNS,
        where_sql,
        per_page,
        Page::<PigeonView>::offset(page, per_page)
    );
    let mut stmt = conn.prepare(&sql)?;
    let pigeons = stmt
        .query_map(params_from_iter(values.iter()), row_to_pigeon)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let data = pigeons
        .into_iter()
        .map(|p| view(conn, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(data, total, page, per_page))
}

/// Distinct colors in use, for filter drop-downs
pub fn colors(conn: &Connection, owner: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT color FROM pigeons WHERE user_id = ?1 AND color IS NOT NULL ORDER BY color",
    )?;
    let colors = stmt
        .query_map(params![owner], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(colors)
}

fn parent_list(
    conn: &Connection,
    owner: i64,
    gender: Gender,
    exclude: Option<i64>,
) -> Result<Vec<ParentOption>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.ring_number, p.personal_number, p.color, p.bloodline,
                s.ring_number, d.ring_number, p.sire_id IS NOT NULL, p.dam_id IS NOT NULL
         FROM pigeons p
         LEFT JOIN pigeons s ON s.id = p.sire_id
         LEFT JOIN pigeons d ON d.id = p.dam_id
         WHERE p.user_id = ?1 AND p.gender = ?2 AND p.id != ?3
         ORDER BY p.name, p.ring_number",
    )?;
    let options = stmt
        .query_map(params![owner, gender, exclude.unwrap_or(0)], |row| {
            let has_sire: bool = row.get(8)?;
            let has_dam: bool = row.get(9)?;
            let mut option = ParentOption {
                id: row.get(0)?,
                name: row.get(1)?,
                ring_number: row.get(2)?,
                personal_number: row.get(3)?,
                color: row.get(4)?,
                bloodline: row.get(5)?,
                sire_ring_number: row.get(6)?,
                dam_ring_number: row.get(7)?,
                label: String::new(),
            };
            option.label = parent_label(&option, has_sire, has_dam);
            Ok(option)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(options)
}

fn parent_label(option: &ParentOption, has_sire: bool, has_dam: bool) -> String {
    let sire = has_sire.then(|| format!("S:{}", option.sire_ring_number.as_deref().unwrap_or("")));
    let dam = has_dam.then(|| format!("D:{}", option.dam_ring_number.as_deref().unwrap_or("")));
    [
        option.name.clone(),
        option.ring_number.clone(),
        option.personal_number.clone(),
        option.color.clone(),
        option.bloodline.clone(),
        sire,
        dam,
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Owned males and females, excluding the pigeon being edited
pub fn parent_options(conn: &Connection, owner: i64, exclude: Option<i64>) -> Result<ParentOptions> {
    Ok(ParentOptions {
        sires: parent_list(conn, owner, Gender::Male, exclude)?,
        dams: parent_list(conn, owner, Gender::Female, exclude)?,
    })
}

/// Five-generation pedigree of an owned pigeon
pub fn pedigree(conn: &Connection, owner: i64, id: i64) -> Result<PedigreeNode> {
    get(conn, owner, id)?;
    pedigree::build_tree(conn, id, MAX_GENERATIONS)?.ok_or(LoftError::NotFound("pigeon"))
}

/// Owned pigeons that carry a ring number, in id order
pub fn ring_candidates(conn: &Connection, owner: i64) -> Result<Vec<PigeonSummary>> {
    let sql = format!(
        "SELECT {} FROM pigeons p WHERE p.user_id = ?1 AND p.ring_number IS NOT NULL ORDER BY p.id",
        SUMMARY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner], row_to_summary)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Exact and near-duplicate ring numbers among the owner's pigeons
pub fn check_ring_number(
    conn: &Connection,
    owner: i64,
    ring_number: &str,
    exclude_id: Option<i64>,
) -> Result<RingCheck<PigeonSummary>> {
    if ring_number.trim().is_empty() {
        return Ok(RingCheck::empty());
    }
    let candidates = ring_candidates(conn, owner)?;
    Ok(RingMatcher::default().check(ring_number, &candidates, exclude_id))
}

pub fn dashboard(conn: &Connection, owner: i64) -> Result<Dashboard> {
    let total_pigeons: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pigeons WHERE user_id = ?1",
        params![owner],
        |row| row.get(0),
    )?;
    let sql = format!(
        "SELECT {} FROM pigeons p WHERE p.user_id = ?1 ORDER BY p.created_at DESC, p.id DESC LIMIT ?2",
        PIGEON_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let recent = stmt
        .query_map(params![owner, DASHBOARD_RECENT], row_to_pigeon)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let recent_pigeons = recent
        .into_iter()
        .map(|p| view(conn, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(Dashboard {
        total_pigeons,
        recent_pigeons,
    })
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Input after validation: typed, trimmed, ownership checked
struct ValidPigeon {
    name: Option<String>,
    ring_number: String,
    personal_number: Option<String>,
    color: Option<String>,
    color_tag_id: Option<i64>,
    gender: Option<Gender>,
    hatch_date: Option<NaiveDate>,
    status: PigeonStatus,
    remarks: Option<String>,
    notes: Option<String>,
    photo_url: Option<String>,
    pedigree_images: Option<Vec<String>>,
    for_sale: bool,
    sale_price: Option<f64>,
    hide_price: bool,
    sale_description: Option<String>,
    sire_id: Option<i64>,
    dam_id: Option<i64>,
    sire_legacy: LegacyParent,
    dam_legacy: LegacyParent,
    pairing_id: Option<i64>,
    clutch_id: Option<i64>,
}

fn owned_with_gender(conn: &Connection, owner: i64, id: i64, gender: Gender) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pigeons WHERE id = ?1 AND user_id = ?2 AND gender = ?3)",
        params![id, owner, gender],
        |row| row.get(0),
    )?)
}

fn legacy_parent(v: &mut Validator, prefix: &str, name: &Option<String>, ring: &Option<String>, color: &Option<String>, notes: &Option<String>) -> LegacyParent {
    LegacyParent {
        name: v.optional(&format!("{}_name", prefix), name.as_deref(), Some(MAX_STRING)),
        ring_number: v.optional(&format!("{}_ring_number", prefix), ring.as_deref(), Some(MAX_STRING)),
        color: v.optional(&format!("{}_color", prefix), color.as_deref(), Some(MAX_STRING)),
        notes: v.optional(&format!("{}_notes", prefix), notes.as_deref(), None),
    }
}

fn validate(
    conn: &Connection,
    owner: i64,
    input: &PigeonInput,
    self_id: Option<i64>,
) -> Result<ValidPigeon> {
    let mut v = Validator::new();

    let ring_number = v.required("ring_number", input.ring_number.as_deref(), MAX_STRING);
    let name = v.optional("name", input.name.as_deref(), Some(MAX_STRING));
    let personal_number = v.optional("personal_number", input.personal_number.as_deref(), Some(MAX_STRING));
    let color = v.optional("color", input.color.as_deref(), Some(MAX_STRING));
    let gender = v.choice::<Gender>("gender", input.gender.as_deref());
    let status = v
        .choice::<PigeonStatus>("status", input.status.as_deref())
        .unwrap_or_default();
    let hatch_date = v.date("hatch_date", input.hatch_date.as_deref());
    let remarks = v.optional("remarks", input.remarks.as_deref(), None);
    let notes = v.optional("notes", input.notes.as_deref(), None);
    let photo_url = v.url("photo_url", input.photo_url.as_deref());
    let pedigree_images = input
        .pedigree_images
        .as_ref()
        .map(|urls| v.urls("pedigree_images", urls));
    let sale_price = v.min_number("sale_price", input.sale_price, 0.0);
    let sale_description = v.optional("sale_description", input.sale_description.as_deref(), None);

    let sire_legacy = legacy_parent(
        &mut v,
        "sire",
        &input.sire_name,
        &input.sire_ring_number,
        &input.sire_color,
        &input.sire_notes,
    );
    let dam_legacy = legacy_parent(
        &mut v,
        "dam",
        &input.dam_name,
        &input.dam_ring_number,
        &input.dam_color,
        &input.dam_notes,
    );

    // Parents: owned, right gender, never the pigeon itself
    for (field, id, gender) in [
        ("sire_id", input.sire_id, Gender::Male),
        ("dam_id", input.dam_id, Gender::Female),
    ] {
        let Some(id) = id else { continue };
        if self_id == Some(id) {
            v.error(field, format!("The {} field cannot reference the pigeon itself.", field.replace('_', " ")));
        } else if !owned_with_gender(conn, owner, id, gender)? {
            v.error(field, format!("The selected {} is invalid.", field.replace('_', " ")));
        }
    }

    if let Some(tag_id) = input.color_tag_id {
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM color_tags WHERE id = ?1 AND user_id = ?2)",
            params![tag_id, owner],
            |row| row.get(0),
        )?;
        if !owned {
            v.error("color_tag_id", "The selected color tag id is invalid.");
        }
    }

    if let Some(pairing_id) = input.pairing_id {
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pairings WHERE id = ?1 AND user_id = ?2)",
            params![pairing_id, owner],
            |row| row.get(0),
        )?;
        if !owned {
            v.error("pairing_id", "The selected pairing id is invalid.");
        }
    }

    if let Some(clutch_id) = input.clutch_id {
        let clutch_pairing: Option<i64> = conn
            .query_row(
                "SELECT c.pairing_id FROM clutches c JOIN pairings pr ON pr.id = c.pairing_id
                 WHERE c.id = ?1 AND pr.user_id = ?2",
                params![clutch_id, owner],
                |row| row.get(0),
            )
            .optional()?;
        match (clutch_pairing, input.pairing_id) {
            (None, _) => v.error("clutch_id", "The selected clutch id is invalid."),
            (Some(found), Some(given)) if found != given => {
                v.error("clutch_id", "The clutch does not belong to the selected pairing.")
            }
            _ => {}
        }
    }

    if let Some(choices) = &input.bloodlines {
        bloodline::validate_choices(conn, owner, choices, &mut v)?;
    }

    v.finish()?;

    Ok(ValidPigeon {
        name,
        ring_number,
        personal_number,
        color,
        color_tag_id: input.color_tag_id,
        gender,
        hatch_date,
        status,
        remarks,
        notes,
        photo_url,
        pedigree_images,
        for_sale: input.for_sale.unwrap_or(false),
        sale_price,
        hide_price: input.hide_price.unwrap_or(false),
        sale_description,
        sire_id: input.sire_id,
        dam_id: input.dam_id,
        sire_legacy,
        dam_legacy,
        pairing_id: input.pairing_id,
        clutch_id: input.clutch_id,
    })
}

// ============================================================================
// WRITES
// ============================================================================

pub fn create(conn: &Connection, owner: i64, input: &PigeonInput) -> Result<Pigeon> {
    create_with_hash(conn, owner, input, None)
}

/// Create, optionally tagging the row with an import hash
pub(crate) fn create_with_hash(
    conn: &Connection,
    owner: i64,
    input: &PigeonInput,
    import_hash: Option<&str>,
) -> Result<Pigeon> {
    let p = validate(conn, owner, input, None)?;
    let images = to_json_list(p.pedigree_images.as_deref().unwrap_or(&[]))?;
    let timestamp = now();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO pigeons (
            user_id, name, ring_number, personal_number, color, color_tag_id, gender,
            hatch_date, status, remarks, notes, photo_url, pedigree_images, for_sale,
            sale_price, hide_price, sale_description, sire_id, dam_id,
            sire_name, sire_ring_number, sire_color, sire_notes,
            dam_name, dam_ring_number, dam_color, dam_notes,
            pairing_id, clutch_id, import_hash, created_at, updated_at
        ) VALUES (
            :user_id, :name, :ring_number, :personal_number, :color, :color_tag_id, :gender,
            :hatch_date, :status, :remarks, :notes, :photo_url, :pedigree_images, :for_sale,
            :sale_price, :hide_price, :sale_description, :sire_id, :dam_id,
            :sire_name, :sire_ring_number, :sire_color, :sire_notes,
            :dam_name, :dam_ring_number, :dam_color, :dam_notes,
            :pairing_id, :clutch_id, :import_hash, :ts, :ts
        )",
        named_params! {
            ":user_id": owner,
            ":name": p.name,
            ":ring_number": p.ring_number,
            ":personal_number": p.personal_number,
            ":color": p.color,
            ":color_tag_id": p.color_tag_id,
            ":gender": p.gender,
            ":hatch_date": p.hatch_date,
            ":status": p.status,
            ":remarks": p.remarks,
            ":notes": p.notes,
            ":photo_url": p.photo_url,
            ":pedigree_images": images,
            ":for_sale": p.for_sale,
            ":sale_price": p.sale_price,
            ":hide_price": p.hide_price,
            ":sale_description": p.sale_description,
            ":sire_id": p.sire_id,
            ":dam_id": p.dam_id,
            ":sire_name": p.sire_legacy.name,
            ":sire_ring_number": p.sire_legacy.ring_number,
            ":sire_color": p.sire_legacy.color,
            ":sire_notes": p.sire_legacy.notes,
            ":dam_name": p.dam_legacy.name,
            ":dam_ring_number": p.dam_legacy.ring_number,
            ":dam_color": p.dam_legacy.color,
            ":dam_notes": p.dam_legacy.notes,
            ":pairing_id": p.pairing_id,
            ":clutch_id": p.clutch_id,
            ":import_hash": import_hash,
            ":ts": timestamp,
        },
    )?;
    let id = tx.last_insert_rowid();

    if let Some(choices) = &input.bloodlines {
        bloodline::sync_pigeon(&tx, owner, id, choices)?;
    }
    tx.commit()?;

    tracing::info!(pigeon_id = id, ring_number = %p.ring_number, "pigeon created");
    get(conn, owner, id)
}

pub fn update(conn: &Connection, owner: i64, id: i64, input: &PigeonInput) -> Result<Pigeon> {
    let existing = get(conn, owner, id)?;
    let p = validate(conn, owner, input, Some(id))?;
    let images = match &p.pedigree_images {
        Some(list) => to_json_list(list)?,
        None => to_json_list(&existing.pedigree_images)?,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE pigeons SET
            name = :name, ring_number = :ring_number, personal_number = :personal_number,
            color = :color, color_tag_id = :color_tag_id, gender = :gender,
            hatch_date = :hatch_date, status = :status, remarks = :remarks, notes = :notes,
            photo_url = :photo_url, pedigree_images = :pedigree_images, for_sale = :for_sale,
            sale_price = :sale_price, hide_price = :hide_price,
            sale_description = :sale_description, sire_id = :sire_id, dam_id = :dam_id,
            sire_name = :sire_name, sire_ring_number = :sire_ring_number,
            sire_color = :sire_color, sire_notes = :sire_notes,
            dam_name = :dam_name, dam_ring_number = :dam_ring_number,
            dam_color = :dam_color, dam_notes = :dam_notes,
            pairing_id = :pairing_id, clutch_id = :clutch_id, updated_at = :ts
         WHERE id = :id",
        named_params! {
            ":id": id,
            ":name": p.name,
            ":ring_number": p.ring_number,
            ":personal_number": p.personal_number,
            ":color": p.color,
            ":color_tag_id": p.color_tag_id,
            ":gender": p.gender,
            ":hatch_date": p.hatch_date,
            ":status": p.status,
            ":remarks": p.remarks,
            ":notes": p.notes,
            ":photo_url": p.photo_url,
            ":pedigree_images": images,
            ":for_sale": p.for_sale,
            ":sale_price": p.sale_price,
            ":hide_price": p.hide_price,
            ":sale_description": p.sale_description,
            ":sire_id": p.sire_id,
            ":dam_id": p.dam_id,
            ":sire_name": p.sire_legacy.name,
            ":sire_ring_number": p.sire_legacy.ring_number,
            ":sire_color": p.sire_legacy.color,
            ":sire_notes": p.sire_legacy.notes,
            ":dam_name": p.dam_legacy.name,
            ":dam_ring_number": p.dam_legacy.ring_number,
            ":dam_color": p.dam_legacy.color,
            ":dam_notes": p.dam_legacy.notes,
            ":pairing_id": p.pairing_id,
            ":clutch_id": p.clutch_id,
            ":ts": now(),
        },
    )?;

    if let Some(choices) = &input.bloodlines {
        bloodline::sync_pigeon(&tx, owner, id, choices)?;
    }
    tx.commit()?;

    tracing::debug!(pigeon_id = id, "pigeon updated");
    get(conn, owner, id)
}

/// Children lose the parent link; pairings with the pigeon go with it
pub fn delete(conn: &Connection, owner: i64, id: i64) -> Result<()> {
    get(conn, owner, id)?;
    conn.execute("DELETE FROM pigeons WHERE id = ?1", params![id])?;
    tracing::info!(pigeon_id = id, "pigeon deleted");
    Ok(())
}

/// Set the status of several pigeons at once (pairing transitions)
pub(crate) fn set_status(conn: &Connection, ids: &[i64], status: PigeonStatus) -> Result<()> {
    let mut stmt = conn.prepare("UPDATE pigeons SET status = ?1, updated_at = ?2 WHERE id = ?3")?;
    let timestamp = now();
    for id in ids {
        stmt.execute(params![status, timestamp, id])?;
    }
    tracing::debug!(?ids, status = %status, "pigeon status changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_support::{add_pigeon, pigeon_input, second_user, test_db};

    #[test]
    fn test_create_applies_defaults() {
        let (conn, owner) = test_db();
        let input = PigeonInput {
            ring_number: Some("  BE-2024-1234567 ".into()),
            name: Some("".into()),
            ..Default::default()
        };
        let pigeon = create(&conn, owner, &input).unwrap();

        assert_eq!(pigeon.ring_number.as_deref(), Some("BE-2024-1234567"));
        assert_eq!(pigeon.name, None);
        assert_eq!(pigeon.status, PigeonStatus::Stock);
        assert!(pigeon.pedigree_images.is_empty());
        assert_eq!(pigeon.label(), "BE-2024-1234567");
    }

    #[test]
    fn test_create_validation_failures_write_nothing() {
        let (conn, owner) = test_db();
        let input = PigeonInput {
            ring_number: None,
            gender: Some("hen".into()),
            status: Some("retired".into()),
            hatch_date: Some("2024-13-40".into()),
            sale_price: Some(-5.0),
            pedigree_images: Some(vec!["nope".into()]),
            ..Default::default()
        };
        let err = create(&conn, owner, &input).unwrap_err();
        let LoftError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["ring_number", "gender", "status", "hatch_date", "sale_price", "pedigree_images.0"] {
            assert!(errors.contains(field), "missing error for {field}");
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pigeons", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_parent_rules() {
        let (conn, owner) = test_db();
        let cock = add_pigeon(&conn, owner, "NL-2020-1", Some(Gender::Male));
        let hen = add_pigeon(&conn, owner, "NL-2020-2", Some(Gender::Female));

        // Sire must be male
        let mut input = pigeon_input("NL-2024-9", None, PigeonStatus::Stock);
        input.sire_id = Some(hen);
        assert!(matches!(create(&conn, owner, &input), Err(LoftError::Validation(e)) if e.contains("sire_id")));

        // Foreign parents are invalid
        let other = second_user(&conn);
        let foreign_hen = add_pigeon(&conn, other, "DE-2020-5", Some(Gender::Female));
        input.sire_id = Some(cock);
        input.dam_id = Some(foreign_hen);
        assert!(matches!(create(&conn, owner, &input), Err(LoftError::Validation(e)) if e.contains("dam_id")));

        input.dam_id = Some(hen);
        let child = create(&conn, owner, &input).unwrap();
        assert_eq!(child.sire_id, Some(cock));
        assert_eq!(child.dam_id, Some(hen));

        // A pigeon cannot be its own sire
        let mut self_ref = pigeon_input("NL-2020-1", Some(Gender::Male), PigeonStatus::Stock);
        self_ref.sire_id = Some(cock);
        assert!(matches!(update(&conn, owner, cock, &self_ref), Err(LoftError::Validation(e)) if e.contains("sire_id")));
    }

    #[test]
    fn test_foreign_pigeon_is_not_found() {
        let (conn, owner) = test_db();
        let other = second_user(&conn);
        let theirs = add_pigeon(&conn, other, "DE-2021-77", None);

        assert!(matches!(get(&conn, owner, theirs), Err(LoftError::NotFound(_))));
        assert!(matches!(delete(&conn, owner, theirs), Err(LoftError::NotFound(_))));
        assert!(matches!(pedigree(&conn, owner, theirs), Err(LoftError::NotFound(_))));
    }

    #[test]
    fn test_update_keeps_images_and_bloodlines_when_absent() {
        let (conn, owner) = test_db();
        let mut input = pigeon_input("BE-2023-55", Some(Gender::Female), PigeonStatus::Racing);
        input.pedigree_images = Some(vec!["https://img.example.com/p1.webp".into()]);
        input.bloodlines = Some(vec![BloodlineChoice::named("janssen", true)]);
        let pigeon = create(&conn, owner, &input).unwrap();
        assert_eq!(pigeon.bloodline.as_deref(), Some("JANSSEN"));

        let mut edit = pigeon_input("BE-2023-55", Some(Gender::Female), PigeonStatus::Breeding);
        edit.name = Some("Blue Lady".into());
        let updated = update(&conn, owner, pigeon.id, &edit).unwrap();
        assert_eq!(updated.pedigree_images.len(), 1);
        assert_eq!(updated.bloodline.as_deref(), Some("JANSSEN"));
        assert_eq!(updated.status, PigeonStatus::Breeding);

        edit.bloodlines = Some(vec![]);
        edit.pedigree_images = Some(vec![]);
        let cleared = update(&conn, owner, pigeon.id, &edit).unwrap();
        assert!(cleared.pedigree_images.is_empty());
        assert_eq!(cleared.bloodline, None);
    }

    #[test]
    fn test_list_filters_and_pagination() {
        let (conn, owner) = test_db();
        for i in 0..14 {
            let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
            let status = if i < 4 { PigeonStatus::Racing } else { PigeonStatus::Stock };
            create(&conn, owner, &pigeon_input(&format!("BE-2024-{:03}", i), Some(gender), status)).unwrap();
        }
        let mut tagged = pigeon_input("NL-2022-900", Some(Gender::Male), PigeonStatus::Breeding);
        tagged.bloodlines = Some(vec![BloodlineChoice::named("Sion", true)]);
        create(&conn, owner, &tagged).unwrap();

        let other = second_user(&conn);
        add_pigeon(&conn, other, "BE-2024-999", None);

        let all = list(&conn, owner, &PigeonFilter::default()).unwrap();
        assert_eq!(all.total, 15);
        assert_eq!(all.per_page, 12);
        assert_eq!(all.data.len(), 12);
        assert_eq!(all.last_page, 2);
        // Newest first
        assert_eq!(all.data[0].pigeon.ring_number.as_deref(), Some("NL-2022-900"));

        let odd_size = PigeonFilter { per_page: Some(50), ..Default::default() };
        assert_eq!(list(&conn, owner, &odd_size).unwrap().per_page, 12);

        let page_two = PigeonFilter { page: Some(2), ..Default::default() };
        assert_eq!(list(&conn, owner, &page_two).unwrap().data.len(), 3);

        let hens = PigeonFilter { gender: Some("female".into()), ..Default::default() };
        assert_eq!(list(&conn, owner, &hens).unwrap().total, 7);

        let statuses = PigeonFilter { status: Some("racing,breeding".into()), ..Default::default() };
        assert_eq!(list(&conn, owner, &statuses).unwrap().total, 5);

        let by_linked_name = PigeonFilter { search: Some("sio".into()), ..Default::default() };
        assert_eq!(list(&conn, owner, &by_linked_name).unwrap().total, 1);

        let by_legacy = PigeonFilter { bloodline: Some("SION".into()), ..Default::default() };
        assert_eq!(list(&conn, owner, &by_legacy).unwrap().total, 1);

        let sion = bloodline::search(&conn, owner, "sion").unwrap();
        let by_id = PigeonFilter { bloodline: Some(sion[0].id.to_string()), ..Default::default() };
        assert_eq!(list(&conn, owner, &by_id).unwrap().total, 1);
    }

    #[test]
    fn test_parent_options_labels() {
        let (conn, owner) = test_db();
        let grand_sire = add_pigeon(&conn, owner, "BE-2018-1", Some(Gender::Male));
        let mut input = pigeon_input("BE-2021-7", Some(Gender::Male), PigeonStatus::Stock);
        input.name = Some("Kleine".into());
        input.color = Some("Blue".into());
        input.sire_id = Some(grand_sire);
        let cock = create(&conn, owner, &input).unwrap();
        add_pigeon(&conn, owner, "BE-2021-8", Some(Gender::Female));

        let options = parent_options(&conn, owner, Some(grand_sire)).unwrap();
        assert_eq!(options.sires.len(), 1);
        assert_eq!(options.dams.len(), 1);
        assert_eq!(options.sires[0].id, cock.id);
        assert_eq!(options.sires[0].label, "Kleine BE-2021-7 Blue S:BE-2018-1");
    }

    #[test]
    fn test_colors_distinct_sorted() {
        let (conn, owner) = test_db();
        for (ring, color) in [("A-1", "Red"), ("A-2", "Blue"), ("A-3", "Red")] {
            let mut input = pigeon_input(ring, None, PigeonStatus::Stock);
            input.color = Some(color.into());
            create(&conn, owner, &input).unwrap();
        }
        add_pigeon(&conn, owner, "A-4", None);
        assert_eq!(colors(&conn, owner).unwrap(), vec!["Blue".to_string(), "Red".to_string()]);
    }

    #[test]
    fn test_check_ring_number_scoped_to_owner() {
        let (conn, owner) = test_db();
        let mine = add_pigeon(&conn, owner, "BE-2024-1234567", None);
        let other = second_user(&conn);
        add_pigeon(&conn, other, "BE-2024-1234568", None);

        let check = check_ring_number(&conn, owner, "be 2024 1234567", None).unwrap();
        assert_eq!(check.exact_match.as_ref().map(|p| p.id), Some(mine));
        assert!(check.similar_matches.is_empty());

        let excluded = check_ring_number(&conn, owner, "BE-2024-1234567", Some(mine)).unwrap();
        assert!(excluded.exact_match.is_none());

        let blank = check_ring_number(&conn, owner, "   ", None).unwrap();
        assert!(blank.exact_match.is_none() && blank.similar_matches.is_empty());
    }

    #[test]
    fn test_dashboard_counts_and_recent() {
        let (conn, owner) = test_db();
        for i in 0..7 {
            add_pigeon(&conn, owner, &format!("BE-2024-{}", i), None);
        }
        let dash = dashboard(&conn, owner).unwrap();
        assert_eq!(dash.total_pigeons, 7);
        assert_eq!(dash.recent_pigeons.len(), 5);
        assert_eq!(dash.recent_pigeons[0].pigeon.ring_number.as_deref(), Some("BE-2024-6"));
    }

    #[test]
    fn test_delete_clears_child_links() {
        let (conn, owner) = test_db();
        let sire = add_pigeon(&conn, owner, "BE-2019-1", Some(Gender::Male));
        let mut input = pigeon_input("BE-2023-1", None, PigeonStatus::Stock);
        input.sire_id = Some(sire);
        let child = create(&conn, owner, &input).unwrap();

        delete(&conn, owner, sire).unwrap();
        assert_eq!(get(&conn, owner, child.id).unwrap().sire_id, None);
    }
}
