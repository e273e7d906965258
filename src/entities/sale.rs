// 💰 Sales - listings a breeder puts up, and the public marketplace over them

use super::ensure_owner;
use super::pigeon::{row_to_summary_at, PigeonSummary, SUMMARY_COLUMNS};
use crate::db::{json_list, now, to_json_list};
use crate::error::{LoftError, Result};
use crate::validation::Validator;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

string_enum! {
    SaleStatus {
        Active => "active",
        Sold => "sold",
        Cancelled => "cancelled",
    }
    default Active
}

#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    pub id: i64,
    pub user_id: i64,
    pub pigeon_id: i64,
    pub price: Option<f64>,
    pub hide_price: bool,
    pub description: Option<String>,
    pub additional_photos: Vec<String>,
    pub status: SaleStatus,
    pub sold_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub pigeon: PigeonSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleInput {
    pub pigeon_id: Option<i64>,
    pub price: Option<f64>,
    pub hide_price: Option<bool>,
    pub description: Option<String>,
    #[serde(default)]
    pub additional_photos: Vec<String>,
}

/// Parent reference shown next to a pigeon on offer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentRef {
    pub id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferedPigeon {
    #[serde(flatten)]
    pub summary: PigeonSummary,
    pub hatch_date: Option<NaiveDate>,
    pub sire: Option<ParentRef>,
    pub dam: Option<ParentRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesIndex {
    /// Owned pigeons not in an active sale
    pub available_pigeons: Vec<OfferedPigeon>,
    pub active_sales: Vec<Sale>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellerContact {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub id: i64,
    /// `None` when the seller hides the price
    pub price: Option<f64>,
    pub hide_price: bool,
    pub description: Option<String>,
    pub additional_photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub pigeon: OfferedPigeon,
    pub owner: SellerContact,
}

// ============================================================================
// QUERIES
// ============================================================================

const SALE_COLUMNS: &str = "s.id, s.user_id, s.pigeon_id, s.price, s.hide_price, s.description,
     s.additional_photos, s.status, s.sold_at, s.created_at";

fn sale_sql(filter: &str) -> String {
    format!(
        "SELECT {}, {} FROM sales s JOIN pigeons p ON p.id = s.pigeon_id WHERE {}",
        SALE_COLUMNS, SUMMARY_COLUMNS, filter
    )
}

fn row_to_sale(row: &rusqlite::Row) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pigeon_id: row.get(2)?,
        price: row.get(3)?,
        hide_price: row.get(4)?,
        description: row.get(5)?,
        additional_photos: json_list(row.get(6)?),
        status: row.get(7)?,
        sold_at: row.get(8)?,
        created_at: row.get(9)?,
        pigeon: row_to_summary_at(row, 10)?,
    })
}

/// Pigeon columns plus hatch date and both parents; `filter` may use `p.`
fn offered_sql(extra_columns: &str, from: &str, filter: &str) -> String {
    format!(
        "SELECT {summary}, p.hatch_date,
                sire.id, sire.name, sire.ring_number,
                dam.id, dam.name, dam.ring_number{extra}
         FROM {from}
         LEFT JOIN pigeons sire ON sire.id = p.sire_id
         LEFT JOIN pigeons dam ON dam.id = p.dam_id
         WHERE {filter}",
        summary = SUMMARY_COLUMNS,
        extra = extra_columns,
        from = from,
        filter = filter,
    )
}

fn parent_ref(row: &rusqlite::Row, start: usize) -> rusqlite::Result<Option<ParentRef>> {
    let id: Option<i64> = row.get(start)?;
    Ok(match id {
        Some(id) => Some(ParentRef {
            id,
            name: row.get(start + 1)?,
            ring_number: row.get(start + 2)?,
        }),
        None => None,
    })
}

/// Reads the offered-pigeon block; returns it and the next column index
fn row_to_offered(row: &rusqlite::Row) -> rusqlite::Result<(OfferedPigeon, usize)> {
    let offered = OfferedPigeon {
        summary: row_to_summary_at(row, 0)?,
        hatch_date: row.get(9)?,
        sire: parent_ref(row, 10)?,
        dam: parent_ref(row, 13)?,
    };
    Ok((offered, 16))
}

pub fn get(conn: &Connection, owner: i64, id: i64) -> Result<Sale> {
    let sale = conn
        .query_row(&sale_sql("s.id = ?1"), params![id], row_to_sale)
        .optional()?
        .ok_or(LoftError::NotFound("sale"))?;
    ensure_owner(sale.user_id, owner)?;
    Ok(sale)
}

pub fn index(conn: &Connection, owner: i64) -> Result<SalesIndex> {
    let sql = offered_sql(
        "",
        "pigeons p",
        "p.user_id = ?1 AND p.id NOT IN
            (SELECT pigeon_id FROM sales WHERE user_id = ?1 AND status = 'active')
         ORDER BY p.name, p.ring_number",
    );
    let mut stmt = conn.prepare(&sql)?;
    let available_pigeons = stmt
        .query_map(params![owner], |row| row_to_offered(row).map(|(p, _)| p))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let sql = format!(
        "{} ORDER BY s.created_at DESC, s.id DESC",
        sale_sql("s.user_id = ?1 AND s.status = 'active'")
    );
    let mut stmt = conn.prepare(&sql)?;
    let active_sales = stmt
        .query_map(params![owner], row_to_sale)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(SalesIndex {
        available_pigeons,
        active_sales,
    })
}

pub fn create(conn: &Connection, owner: i64, input: &SaleInput) -> Result<Sale> {
    let mut v = Validator::new();
    let price = v.min_number("price", input.price, 0.0);
    let description = v.optional("description", input.description.as_deref(), None);
    let photos = v.urls("additional_photos", &input.additional_photos);

    match input.pigeon_id {
        None => v.error("pigeon_id", "The pigeon id field is required."),
        Some(pigeon_id) => {
            let owned: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM pigeons WHERE id = ?1 AND user_id = ?2)",
                params![pigeon_id, owner],
                |row| row.get(0),
            )?;
            let listed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sales WHERE pigeon_id = ?1 AND status = 'active')",
                params![pigeon_id],
                |row| row.get(0),
            )?;
            if !owned {
                v.error("pigeon_id", "The selected pigeon id is invalid.");
            } else if listed {
                v.error("pigeon_id", "This pigeon is already listed for sale.");
            }
        }
    }
    v.finish()?;

    conn.execute(
        "INSERT INTO sales (user_id, pigeon_id, price, hide_price, description, additional_photos,
                            status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            owner,
            input.pigeon_id,
            price,
            input.hide_price.unwrap_or(false),
            description,
            to_json_list(&photos)?,
            SaleStatus::Active,
            now()
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(sale_id = id, pigeon_id = ?input.pigeon_id, "pigeon listed for sale");
    get(conn, owner, id)
}

pub fn delete(conn: &Connection, owner: i64, id: i64) -> Result<()> {
    get(conn, owner, id)?;
    conn.execute("DELETE FROM sales WHERE id = ?1", params![id])?;
    tracing::info!(sale_id = id, "sale listing removed");
    Ok(())
}

pub fn mark_sold(conn: &Connection, owner: i64, id: i64) -> Result<Sale> {
    let sale = get(conn, owner, id)?;
    if sale.status != SaleStatus::Active {
        return Err(LoftError::validation("status", "This sale is no longer active."));
    }
    conn.execute(
        "UPDATE sales SET status = ?1, sold_at = ?2 WHERE id = ?3",
        params![SaleStatus::Sold, now(), id],
    )?;
    tracing::info!(sale_id = id, "sale marked sold");
    get(conn, owner, id)
}

/// Every active listing, newest first; needs no identity
pub fn marketplace(conn: &Connection) -> Result<Vec<Listing>> {
    let sql = offered_sql(
        ",
                s.id, s.price, s.hide_price, s.description, s.additional_photos, s.created_at,
                u.id, u.name, u.email",
        "sales s JOIN pigeons p ON p.id = s.pigeon_id JOIN users u ON u.id = s.user_id",
        "s.status = 'active' ORDER BY s.created_at DESC, s.id DESC",
    );
    let mut stmt = conn.prepare(&sql)?;
    let listings = stmt
        .query_map([], |row| {
            let (pigeon, i) = row_to_offered(row)?;
            let hide_price: bool = row.get(i + 2)?;
            let price: Option<f64> = row.get(i + 1)?;
            Ok(Listing {
                id: row.get(i)?,
                price: if hide_price { None } else { price },
                hide_price,
                description: row.get(i + 3)?,
                additional_photos: json_list(row.get(i + 4)?),
                created_at: row.get(i + 5)?,
                pigeon,
                owner: SellerContact {
                    id: row.get(i + 6)?,
                    name: row.get(i + 7)?,
                    email: row.get(i + 8)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(listings)
}
