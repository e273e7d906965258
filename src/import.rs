// 📥 CSV Import - bulk-load pigeons from a spreadsheet export
//
// Columns: name, ring_number, personal_number, gender, color, bloodline,
// status, hatch_date. Each row goes through the same validation as a
// hand-entered pigeon. Re-running an import is safe: every row carries a
// hash of owner + normalized ring number, and a row whose hash already
// exists is counted as a duplicate.

use crate::entities::bloodline::BloodlineChoice;
use crate::entities::pigeon::{self, PigeonInput};
use crate::error::{LoftError, Result};
use crate::ring_match::normalize;
use csv::{Position, ReaderBuilder, Trim};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ring_number: Option<String>,
    #[serde(default)]
    pub personal_number: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub bloodline: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hatch_date: Option<String>,
}

impl ImportRow {
    fn into_input(self) -> PigeonInput {
        let bloodlines = self
            .bloodline
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(|b| vec![BloodlineChoice::named(b, true)]);
        PigeonInput {
            name: self.name,
            ring_number: self.ring_number,
            personal_number: self.personal_number,
            gender: self.gender,
            color: self.color,
            status: self.status,
            hatch_date: self.hatch_date,
            bloodlines,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the file, header included
    pub line: usize,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedRow>,
}

/// SHA-256 of owner + normalized ring; `None` for rows without a ring
pub fn import_hash(owner: i64, ring_number: Option<&str>) -> Option<String> {
    let ring = normalize(ring_number?);
    if ring.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", owner, ring));
    Some(format!("{:x}", hasher.finalize()))
}

fn already_imported(conn: &Connection, hash: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pigeons WHERE import_hash = ?1)",
        params![hash],
        |row| row.get(0),
    )?)
}

fn line_of(position: Option<&Position>) -> usize {
    position.map_or(0, |p| p.line() as usize)
}

pub fn import_csv(conn: &Connection, owner: i64, path: &Path) -> Result<ImportReport> {
    let file = File::open(path)?;
    import_reader(conn, owner, file)
}

pub fn import_reader<R: Read>(conn: &Connection, owner: i64, reader: R) -> Result<ImportReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut report = ImportReport {
        batch_id: uuid::Uuid::new_v4().to_string(),
        inserted: 0,
        duplicates: 0,
        rejected: Vec::new(),
    };

    let headers = reader.headers()?.clone();
    for record in reader.records() {
        // Quoted fields may span lines; use the position the reader reports
        let (line, parsed) = match record {
            Ok(record) => (
                line_of(record.position()),
                record.deserialize::<ImportRow>(Some(&headers)),
            ),
            Err(e) => (line_of(e.position()), Err(e)),
        };
        let row = match parsed {
            Ok(row) => row,
            Err(e) => {
                let mut errors = BTreeMap::new();
                errors.insert("row".to_string(), e.to_string());
                report.rejected.push(RejectedRow { line, errors });
                continue;
            }
        };

        let hash = import_hash(owner, row.ring_number.as_deref());
        if let Some(hash) = &hash {
            if already_imported(conn, hash)? {
                report.duplicates += 1;
                continue;
            }
        }

        match pigeon::create_with_hash(conn, owner, &row.into_input(), hash.as_deref()) {
            Ok(_) => report.inserted += 1,
            Err(LoftError::Validation(errors)) => {
                report.rejected.push(RejectedRow {
                    line,
                    errors: errors.fields().clone(),
                });
            }
            // Same ring twice in one file
            Err(LoftError::Database(e)) if crate::db::is_constraint_violation(&e) => {
                report.duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        batch_id = %report.batch_id,
        inserted = report.inserted,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "pigeon import finished"
    );
    Ok(report)
}
