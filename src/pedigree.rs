// 🌳 Pedigree Tree - bounded walk up the sire/dam links
//
// Each node carries the pigeon's identifying fields plus its two parent
// branches. Recursion stops at a missing link or when the generation budget
// runs out. Shared ancestors show up once per branch they appear in.
//
// The walk never checks for cycles: a pigeon linked as its own ancestor
// through several records is cut off by the generation bound alone. A direct
// self-link (sire_id == id) is treated as no link.

use crate::entities::pigeon::{Gender, LegacyParent};
use crate::error::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

/// Deepest pedigree anyone can ask for
pub const MAX_GENERATIONS: u32 = 5;

/// What the walk needs to know about one pigeon
#[derive(Debug, Clone, Default)]
pub struct AncestorRecord {
    pub id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub gender: Option<Gender>,
    pub hatch_date: Option<NaiveDate>,
    pub sire_id: Option<i64>,
    pub dam_id: Option<i64>,
    pub sire_legacy: LegacyParent,
    pub dam_legacy: LegacyParent,
}

/// Anything that can look pigeons up by id
pub trait AncestorSource {
    fn ancestor(&self, id: i64) -> Result<Option<AncestorRecord>>;
}

impl AncestorSource for Connection {
    fn ancestor(&self, id: i64) -> Result<Option<AncestorRecord>> {
        let record = self
            .query_row(
                "SELECT id, name, ring_number, personal_number, color, gender, hatch_date,
                        sire_id, dam_id, sire_name, sire_ring_number, sire_color,
                        dam_name, dam_ring_number, dam_color
                 FROM pigeons WHERE id = ?1",
                params![id],
                |row| {
                    Ok(AncestorRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        ring_number: row.get(2)?,
                        personal_number: row.get(3)?,
                        color: row.get(4)?,
                        gender: row.get(5)?,
                        hatch_date: row.get(6)?,
                        sire_id: row.get(7)?,
                        dam_id: row.get(8)?,
                        sire_legacy: LegacyParent {
                            name: row.get(9)?,
                            ring_number: row.get(10)?,
                            color: row.get(11)?,
                            notes: None,
                        },
                        dam_legacy: LegacyParent {
                            name: row.get(12)?,
                            ring_number: row.get(13)?,
                            color: row.get(14)?,
                            notes: None,
                        },
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

impl AncestorSource for HashMap<i64, AncestorRecord> {
    fn ancestor(&self, id: i64) -> Result<Option<AncestorRecord>> {
        Ok(self.get(&id).cloned())
    }
}

/// Free-text ancestor shown as a leaf
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyAncestor {
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub color: Option<String>,
}

impl LegacyAncestor {
    fn from_parent(parent: &LegacyParent) -> Option<Self> {
        if parent.is_empty() {
            return None;
        }
        Some(LegacyAncestor {
            name: parent.name.clone(),
            ring_number: parent.ring_number.clone(),
            color: parent.color.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PedigreeNode {
    pub id: i64,
    pub name: Option<String>,
    pub ring_number: Option<String>,
    pub personal_number: Option<String>,
    pub color: Option<String>,
    pub gender: Option<Gender>,
    pub hatch_date: Option<NaiveDate>,
    pub label: String,
    pub sire: Option<Box<PedigreeNode>>,
    pub dam: Option<Box<PedigreeNode>>,
    pub sire_legacy: Option<LegacyAncestor>,
    pub dam_legacy: Option<LegacyAncestor>,
}

impl PedigreeNode {
    /// Generations in this tree (a lone node is 1)
    pub fn depth(&self) -> u32 {
        let sire = self.sire.as_ref().map_or(0, |n| n.depth());
        let dam = self.dam.as_ref().map_or(0, |n| n.depth());
        1 + sire.max(dam)
    }
}

/// First non-empty of name, ring number, personal number, else `Pigeon #id`
pub fn display_label(
    id: i64,
    name: Option<&str>,
    ring_number: Option<&str>,
    personal_number: Option<&str>,
) -> String {
    [name, ring_number, personal_number]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Pigeon #{}", id))
}

/// Build the ancestor tree of `pigeon_id`, `generations` deep (clamped to
/// [`MAX_GENERATIONS`]). `None` when the pigeon is missing or depth is 0.
pub fn build_tree<S: AncestorSource + ?Sized>(
    source: &S,
    pigeon_id: i64,
    generations: u32,
) -> Result<Option<PedigreeNode>> {
    walk(source, Some(pigeon_id), generations.min(MAX_GENERATIONS))
}

fn walk<S: AncestorSource + ?Sized>(
    source: &S,
    id: Option<i64>,
    generations: u32,
) -> Result<Option<PedigreeNode>> {
    let Some(id) = id else { return Ok(None) };
    if generations == 0 {
        return Ok(None);
    }
    let Some(record) = source.ancestor(id)? else {
        return Ok(None);
    };

    let sire_id = parent_link(record.id, record.sire_id);
    let dam_id = parent_link(record.id, record.dam_id);

    let sire = walk(source, sire_id, generations - 1)?.map(Box::new);
    let dam = walk(source, dam_id, generations - 1)?.map(Box::new);

    Ok(Some(PedigreeNode {
        label: display_label(
            record.id,
            record.name.as_deref(),
            record.ring_number.as_deref(),
            record.personal_number.as_deref(),
        ),
        sire_legacy: if sire_id.is_none() {
            LegacyAncestor::from_parent(&record.sire_legacy)
        } else {
            None
        },
        dam_legacy: if dam_id.is_none() {
            LegacyAncestor::from_parent(&record.dam_legacy)
        } else {
            None
        },
        id: record.id,
        name: record.name,
        ring_number: record.ring_number,
        personal_number: record.personal_number,
        color: record.color,
        gender: record.gender,
        hatch_date: record.hatch_date,
        sire,
        dam,
    }))
}

/// A link back to the pigeon itself counts as no link
fn parent_link(id: i64, parent: Option<i64>) -> Option<i64> {
    match parent {
        Some(p) if p == id => {
            tracing::warn!(pigeon_id = id, "pigeon is linked as its own parent, branch dropped");
            None
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, sire: Option<i64>, dam: Option<i64>) -> AncestorRecord {
        AncestorRecord {
            id,
            ring_number: Some(format!("BE-2020-{}", id)),
            sire_id: sire,
            dam_id: dam,
            ..Default::default()
        }
    }

    fn family(records: Vec<AncestorRecord>) -> HashMap<i64, AncestorRecord> {
        records.into_iter().map(|r| (r.id, r)).collect()
    }

    /// Straight line of `n` generations: 1 ← 2 ← 3 ...
    fn line(n: i64) -> HashMap<i64, AncestorRecord> {
        family((1..=n).map(|i| record(i, (i < n).then_some(i + 1), None)).collect())
    }

    #[test]
    fn test_no_ancestors() {
        let source = family(vec![record(1, None, None)]);
        for generations in 1..=MAX_GENERATIONS {
            let tree = build_tree(&source, 1, generations).unwrap().unwrap();
            assert!(tree.sire.is_none());
            assert!(tree.dam.is_none());
        }
    }

    #[test]
    fn test_zero_generations_and_missing_pigeon() {
        let source = line(3);
        assert!(build_tree(&source, 1, 0).unwrap().is_none());
        assert!(build_tree(&source, 99, 5).unwrap().is_none());
    }

    #[test]
    fn test_depth_never_exceeds_request() {
        let source = line(10);
        for generations in 1..=8 {
            let tree = build_tree(&source, 1, generations).unwrap().unwrap();
            assert_eq!(tree.depth(), generations.min(MAX_GENERATIONS));
        }
    }

    #[test]
    fn test_shared_ancestor_repeated() {
        // 1's sire and dam share the same sire (3)
        let source = family(vec![
            record(1, Some(2), Some(4)),
            record(2, Some(3), None),
            record(4, Some(3), None),
            record(3, None, None),
        ]);
        let tree = build_tree(&source, 1, 5).unwrap().unwrap();
        let via_sire = tree.sire.as_ref().unwrap().sire.as_ref().unwrap();
        let via_dam = tree.dam.as_ref().unwrap().sire.as_ref().unwrap();
        assert_eq!(via_sire.id, 3);
        assert_eq!(via_dam.id, 3);
    }

    #[test]
    fn test_self_reference_is_null_branch() {
        let source = family(vec![record(1, Some(1), None)]);
        let tree = build_tree(&source, 1, 5).unwrap().unwrap();
        assert!(tree.sire.is_none());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_mutual_cycle_bounded_by_depth() {
        let source = family(vec![record(1, Some(2), None), record(2, Some(1), None)]);
        let tree = build_tree(&source, 1, 5).unwrap().unwrap();
        assert_eq!(tree.depth(), 5);
    }

    #[test]
    fn test_legacy_leaf_only_without_link() {
        let mut child = record(1, None, Some(2));
        child.sire_legacy = LegacyParent {
            name: Some("Old Blue".into()),
            ring_number: Some("NL-1999-42".into()),
            ..Default::default()
        };
        child.dam_legacy = LegacyParent {
            name: Some("ignored".into()),
            ..Default::default()
        };
        let source = family(vec![child, record(2, None, None)]);

        let tree = build_tree(&source, 1, 5).unwrap().unwrap();
        let legacy = tree.sire_legacy.unwrap();
        assert_eq!(legacy.name.as_deref(), Some("Old Blue"));
        assert!(tree.sire.is_none());
        assert!(tree.dam.is_some());
        assert!(tree.dam_legacy.is_none());
    }

    #[test]
    fn test_labels() {
        assert_eq!(display_label(7, Some("Kannibaal"), Some("BE-1"), None), "Kannibaal");
        assert_eq!(display_label(7, Some(""), Some("BE-1"), None), "BE-1");
        assert_eq!(display_label(7, None, None, Some("P-12")), "P-12");
        assert_eq!(display_label(7, None, None, None), "Pigeon #7");
    }

    #[test]
    fn test_sqlite_source() {
        use crate::entities::test_support::{add_pigeon, pigeon_input, test_db};
        use crate::entities::{pigeon, PigeonStatus};

        let (conn, owner) = test_db();
        let sire = add_pigeon(&conn, owner, "BE-2018-1", Some(Gender::Male));
        let dam = add_pigeon(&conn, owner, "BE-2018-2", Some(Gender::Female));
        let mut input = pigeon_input("BE-2022-3", None, PigeonStatus::Stock);
        input.sire_id = Some(sire);
        input.dam_id = Some(dam);
        let child = pigeon::create(&conn, owner, &input).unwrap();

        let tree = build_tree(&conn, child.id, MAX_GENERATIONS).unwrap().unwrap();
        assert_eq!(tree.label, "BE-2022-3");
        assert_eq!(tree.sire.unwrap().label, "BE-2018-1");
        assert_eq!(tree.dam.unwrap().id, dam);
    }
}
