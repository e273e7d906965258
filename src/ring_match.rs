// 🔍 Ring Number Matcher - catch duplicate rings before they are saved
// Two strategies: Exact Match (normalized equality), Similar Match (containment,
// shared numeric run, scored by Levenshtein distance)

use serde::Serialize;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Uppercase and strip whitespace, `-` and `/`
///
/// `"usa 2025 00123"`, `"USA-2025-00123"` and `"USA/2025/00123"` all become
/// `"USA202500123"`.
pub fn normalize(ring_number: &str) -> String {
    ring_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '/')
        .flat_map(char::to_uppercase)
        .collect()
}

/// First run of ASCII digits in `s`
fn numeric_run(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Minimum single-character edits (insert, delete, substitute) between two strings
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows instead of the full matrix
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1) // deletion
                .min(curr[j] + 1) // insertion
                .min(prev[j] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity of two ring numbers in percent, with the default thresholds
pub fn similarity(a: &str, b: &str) -> u32 {
    RingMatcher::default().score(&normalize(a), &normalize(b))
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Anything with an id and a ring number can be matched
pub trait RingRecord {
    fn record_id(&self) -> i64;
    fn ring_number(&self) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMatch<T> {
    pub pigeon: T,
    /// 0-100
    pub similarity_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RingCheck<T> {
    pub exact_match: Option<T>,
    pub similar_matches: Vec<SimilarMatch<T>>,
}

impl<T> RingCheck<T> {
    pub fn empty() -> Self {
        RingCheck {
            exact_match: None,
            similar_matches: Vec::new(),
        }
    }
}

// ============================================================================
// RING MATCHER
// ============================================================================

#[derive(Debug, Clone)]
pub struct RingMatcher {
    /// Scores below this are dropped (default: 50)
    pub min_similarity: u32,

    /// Score given to a ring that contains the other, when the edit distance
    /// scores lower (default: 70)
    pub containment_floor: f64,

    /// Similar matches returned (default: 3)
    pub max_results: usize,

    /// Digits a numeric run needs before it is searched on its own (default: 4)
    pub min_numeric_run: usize,
}

impl Default for RingMatcher {
    fn default() -> Self {
        RingMatcher {
            min_similarity: 50,
            containment_floor: 70.0,
            max_results: 3,
            min_numeric_run: 4,
        }
    }
}

impl RingMatcher {
    /// Score two already-normalized ring numbers
    pub fn score(&self, a: &str, b: &str) -> u32 {
        let max_len = a.chars().count().max(b.chars().count());
        let mut score = if max_len == 0 {
            0.0
        } else {
            let distance = levenshtein_distance(a, b);
            (1.0 - distance as f64 / max_len as f64) * 100.0
        };

        if a.contains(b) || b.contains(a) {
            score = score.max(self.containment_floor);
        }

        score.round() as u32
    }

    /// Look `input` up among `records`.
    ///
    /// `exclude_id` drops the record being edited from both lists. Records
    /// without a ring number (or whose ring is only separators) never match.
    pub fn check<T: RingRecord + Clone>(
        &self,
        input: &str,
        records: &[T],
        exclude_id: Option<i64>,
    ) -> RingCheck<T> {
        let normalized = normalize(input.trim());
        if normalized.is_empty() {
            return RingCheck::empty();
        }

        let candidates: Vec<(&T, &str, String)> = records
            .iter()
            .filter(|r| Some(r.record_id()) != exclude_id)
            .filter_map(|r| {
                let raw = r.ring_number()?;
                let norm = normalize(raw);
                (!norm.is_empty()).then_some((r, raw, norm))
            })
            .collect();

        // Strategy 1: Exact Match (first by id order)
        let exact = candidates
            .iter()
            .find(|(_, _, norm)| *norm == normalized)
            .map(|(r, _, _)| (*r).clone());
        let exact_id = exact.as_ref().map(RingRecord::record_id);

        // Strategy 2: Similar Match
        let digits = numeric_run(&normalized).filter(|run| run.len() >= self.min_numeric_run);

        let mut similar: Vec<SimilarMatch<T>> = candidates
            .iter()
            .filter(|(r, _, _)| Some(r.record_id()) != exact_id)
            .filter(|(_, raw, norm)| {
                norm.contains(&normalized)
                    || normalized.contains(norm.as_str())
                    || digits.is_some_and(|run| raw.contains(run))
            })
            .map(|(r, _, norm)| SimilarMatch {
                pigeon: (*r).clone(),
                similarity_score: self.score(&normalized, norm),
            })
            .filter(|m| m.similarity_score >= self.min_similarity)
            .collect();

        // Stable sort keeps id order among equal scores
        similar.sort_by(|a, b| b.similarity_score.cmp(&a.similarity_score));
        similar.truncate(self.max_results);

        RingCheck {
            exact_match: exact,
            similar_matches: similar,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
