//! Roster comparison between the loaded bracket and an updated tournament
//! document. Names that changed slightly are reported as likely renames
//! instead of a removal plus an addition.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::bracket::Tree;
use crate::types::{CategoryEntrants, Entrant};

pub const RENAME_CUTOFF: f64 = 0.8;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rename {
    pub from: String,
    pub to: String,
    pub similarity: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDiff {
    pub category: String,
    pub renamed: Vec<Rename>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl CategoryDiff {
    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterDiff {
    pub categories: Vec<CategoryDiff>,
    pub added_categories: Vec<String>,
    pub removed_categories: Vec<String>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.added_categories.is_empty()
            && self.removed_categories.is_empty()
            && self.categories.iter().all(CategoryDiff::is_empty)
    }
}

/// Similarity in `[0, 1]`: twice the matched characters over the combined
/// length, matching blocks found by longest common substring.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (start_a, start_b, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matched_chars(&a[..start_a], &b[..start_b])
        + matched_chars(&a[start_a + len..], &b[start_b + len..])
}

fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                if row[j + 1] > best.2 {
                    best = (i + 1 - row[j + 1], j + 1 - row[j + 1], row[j + 1]);
                }
            }
        }
        prev = row;
    }
    best
}

fn entrant_names<'a>(entrants: impl IntoIterator<Item = &'a Entrant>) -> BTreeSet<String> {
    entrants
        .into_iter()
        .map(|e| e.name.trim().to_string())
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("tbd"))
        .collect()
}

fn diff_names(category: &str, old: BTreeSet<String>, new: BTreeSet<String>) -> CategoryDiff {
    let mut added: BTreeSet<String> = new.difference(&old).cloned().collect();
    let mut removed = Vec::new();
    let mut renamed = Vec::new();
    for name in old.difference(&new) {
        let best = added
            .iter()
            .map(|candidate| (similarity(name, candidate), candidate))
            .filter(|(score, _)| *score >= RENAME_CUTOFF)
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)));
        match best {
            Some((score, candidate)) => {
                let to = candidate.clone();
                added.remove(&to);
                renamed.push(Rename {
                    from: name.clone(),
                    to,
                    similarity: score,
                });
            }
            None => removed.push(name.clone()),
        }
    }
    CategoryDiff {
        category: category.to_string(),
        renamed,
        added: added.into_iter().collect(),
        removed,
    }
}

pub fn diff_rosters(tree: &Tree, incoming: &[CategoryEntrants]) -> RosterDiff {
    let existing: BTreeMap<&str, &[Entrant]> = tree
        .categories()
        .iter()
        .map(|c| (c.name.as_str(), c.entrants.as_slice()))
        .collect();
    let incoming_by_name: BTreeMap<&str, &CategoryEntrants> =
        incoming.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut diff = RosterDiff::default();
    for (name, entrants) in &incoming_by_name {
        match existing.get(name) {
            Some(current) => diff
                .categories
                .push(diff_names(
                    name,
                    entrant_names(current.iter()),
                    entrant_names(entrants.matchups.iter().flat_map(|m| m.players.iter())),
                )),
            None => diff.added_categories.push(name.to_string()),
        }
    }
    diff.removed_categories = existing
        .keys()
        .filter(|name| !incoming_by_name.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    diff
}

pub fn render_roster_diff(diff: &RosterDiff) -> String {
    let mut out = String::new();
    if diff.is_empty() {
        out.push_str("No roster changes.\n");
        return out;
    }
    for name in &diff.added_categories {
        let _ = writeln!(out, "+ category {name}");
    }
    for name in &diff.removed_categories {
        let _ = writeln!(out, "- category {name}");
    }
    for category in diff.categories.iter().filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "[{}]", category.category);
        for rename in &category.renamed {
            let _ = writeln!(
                out,
                "  ~ {:?} -> {:?} ({:.2})",
                rename.from, rename.to, rename.similarity
            );
        }
        for name in &category.added {
            let _ = writeln!(out, "  + {name}");
        }
        for name in &category.removed {
            let _ = writeln!(out, "  - {name}");
        }
    }
    out
}
