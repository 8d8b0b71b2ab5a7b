//! Candidate version clusters, seeded from batch-level facts.
//!
//! A candidate is a set of documents that some signal says belong
//! together. Three signals link documents:
//!
//! * [`LinkSignal::Hash`]: same content fingerprint (one hash group).
//! * [`LinkSignal::Visual`]: first pages are visually similar by the 2-of-3
//!   majority rule of [`crate::pipeline::similarity::are_similar`].
//! * [`LinkSignal::Hint`]: an external semantic grouping names them together.
//!
//! Links are transitive: connected components of the link graph become
//! candidates, which the resolver then confirms. Error documents never link.

use crate::output::BatchReport;
use crate::pipeline::similarity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// What connected two documents of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSignal {
    Hash,
    Visual,
    Hint,
}

/// A grouping produced outside this crate, typically by a classifier that
/// read the documents. Unknown identifiers are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingHint {
    #[serde(default)]
    pub label: Option<String>,
    pub members: Vec<String>,
}

/// A set of two or more documents believed to be related.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterCandidate {
    /// Label from a contributing hint, if any.
    pub label: Option<String>,
    /// Member identifiers, sorted.
    pub members: Vec<String>,
    /// Signals that produced at least one link, sorted.
    pub signals: Vec<LinkSignal>,
}

/// Build candidate clusters for `report`.
///
/// The result is sorted by first member and does not depend on the order of
/// `hints` beyond which hint label is reported.
pub fn seed_clusters(
    report: &BatchReport,
    hints: &[GroupingHint],
    threshold: usize,
) -> Vec<ClusterCandidate> {
    let eligible: Vec<usize> = report
        .documents
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.is_error())
        .map(|(i, _)| i)
        .collect();
    let index_of: BTreeMap<&str, usize> = eligible
        .iter()
        .map(|&i| (report.documents[i].identifier.as_str(), i))
        .collect();

    let mut sets = DisjointSets::new(report.documents.len());
    let mut signals: BTreeMap<usize, BTreeSet<LinkSignal>> = BTreeMap::new();
    let mut labels: BTreeMap<usize, String> = BTreeMap::new();
    let mut links: Vec<(usize, usize, LinkSignal)> = Vec::new();

    for group in report.hash_groups.values().filter(|g| g.len() >= 2) {
        let ids: Vec<usize> = group
            .members
            .iter()
            .filter_map(|m| index_of.get(m.as_str()).copied())
            .collect();
        for pair in ids.windows(2) {
            links.push((pair[0], pair[1], LinkSignal::Hash));
        }
    }

    for (n, &a) in eligible.iter().enumerate() {
        for &b in &eligible[n + 1..] {
            let (da, db) = (&report.documents[a], &report.documents[b]);
            if similarity::are_similar(
                da.visual_fingerprint.as_ref(),
                db.visual_fingerprint.as_ref(),
                threshold,
            ) {
                debug!("Visual link: {} ~ {}", da.identifier, db.identifier);
                links.push((a, b, LinkSignal::Visual));
            }
        }
    }

    for hint in hints {
        let mut ids = Vec::with_capacity(hint.members.len());
        for member in &hint.members {
            match index_of.get(member.as_str()) {
                Some(&i) => ids.push(i),
                None => warn!("Grouping hint names unknown or failed document '{}'", member),
            }
        }
        if let (Some(label), Some(&first)) = (hint.label.as_ref(), ids.first()) {
            labels.entry(first).or_insert_with(|| label.clone());
        }
        for pair in ids.windows(2) {
            links.push((pair[0], pair[1], LinkSignal::Hint));
        }
    }

    for &(a, b, _) in &links {
        sets.union(a, b);
    }
    for &(a, _, signal) in &links {
        let root = sets.find(a);
        signals.entry(root).or_default().insert(signal);
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &i in &eligible {
        components.entry(sets.find(i)).or_default().push(i);
    }

    let mut candidates: Vec<ClusterCandidate> = components
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(root, members)| {
            let label = members.iter().find_map(|m| labels.get(m).cloned());
            let mut ids: Vec<String> = members
                .iter()
                .map(|&i| report.documents[i].identifier.clone())
                .collect();
            ids.sort();
            ClusterCandidate {
                label,
                members: ids,
                signals: signals
                    .get(&root)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default(),
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.members.cmp(&b.members));
    candidates
}

/// Union-find over document indices, with path halving.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins the two sets; the smaller root becomes the representative.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::reduce;
    use crate::error::DocumentError;
    use crate::output::{DocumentRecord, Role, VisualFingerprint};
    use std::path::PathBuf;

    fn doc(id: &str, fp: Option<&str>, visual: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            identifier: id.into(),
            path: PathBuf::from(id),
            size_bytes: 1,
            modified: None,
            page_count: 1,
            extractable: fp.is_some(),
            content_fingerprint: fp.map(String::from),
            visual_fingerprint: visual.map(|v| VisualFingerprint {
                phash: v.into(),
                dhash: v.into(),
                ahash: v.into(),
            }),
            inferred_date: None,
            role: Role::Unique,
            master: None,
            supersedes: Vec::new(),
            cluster: None,
            error: None,
        }
    }

    fn hint(label: Option<&str>, members: &[&str]) -> GroupingHint {
        GroupingHint {
            label: label.map(String::from),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn hash_groups_seed_clusters() {
        let report = reduce(vec![
            doc("a", Some("h"), None),
            doc("b", Some("h"), None),
            doc("c", Some("x"), None),
        ]);
        let clusters = seed_clusters(&report, &[], 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec!["a", "b"]);
        assert_eq!(clusters[0].signals, vec![LinkSignal::Hash]);
        assert_eq!(clusters[0].label, None);
    }

    #[test]
    fn visual_similarity_links_transitively() {
        // a~b and b~c by at most 5 differing characters, a and c differ by 8.
        let a = "0".repeat(64);
        let b = format!("{}{}", "f".repeat(4), "0".repeat(60));
        let c = format!("{}{}", "f".repeat(8), "0".repeat(56));
        let report = reduce(vec![
            doc("a", None, Some(&a)),
            doc("b", None, Some(&b)),
            doc("c", None, Some(&c)),
            doc("d", None, Some(&"e".repeat(64))),
        ]);
        let clusters = seed_clusters(&report, &[], 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].signals, vec![LinkSignal::Visual]);
    }

    #[test]
    fn hints_merge_with_hash_links_and_carry_label() {
        let report = reduce(vec![
            doc("paystub-jan", Some("h"), None),
            doc("paystub-jan-copy", Some("h"), None),
            doc("paystub-feb", Some("y"), None),
        ]);
        let hints = [hint(Some("Paystubs"), &["paystub-feb", "paystub-jan", "ghost"])];
        let clusters = seed_clusters(&report, &hints, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            clusters[0].members,
            vec!["paystub-feb", "paystub-jan", "paystub-jan-copy"]
        );
        assert_eq!(clusters[0].signals, vec![LinkSignal::Hash, LinkSignal::Hint]);
        assert_eq!(clusters[0].label.as_deref(), Some("Paystubs"));
    }

    #[test]
    fn error_documents_never_join() {
        let mut records = vec![doc("a", None, None)];
        records.push(DocumentRecord::failed(
            "b".into(),
            PathBuf::from("b"),
            0,
            None,
            DocumentError::Io {
                document: "b".into(),
                detail: "x".into(),
            },
        ));
        let report = reduce(records);
        let clusters = seed_clusters(&report, &[hint(None, &["a", "b"])], 5);
        assert!(clusters.is_empty());
    }

    #[test]
    fn singletons_are_not_candidates() {
        let report = reduce(vec![doc("a", Some("h1"), None), doc("b", Some("h2"), None)]);
        assert!(seed_clusters(&report, &[hint(None, &["a"])], 5).is_empty());
    }

    #[test]
    fn output_is_sorted_by_members() {
        let report = reduce(vec![
            doc("z1", Some("hz"), None),
            doc("z2", Some("hz"), None),
            doc("a1", Some("ha"), None),
            doc("a2", Some("ha"), None),
        ]);
        let clusters = seed_clusters(&report, &[], 5);
        let firsts: Vec<_> = clusters.iter().map(|c| c.members[0].as_str()).collect();
        assert_eq!(firsts, vec!["a1", "z1"]);
    }
}
