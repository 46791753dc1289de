//! Lot lineage as a directed acyclic graph.
//!
//! Splits give a child exactly one parent; merges give the target one parent
//! per source. Both are stored as [`LineageLink`] edges between integer lot
//! ids, so a merged lot's ancestry stays complete.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use lotkeeper_core::LotId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Split,
    Merge,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Split => "split",
            LinkKind::Merge => "merge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "split" => Some(LinkKind::Split),
            "merge" => Some(LinkKind::Merge),
            _ => None,
        }
    }
}

/// Edge `parent -> child`. The child is always created after the parent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageLink {
    pub parent: LotId,
    pub child: LotId,
    pub kind: LinkKind,
}

/// Adjacency view over a set of links.
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    parents: BTreeMap<LotId, Vec<LotId>>,
    children: BTreeMap<LotId, Vec<LotId>>,
}

impl LineageGraph {
    pub fn new<I>(links: I) -> Self
    where
        I: IntoIterator<Item = LineageLink>,
    {
        let mut graph = Self::default();
        for link in links {
            graph.parents.entry(link.child).or_default().push(link.parent);
            graph.children.entry(link.parent).or_default().push(link.child);
        }
        for list in graph.parents.values_mut().chain(graph.children.values_mut()) {
            list.sort();
            list.dedup();
        }
        graph
    }

    pub fn parents_of(&self, lot_id: LotId) -> &[LotId] {
        self.parents.get(&lot_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, lot_id: LotId) -> &[LotId] {
        self.children.get(&lot_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every lot `lot_id` descends from, nearest first. Excludes `lot_id`.
    pub fn ancestors(&self, lot_id: LotId) -> Vec<LotId> {
        walk(lot_id, |id| self.parents_of(id))
    }

    /// Every lot derived from `lot_id`, nearest first. Excludes `lot_id`.
    pub fn descendants(&self, lot_id: LotId) -> Vec<LotId> {
        walk(lot_id, |id| self.children_of(id))
    }
}

/// Breadth-first walk. The visited set guarantees termination even if a
/// store ever hands back a malformed (cyclic) link set.
fn walk<'a, F>(start: LotId, next: F) -> Vec<LotId>
where
    F: Fn(LotId) -> &'a [LotId],
{
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    let mut out = Vec::new();

    while let Some(current) = queue.pop_front() {
        for &id in next(current) {
            if seen.insert(id) {
                out.push(id);
                queue.push_back(id);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> LotId {
        LotId::new(n)
    }

    fn link(parent: u64, child: u64, kind: LinkKind) -> LineageLink {
        LineageLink {
            parent: id(parent),
            child: id(child),
            kind,
        }
    }

    /// 1 splits into 2 and 3; 3 and 4 merge into 5; 5 splits into 6.
    fn sample() -> LineageGraph {
        LineageGraph::new([
            link(1, 2, LinkKind::Split),
            link(1, 3, LinkKind::Split),
            link(3, 5, LinkKind::Merge),
            link(4, 5, LinkKind::Merge),
            link(5, 6, LinkKind::Split),
        ])
    }

    #[test]
    fn ancestors_follow_split_and_merge_links() {
        let graph = sample();
        assert_eq!(graph.ancestors(id(6)), vec![id(5), id(3), id(4), id(1)]);
        assert_eq!(graph.ancestors(id(2)), vec![id(1)]);
        assert!(graph.ancestors(id(1)).is_empty());
    }

    #[test]
    fn descendants_follow_the_reverse_relation() {
        let graph = sample();
        assert_eq!(graph.descendants(id(1)), vec![id(2), id(3), id(5), id(6)]);
        assert_eq!(graph.descendants(id(4)), vec![id(5), id(6)]);
        assert!(graph.descendants(id(6)).is_empty());
    }

    #[test]
    fn malformed_cycles_still_terminate() {
        let graph = LineageGraph::new([link(1, 2, LinkKind::Split), link(2, 1, LinkKind::Split)]);
        assert_eq!(graph.ancestors(id(1)), vec![id(2)]);
        assert_eq!(graph.descendants(id(1)), vec![id(2)]);
    }
}
