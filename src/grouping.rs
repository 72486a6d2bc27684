//! Clusters screenshots of the same listing.
//!
//! Two screenshots match when the title text visible at the top of one
//! appears in the other's full text, or when they share a run of
//! `min_overlap` characters. Matches are merged transitively with a
//! disjoint-set forest, so a scroll sequence A→B→C lands in one group even
//! if A and C share nothing directly.

use crate::text::normalize_for_comparison;

/// True when the two screenshots appear to show the same listing.
///
/// Symmetric in its two (top, full) pairs. Returns false when both top texts
/// are shorter than `min_overlap` after whitespace removal.
pub fn same_product_group(top_a: &str, full_a: &str, top_b: &str, full_b: &str, min_overlap: usize) -> bool {
    let na: Vec<char> = normalize_for_comparison(top_a).chars().collect();
    let nb: Vec<char> = normalize_for_comparison(top_b).chars().collect();
    let fa = normalize_for_comparison(full_a);
    let fb = normalize_for_comparison(full_b);

    if na.len() < min_overlap && nb.len() < min_overlap {
        return false;
    }
    contained_or_overlaps(&na, &fb, min_overlap) || contained_or_overlaps(&nb, &fa, min_overlap)
}

fn contained_or_overlaps(top: &[char], full: &str, min_overlap: usize) -> bool {
    if top.is_empty() {
        return false;
    }
    let whole: String = top.iter().collect();
    if full.contains(&whole) {
        return true;
    }
    if min_overlap == 0 || top.len() < min_overlap {
        return false;
    }
    top.windows(min_overlap)
        .any(|w| full.contains(&w.iter().collect::<String>()))
}

/// Union-find over `0..n` with path compression and no rank heuristic.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Compress the walked path onto the root.
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Attaches `x`'s root under `y`'s root.
    pub fn union(&mut self, x: usize, y: usize) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx != ry {
            self.parent[rx] = ry;
        }
    }

    /// Members per root, ordered by each group's lowest index; members ascending.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = self.find(i);
            match slot_of_root[root] {
                Some(slot) => groups[slot].push(i),
                None => {
                    slot_of_root[root] = Some(groups.len());
                    groups.push(vec![i]);
                }
            }
        }
        groups
    }
}

/// Text pair a screenshot contributes to grouping.
pub trait GroupKey {
    fn top_text(&self) -> &str;
    fn full_text(&self) -> &str;
}

/// Partitions `items` by pairwise [`same_product_group`]. O(n²) comparisons.
pub fn group_screenshots<T: GroupKey>(items: &[T], min_overlap: usize) -> Vec<Vec<usize>> {
    let mut set = DisjointSet::new(items.len());
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let (a, b) = (&items[i], &items[j]);
            if same_product_group(a.top_text(), a.full_text(), b.top_text(), b.full_text(), min_overlap) {
                set.union(i, j);
            }
        }
    }
    set.groups()
}
