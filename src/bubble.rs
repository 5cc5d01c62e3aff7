// Bubble analysis around a single vertex.
//
// For every pair of occurrences of a vertex this module decides whether the
// two walks rejoin within the branch-size window, separately for the
// forward and the backward direction. A vertex where some pair rejoins
// ahead but separates behind marks the left boundary of a collinear block
// and is used to seed the extension.

use std::collections::BTreeMap;

use crate::dna;
use crate::storage::SeqIter;

#[path = "bubble_test.rs"]
mod bubble_test;

/// Undirected adjacency over instance indices, stored upper-triangular:
/// `j ∈ bulges[i]` implies `i < j`.
pub type BubbledBranches = Vec<Vec<usize>>;

pub fn bubbled_branches_forward(
    instances: &[SeqIter<'_>],
    max_branch_size: i64,
    bulges: &mut BubbledBranches,
) {
    bubbled_branches(instances, max_branch_size, true, bulges)
}

pub fn bubbled_branches_backward(
    instances: &[SeqIter<'_>],
    max_branch_size: i64,
    bulges: &mut BubbledBranches,
) {
    bubbled_branches(instances, max_branch_size, false, bulges)
}

fn bubbled_branches(
    instances: &[SeqIter<'_>],
    max_branch_size: i64,
    forward: bool,
    bulges: &mut BubbledBranches,
) {
    let mut parallel_edge: [Vec<usize>; dna::ALPHABET_BUCKETS] = Default::default();
    let mut visit: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    bulges.clear();
    bulges.resize(instances.len(), Vec::new());

    for (i, vertex) in instances.iter().enumerate() {
        // Occurrences emitting the same character share an edge and are
        // trivially bubbled.
        let step = if forward { vertex.next() } else { vertex.prev() };
        if step.valid() {
            let ch = if forward {
                vertex.ch()
            } else {
                step.ch()
            };
            parallel_edge[dna::make_up_char(ch)].push(i);
        }

        let start_position = vertex.position();
        let mut it = step;
        while it.valid() && (start_position - it.position()).abs() <= max_branch_size {
            visit.entry(it.vertex_id()).or_default().push(i);
            it = if forward { it.next() } else { it.prev() };
        }
    }

    for bucket in &parallel_edge {
        for j in 0..bucket.len() {
            for k in j + 1..bucket.len() {
                bulges[bucket[j]].push(bucket[k]);
            }
        }
    }

    // Two branches that reach the same vertex inside the window rejoin.
    for (_, mut branches) in visit {
        branches.sort_unstable();
        for j in 0..branches.len() {
            for k in j + 1..branches.len() {
                let (small, large) = (branches[j], branches[k]);
                if small != large && !bulges[small].contains(&large) {
                    bulges[small].push(large);
                }
            }
        }
    }
}

/// A vertex seeds a block iff some pair of its instances rejoins going
/// forward but separates going backward: the signature of a block boundary.
pub fn is_block_seed(forward: &BubbledBranches, backward: &BubbledBranches) -> bool {
    for (i, ahead) in forward.iter().enumerate() {
        for j in ahead {
            if !backward[i].contains(j) {
                return true;
            }
        }
    }
    false
}
