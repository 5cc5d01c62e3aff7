// The bubble-aware path: a consensus walk over the junction graph together
// with the set of genomic instances that still follow it.
//
// The consensus grows one vertex at a time at either end. Every push scans
// the occurrences of the incoming vertex and either extends a matching
// instance, spawns a fresh single-point instance, or rejects the whole move
// when some instance would fall further behind the consensus than the
// flanking budget allows. Pushes and pops are exact inverses, which lets
// the extender rewind to the best-scoring prefix it has seen.

use std::collections::{HashSet, VecDeque};

use crate::edge::Edge;
use crate::opts::FinderOpt;
use crate::storage::{JunctionStorage, SeqIter};

#[path = "path_test.rs"]
mod path_test;

#[derive(Debug, Clone, Copy)]
pub struct PathParams {
    pub max_branch_size: i64,
    pub min_block_size: i64,
    pub min_chain_size: i64,
    pub max_flanking_size: i64,
}

impl PathParams {
    pub fn from_opt(opt: &FinderOpt) -> Self {
        PathParams {
            max_branch_size: opt.max_branch_size,
            min_block_size: opt.min_block_size,
            min_chain_size: opt.min_chain_size(),
            max_flanking_size: opt.max_flanking_size,
        }
    }
}

/// A contiguous sub-walk of one chromosome that matches the consensus.
/// `seq` holds the attach points, front to back in path direction; the
/// flank distances are the path coordinates at which the instance
/// currently starts and ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance<'a> {
    seq: VecDeque<SeqIter<'a>>,
    left_flank_distance: i64,
    right_flank_distance: i64,
}

impl<'a> Instance<'a> {
    pub fn front(&self) -> SeqIter<'a> {
        *self.seq.front().expect("instance is never empty")
    }

    pub fn back(&self) -> SeqIter<'a> {
        *self.seq.back().expect("instance is never empty")
    }

    /// Genomic extent between the two attach points.
    pub fn length(&self) -> i64 {
        (self.front().position() - self.back().position()).abs()
    }

    pub fn left_flank_distance(&self) -> i64 {
        self.left_flank_distance
    }

    pub fn right_flank_distance(&self) -> i64 {
        self.right_flank_distance
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PathPoint {
    pub edge: Edge,
    pub distance: i64,
}

// Dense signed-vertex -> distance table, reused across seeds to avoid
// hashing on the hot path. Only touched entries are ever reset.
struct DistanceKeeper {
    distance: Vec<i32>,
    offset: i64,
}

const NO_DISTANCE: i32 = i32::MAX;

impl DistanceKeeper {
    fn new(vertices: i64) -> Self {
        DistanceKeeper {
            distance: vec![NO_DISTANCE; (vertices * 2 + 1) as usize],
            offset: vertices,
        }
    }

    #[inline]
    fn slot(&self, vertex: i64) -> usize {
        (vertex + self.offset) as usize
    }

    fn contains(&self, vertex: i64) -> bool {
        self.distance[self.slot(vertex)] != NO_DISTANCE
    }

    fn get(&self, vertex: i64) -> Option<i64> {
        match self.distance[self.slot(vertex)] {
            NO_DISTANCE => None,
            d => Some(d as i64),
        }
    }

    fn set(&mut self, vertex: i64, distance: i64) {
        let slot = self.slot(vertex);
        self.distance[slot] = distance as i32;
    }

    fn unset(&mut self, vertex: i64) {
        let slot = self.slot(vertex);
        self.distance[slot] = NO_DISTANCE;
    }
}

pub struct Path<'a> {
    storage: &'a JunctionStorage,
    params: PathParams,
    origin: i64,
    left_body: Vec<PathPoint>,
    right_body: Vec<PathPoint>,
    instances: Vec<Instance<'a>>,
    // Every (chr, idx) currently covered by an instance, attach points and
    // bubble interiors alike. Growth never rolls over an occupied or used
    // occurrence, so committed instances can never overlap.
    inside: HashSet<(usize, i64)>,
    distance: DistanceKeeper,
}

impl<'a> Path<'a> {
    pub fn new(storage: &'a JunctionStorage, params: PathParams) -> Self {
        Path {
            storage,
            params,
            origin: 0,
            left_body: Vec::new(),
            right_body: Vec::new(),
            instances: Vec::new(),
            inside: HashSet::new(),
            distance: DistanceKeeper::new(storage.vertices_number()),
        }
    }

    pub fn init(&mut self, vertex_id: i64) {
        debug_assert!(self.origin == 0 && self.instances.is_empty());
        self.origin = vertex_id;
        self.distance.set(vertex_id, 0);
        let mut occ = self.storage.vertex_iter(vertex_id);
        while occ.valid() {
            let seq = occ.sequential();
            occ = occ.next();
            if seq.used() {
                continue;
            }
            self.inside.insert((seq.chr_id(), seq.index()));
            self.instances.push(Instance {
                seq: VecDeque::from([seq]),
                left_flank_distance: 0,
                right_flank_distance: 0,
            });
        }
    }

    pub fn clear(&mut self) {
        for point in self.right_body.drain(..) {
            self.distance.unset(point.edge.end_vertex);
        }
        for point in self.left_body.drain(..) {
            self.distance.unset(point.edge.start_vertex);
        }
        if self.origin != 0 {
            self.distance.unset(self.origin);
        }
        self.origin = 0;
        self.instances.clear();
        self.inside.clear();
    }

    pub fn origin(&self) -> i64 {
        self.origin
    }

    pub fn right_vertex(&self) -> i64 {
        self.right_body
            .last()
            .map_or(self.origin, |p| p.edge.end_vertex)
    }

    pub fn left_vertex(&self) -> i64 {
        self.left_body
            .last()
            .map_or(self.origin, |p| p.edge.start_vertex)
    }

    pub fn right_distance(&self) -> i64 {
        self.right_body.last().map_or(0, |p| p.distance)
    }

    pub fn left_distance(&self) -> i64 {
        self.left_body.last().map_or(0, |p| p.distance)
    }

    /// Number of body points from the origin to the right end, inclusive.
    pub fn right_size(&self) -> usize {
        self.right_body.len() + 1
    }

    pub fn left_size(&self) -> usize {
        self.left_body.len() + 1
    }

    pub fn right_point(&self, i: usize) -> Option<PathPoint> {
        self.right_body.get(i).copied()
    }

    pub fn left_point(&self, i: usize) -> Option<PathPoint> {
        self.left_body.get(i).copied()
    }

    /// Genomic span of the consensus between its two extremes.
    pub fn middle_path_length(&self) -> i64 {
        self.right_distance() - self.left_distance()
    }

    pub fn in_path(&self, vertex_id: i64) -> bool {
        self.distance.contains(vertex_id)
    }

    pub fn all_instances(&self) -> &[Instance<'a>] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_good_instance(&self, instance: &Instance<'a>) -> bool {
        instance.length() >= self.params.min_chain_size
    }

    pub fn good_instances(&self) -> usize {
        self.instances
            .iter()
            .filter(|inst| self.is_good_instance(inst))
            .count()
    }

    /// Sum over instances of the length minus both flank penalties. With
    /// `final_only` set, instances shorter than the chain threshold are
    /// skipped; that mode is used once, at commit time.
    pub fn score(&self, final_only: bool) -> i64 {
        let left = self.left_distance();
        let right = self.right_distance();
        let mut total = 0;
        for inst in &self.instances {
            let length = inst.length();
            if final_only && length < self.params.min_chain_size {
                continue;
            }
            total += length
                - (inst.left_flank_distance - left).abs()
                - (inst.right_flank_distance - right).abs();
        }
        total
    }

    /// Every edge of the consensus, leftmost first.
    pub fn full_edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.left_body.iter().rev().map(|p| p.edge).collect();
        edges.extend(self.right_body.iter().map(|p| p.edge));
        edges
    }

    pub fn point_push_back(&mut self, e: Edge) -> bool {
        let vertex = e.end_vertex;
        if vertex == 0 || self.distance.contains(vertex) {
            return false;
        }
        if e.start_vertex != self.right_vertex() {
            return false;
        }
        let new_right = self.right_distance() + e.length;

        let mut extend: Vec<(usize, Vec<SeqIter<'a>>)> = Vec::new();
        let mut fresh: Vec<SeqIter<'a>> = Vec::new();
        let mut taken = vec![false; self.instances.len()];
        let mut planned: HashSet<(usize, i64)> = HashSet::new();

        let mut occ = self.storage.vertex_iter(vertex);
        while occ.valid() {
            let seq = occ.sequential();
            occ = occ.next();
            let key = (seq.chr_id(), seq.index());
            if seq.used() || self.inside.contains(&key) || planned.contains(&key) {
                continue;
            }
            match self.plan_attach(seq, &e, true, &taken, &planned) {
                Some((inst_idx, walk)) => {
                    // Attaching may turn the instance into a good one; its
                    // far flank must already fit the budget then.
                    let inst = &self.instances[inst_idx];
                    let new_length = (inst.front().position() - seq.position()).abs();
                    if new_length >= self.params.min_chain_size
                        && (inst.left_flank_distance - self.left_distance()).abs()
                            > self.params.max_flanking_size
                    {
                        return false;
                    }
                    taken[inst_idx] = true;
                    for it in &walk {
                        planned.insert((it.chr_id(), it.index()));
                    }
                    extend.push((inst_idx, walk));
                }
                None => {
                    planned.insert(key);
                    fresh.push(seq);
                }
            }
        }

        // A good instance that was not extended must not fall further
        // behind the new right end than the flanking budget.
        for (i, inst) in self.instances.iter().enumerate() {
            if taken[i] {
                continue;
            }
            if inst.length() >= self.params.min_chain_size
                && (new_right - inst.right_flank_distance).abs() > self.params.max_flanking_size
            {
                return false;
            }
        }

        for (inst_idx, walk) in extend {
            for it in &walk {
                self.inside.insert((it.chr_id(), it.index()));
            }
            let target = walk[walk.len() - 1];
            let inst = &mut self.instances[inst_idx];
            inst.seq.push_back(target);
            inst.right_flank_distance = new_right;
        }
        for seq in fresh {
            self.inside.insert((seq.chr_id(), seq.index()));
            self.instances.push(Instance {
                seq: VecDeque::from([seq]),
                left_flank_distance: new_right,
                right_flank_distance: new_right,
            });
        }
        self.distance.set(vertex, new_right);
        self.right_body.push(PathPoint {
            edge: e,
            distance: new_right,
        });
        true
    }

    pub fn point_push_front(&mut self, e: Edge) -> bool {
        let vertex = e.start_vertex;
        if vertex == 0 || self.distance.contains(vertex) {
            return false;
        }
        if e.end_vertex != self.left_vertex() {
            return false;
        }
        let new_left = self.left_distance() - e.length;

        let mut extend: Vec<(usize, Vec<SeqIter<'a>>)> = Vec::new();
        let mut fresh: Vec<SeqIter<'a>> = Vec::new();
        let mut taken = vec![false; self.instances.len()];
        let mut planned: HashSet<(usize, i64)> = HashSet::new();

        let mut occ = self.storage.vertex_iter(vertex);
        while occ.valid() {
            let seq = occ.sequential();
            occ = occ.next();
            let key = (seq.chr_id(), seq.index());
            if seq.used() || self.inside.contains(&key) || planned.contains(&key) {
                continue;
            }
            match self.plan_attach(seq, &e, false, &taken, &planned) {
                Some((inst_idx, walk)) => {
                    let inst = &self.instances[inst_idx];
                    let new_length = (inst.back().position() - seq.position()).abs();
                    if new_length >= self.params.min_chain_size
                        && (inst.right_flank_distance - self.right_distance()).abs()
                            > self.params.max_flanking_size
                    {
                        return false;
                    }
                    taken[inst_idx] = true;
                    for it in &walk {
                        planned.insert((it.chr_id(), it.index()));
                    }
                    extend.push((inst_idx, walk));
                }
                None => {
                    planned.insert(key);
                    fresh.push(seq);
                }
            }
        }

        for (i, inst) in self.instances.iter().enumerate() {
            if taken[i] {
                continue;
            }
            if inst.length() >= self.params.min_chain_size
                && (new_left - inst.left_flank_distance).abs() > self.params.max_flanking_size
            {
                return false;
            }
        }

        for (inst_idx, walk) in extend {
            for it in &walk {
                self.inside.insert((it.chr_id(), it.index()));
            }
            let target = walk[walk.len() - 1];
            let inst = &mut self.instances[inst_idx];
            inst.seq.push_front(target);
            inst.left_flank_distance = new_left;
        }
        for seq in fresh {
            self.inside.insert((seq.chr_id(), seq.index()));
            self.instances.push(Instance {
                seq: VecDeque::from([seq]),
                left_flank_distance: new_left,
                right_flank_distance: new_left,
            });
        }
        self.distance.set(vertex, new_left);
        self.left_body.push(PathPoint {
            edge: e,
            distance: new_left,
        });
        true
    }

    // Finds the instance the candidate occurrence continues, together with
    // the occurrences its extension walks over (target last). The nearest
    // preceding extremum on the same chromosome and strand is the only
    // candidate; a short gap is a bubble rejoin, a long one must follow
    // the exact consensus edge.
    fn plan_attach(
        &self,
        seq: SeqIter<'a>,
        e: &Edge,
        back_side: bool,
        taken: &[bool],
        planned: &HashSet<(usize, i64)>,
    ) -> Option<(usize, Vec<SeqIter<'a>>)> {
        let mut best: Option<(usize, i64)> = None;
        for (i, inst) in self.instances.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let end = if back_side { inst.back() } else { inst.front() };
            if end.chr_id() != seq.chr_id()
                || end.is_positive_strand() != seq.is_positive_strand()
            {
                continue;
            }
            let ahead = if back_side {
                seq.position() - end.position()
            } else {
                end.position() - seq.position()
            };
            let delta = if end.is_positive_strand() { ahead } else { -ahead };
            if delta <= 0 {
                continue;
            }
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((i, delta));
            }
        }
        let (inst_idx, delta) = best?;
        let end = if back_side {
            self.instances[inst_idx].back()
        } else {
            self.instances[inst_idx].front()
        };

        if delta > self.params.max_branch_size {
            // Long gaps are only allowed along the true consensus edge.
            let step = if back_side { end.next() } else { end.prev() };
            if !step.valid() || step != seq {
                return None;
            }
            let emitted = if back_side { end.ch() } else { seq.ch() };
            if emitted != e.ch {
                return None;
            }
            return Some((inst_idx, vec![seq]));
        }

        // Bubble rejoin: sweep the gap, refusing to roll over anything
        // already used or claimed by another instance.
        let mut walk = Vec::new();
        let mut it = if back_side { end.next() } else { end.prev() };
        loop {
            if !it.valid() {
                return None;
            }
            let key = (it.chr_id(), it.index());
            if it.used() || self.inside.contains(&key) || planned.contains(&key) {
                return None;
            }
            walk.push(it);
            if it == seq {
                break;
            }
            it = if back_side { it.next() } else { it.prev() };
        }
        Some((inst_idx, walk))
    }

    pub fn point_pop_back(&mut self) {
        let point = match self.right_body.pop() {
            Some(point) => point,
            None => return,
        };
        let vertex = point.edge.end_vertex;
        self.distance.unset(vertex);

        let mut i = 0;
        while i < self.instances.len() {
            if self.instances[i].back().vertex_id() != vertex {
                i += 1;
                continue;
            }
            if self.instances[i].seq.len() == 1 {
                let it = self.instances[i].back();
                self.inside.remove(&(it.chr_id(), it.index()));
                self.instances.remove(i);
                continue;
            }
            let old_back = self.instances[i].seq.pop_back().expect("len checked");
            let new_back = self.instances[i].back();
            let mut it = old_back;
            while it != new_back {
                self.inside.remove(&(it.chr_id(), it.index()));
                it = it.prev();
            }
            let flank = self.distance.get(new_back.vertex_id());
            debug_assert!(flank.is_some());
            self.instances[i].right_flank_distance = flank.unwrap_or(0);
            i += 1;
        }
    }

    pub fn point_pop_front(&mut self) {
        let point = match self.left_body.pop() {
            Some(point) => point,
            None => return,
        };
        let vertex = point.edge.start_vertex;
        self.distance.unset(vertex);

        let mut i = 0;
        while i < self.instances.len() {
            if self.instances[i].front().vertex_id() != vertex {
                i += 1;
                continue;
            }
            if self.instances[i].seq.len() == 1 {
                let it = self.instances[i].front();
                self.inside.remove(&(it.chr_id(), it.index()));
                self.instances.remove(i);
                continue;
            }
            let old_front = self.instances[i].seq.pop_front().expect("len checked");
            let new_front = self.instances[i].front();
            let mut it = old_front;
            while it != new_front {
                self.inside.remove(&(it.chr_id(), it.index()));
                it = it.next();
            }
            let flank = self.distance.get(new_front.vertex_id());
            debug_assert!(flank.is_some());
            self.instances[i].left_flank_distance = flank.unwrap_or(0);
            i += 1;
        }
    }
}
