// Block discovery: greedy seed-and-extend over the junction graph.
//
// Seeds are shuffled across a rayon worker pool. Each worker owns two
// paths (the working one and a finalizer used for commit re-validation),
// a dense vote accumulator, and scratch buffers for the bubble analyser.
// The storage is shared read-only; commits go through the stripe locks and
// the atomic used flags, so workers never block each other outside commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::block::BlockInstance;
use crate::bubble::{
    bubbled_branches_backward, bubbled_branches_forward, is_block_seed, BubbledBranches,
};
use crate::edge::Edge;
use crate::opts::FinderOpt;
use crate::path::{Path, PathParams};
use crate::storage::{JunctionStorage, SeqIter};

use std::io;

// Fixed shuffle seed keeps single-threaded runs reproducible.
const SHUFFLE_SEED: u64 = 0x5eed_b10c;
const PROGRESS_PORTION: u64 = 10_000;

fn pack_assignment(block: i64, instance: u32) -> i64 {
    (block << 32) | instance as i64
}

fn unpack_assignment(packed: i64) -> (i64, u32) {
    (packed >> 32, (packed & 0xFFFF_FFFF) as u32)
}

pub struct BlocksFinder<'a> {
    storage: &'a JunctionStorage,
    params: PathParams,
    looking_depth: i64,
    sample_size: i64,
    all_seeds: bool,
    blocks_found: AtomicI64,
    progress: AtomicU64,
    progress_sink: Mutex<()>,
    // Per (chr, idx): signed block id in the high word, instance index in
    // the low word, zero while unassigned. Written only under the
    // covering stripe lock.
    block_id: Vec<Vec<AtomicI64>>,
    synteny_path: Mutex<Vec<Vec<Edge>>>,
}

impl<'a> BlocksFinder<'a> {
    pub fn new(storage: &'a JunctionStorage) -> Self {
        BlocksFinder {
            storage,
            params: PathParams::from_opt(&FinderOpt::default()),
            looking_depth: 0,
            sample_size: 0,
            all_seeds: false,
            blocks_found: AtomicI64::new(0),
            progress: AtomicU64::new(0),
            progress_sink: Mutex::new(()),
            block_id: Vec::new(),
            synteny_path: Mutex::new(Vec::new()),
        }
    }

    pub fn blocks_found(&self) -> i64 {
        self.blocks_found.load(Ordering::SeqCst)
    }

    /// Committed consensus paths, one edge list per block, in commit order.
    pub fn synteny_paths(&self) -> Vec<Vec<Edge>> {
        self.synteny_path.lock().unwrap().clone()
    }

    pub fn assignment(&self, chr: usize, idx: usize) -> Option<(i64, u32)> {
        match self.block_id[chr][idx].load(Ordering::SeqCst) {
            0 => None,
            packed => Some(unpack_assignment(packed)),
        }
    }

    pub fn find_blocks(&mut self, opt: &FinderOpt) -> io::Result<()> {
        opt.validate()?;
        self.params = PathParams::from_opt(opt);
        self.looking_depth = opt.looking_depth;
        self.sample_size = opt.sample_size;
        self.all_seeds = opt.all_seeds;
        self.blocks_found = AtomicI64::new(0);
        self.progress = AtomicU64::new(0);
        self.block_id = (0..self.storage.chr_count())
            .map(|chr| {
                (0..self.storage.chr_size(chr))
                    .map(|_| AtomicI64::new(0))
                    .collect()
            })
            .collect();

        // Per-vertex bubble counts drive the transition probabilities of
        // the randomised extender; the vote-count mode never needs them.
        let bubble_count = if opt.sample_size > 0 {
            self.count_all_bubbles()
        } else {
            Vec::new()
        };

        let vertices = self.storage.vertices_number();
        let mut shuffle = Vec::new();
        for abs_id in 1..vertices {
            for vid in [abs_id, -abs_id] {
                let mut occ = self.storage.vertex_iter(vid);
                while occ.valid() {
                    if occ.is_positive_strand() {
                        shuffle.push(vid);
                        break;
                    }
                    occ = occ.next();
                }
            }
        }
        let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
        shuffle.shuffle(&mut rng);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opt.threads)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let total = shuffle.len();
        let chunk = total.div_ceil(opt.threads.max(1)).max(1);
        let finder = &*self;
        pool.install(|| {
            shuffle
                .par_chunks(chunk)
                .for_each(|seeds| finder.process_seeds(seeds, total, &bubble_count));
        });
        Ok(())
    }

    fn process_seeds(&self, seeds: &[i64], total: usize, bubble_count: &[i64]) {
        let vertices = self.storage.vertices_number();
        let mut count = vec![0u32; (vertices * 2 + 1) as usize];
        let mut data: Vec<usize> = Vec::new();
        let mut current = Path::new(self.storage, self.params);
        let mut finalizer = Path::new(self.storage, self.params);
        let mut forward_bubble = BubbledBranches::new();
        let mut backward_bubble = BubbledBranches::new();
        let mut instance: Vec<SeqIter> = Vec::new();
        let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED ^ seeds.first().copied().unwrap_or(0) as u64);

        for &vid in seeds {
            let done = self.progress.fetch_add(1, Ordering::SeqCst);
            if done % PROGRESS_PORTION == 0 {
                let _guard = self.progress_sink.lock().unwrap();
                log::info!("{} / {} seeds", done, total);
            }

            instance.clear();
            let mut occ = self.storage.vertex_iter(vid);
            while occ.valid() {
                instance.push(occ.sequential());
                occ = occ.next();
            }
            if instance.len() < 2 {
                continue;
            }

            if !self.all_seeds {
                bubbled_branches_forward(
                    &instance,
                    self.params.max_branch_size,
                    &mut forward_bubble,
                );
                bubbled_branches_backward(
                    &instance,
                    self.params.max_branch_size,
                    &mut backward_bubble,
                );
                if !is_block_seed(&forward_bubble, &backward_bubble) {
                    continue;
                }
            }

            if self.sample_size > 0 {
                self.explore_random(vid, &mut current, &mut finalizer, bubble_count, &mut rng);
            } else {
                self.explore(vid, &mut current, &mut finalizer, &mut count, &mut data);
            }
        }
    }

    // Vote-count extension: grow forward while the score keeps coming back
    // positive, rewind to the best prefix, then grow backward the same way,
    // and finally try to commit. A successful commit frees the seed for
    // another round, since other occurrences may support further blocks.
    fn explore(
        &self,
        vid: i64,
        current: &mut Path<'a>,
        finalizer: &mut Path<'a>,
        count: &mut [u32],
        data: &mut Vec<usize>,
    ) {
        loop {
            current.init(vid);
            if current.instance_count() < 2 {
                current.clear();
                return;
            }

            let mut best_score = 0i64;
            let mut best_right_size = current.right_size();
            let mut best_left_size = current.left_size();
            let mut now_score = 0i64;
            let min_run = 2 * self.params.min_block_size.max(self.params.max_branch_size);

            loop {
                let prev_length = current.middle_path_length();
                let mut positive = false;
                let mut advanced;
                loop {
                    advanced = self.extend_path_forward(
                        current,
                        count,
                        data,
                        &mut best_right_size,
                        &mut best_score,
                        &mut now_score,
                    );
                    if !advanced || current.middle_path_length() - prev_length > min_run {
                        break;
                    }
                    positive |= now_score > 0;
                }
                if !advanced || !positive {
                    break;
                }
            }

            // Rewind to the best forward prefix before turning around.
            let best_edges: Vec<Edge> = (0..best_right_size.saturating_sub(1))
                .filter_map(|i| current.right_point(i).map(|p| p.edge))
                .collect();
            current.clear();
            current.init(vid);
            for e in best_edges {
                if !current.point_push_back(e) {
                    break;
                }
            }

            loop {
                let prev_length = current.middle_path_length();
                let mut positive = false;
                let mut advanced;
                loop {
                    advanced = self.extend_path_backward(
                        current,
                        count,
                        data,
                        &mut best_left_size,
                        &mut best_score,
                        &mut now_score,
                    );
                    if !advanced || current.middle_path_length() - prev_length > min_run {
                        break;
                    }
                    positive |= now_score > 0;
                }
                if !advanced || !positive {
                    break;
                }
            }

            let committed = best_score > 0
                && self.try_finalize_block(current, finalizer, best_right_size, best_left_size);
            current.clear();
            if !committed {
                return;
            }
        }
    }

    fn extend_path_forward(
        &self,
        current: &mut Path<'a>,
        count: &mut [u32],
        data: &mut Vec<usize>,
        best_right_size: &mut usize,
        best_score: &mut i64,
        now_score: &mut i64,
    ) -> bool {
        let mut success = false;
        let (best_vid, next) = self.most_popular_vertex(current, true, count, data);
        if best_vid == 0 {
            return false;
        }
        let mut it = match next.origin {
            Some(origin) => origin,
            None => return false,
        };
        while it.valid() && it.vertex_id() != best_vid {
            success = current.point_push_back(it.outgoing_edge());
            it = it.next();
            if success {
                *now_score = current.score(false);
                if *now_score > *best_score {
                    *best_score = *now_score;
                    *best_right_size = current.right_size();
                }
            }
        }
        success
    }

    fn extend_path_backward(
        &self,
        current: &mut Path<'a>,
        count: &mut [u32],
        data: &mut Vec<usize>,
        best_left_size: &mut usize,
        best_score: &mut i64,
        now_score: &mut i64,
    ) -> bool {
        let mut success = false;
        let (best_vid, next) = self.most_popular_vertex(current, false, count, data);
        if best_vid == 0 {
            return false;
        }
        let mut it = match next.origin {
            Some(origin) => origin,
            None => return false,
        };
        while it.valid() && it.vertex_id() != best_vid {
            success = current.point_push_front(it.ingoing_edge());
            it = it.prev();
            if success {
                *now_score = current.score(false);
                if *now_score > *best_score {
                    *best_score = *now_score;
                    *best_left_size = current.left_size();
                }
            }
        }
        success
    }

    // Walks ahead of every instance sitting at the path end, weighting each
    // unvisited vertex by the instance length. The winner is the vertex the
    // consensus heads for next; ties go to the closest candidate. The dense
    // accumulator is zeroed through the dirty list between calls.
    fn most_popular_vertex(
        &self,
        current: &Path<'a>,
        forward: bool,
        count: &mut [u32],
        data: &mut Vec<usize>,
    ) -> (i64, NextVertex<'a>) {
        let vertices = self.storage.vertices_number();
        let mut ret = NextVertex {
            diff: i64::MAX,
            count: 0,
            origin: None,
        };
        let mut best_vid = 0i64;
        let start_vid = if forward {
            current.right_vertex()
        } else {
            current.left_vertex()
        };

        let good: Vec<&crate::path::Instance<'a>> = current
            .all_instances()
            .iter()
            .filter(|inst| current.is_good_instance(inst))
            .collect();
        let instances: Vec<&crate::path::Instance<'a>> = if good.len() >= 2 {
            good
        } else {
            current.all_instances().iter().collect()
        };

        for inst in instances {
            let now_vid = if forward {
                inst.back().vertex_id()
            } else {
                inst.front().vertex_id()
            };
            if now_vid != start_vid {
                continue;
            }
            let weight = (inst.length() + 1) as u32;
            let origin = if forward { inst.back() } else { inst.front() };
            let mut it = if forward { origin.next() } else { origin.prev() };
            let mut depth = 1i64;
            while it.valid()
                && (depth < self.looking_depth
                    || (it.position() - origin.position()).abs() <= self.params.max_branch_size)
            {
                let vid = it.vertex_id();
                if current.in_path(vid) || it.used() {
                    break;
                }
                let slot = (vid + vertices) as usize;
                if count[slot] == 0 {
                    data.push(slot);
                }
                count[slot] += weight;
                let diff = (it.abs_position() - origin.abs_position()).abs();
                if count[slot] > ret.count || (count[slot] == ret.count && diff < ret.diff) {
                    ret.diff = diff;
                    ret.count = count[slot];
                    ret.origin = Some(origin);
                    best_vid = vid;
                }
                it = if forward { it.next() } else { it.prev() };
                depth += 1;
            }
        }

        for &slot in data.iter() {
            count[slot] = 0;
        }
        data.clear();
        (best_vid, ret)
    }

    // Commit. The good instances are locked in ascending (chr, stripe)
    // order, the path is replayed into the finalizer under the locks to
    // shield against concurrent commits, and only a still-viable block
    // claims its occurrences.
    fn try_finalize_block(
        &self,
        current: &Path<'a>,
        finalizer: &mut Path<'a>,
        best_right_size: usize,
        best_left_size: usize,
    ) -> bool {
        let mut ranges: Vec<(SeqIter<'a>, SeqIter<'a>)> = current
            .all_instances()
            .iter()
            .filter(|inst| current.is_good_instance(inst))
            .map(|inst| {
                if inst.front().is_positive_strand() {
                    (inst.front(), inst.back())
                } else {
                    (inst.back().reverse(), inst.front().reverse())
                }
            })
            .collect();
        ranges.sort_by_key(|(start, _)| (start.chr_id(), start.index()));

        let mut last = (usize::MAX, usize::MAX);
        let mut guards = Vec::new();
        for (start, end) in &ranges {
            self.storage.lock_range(*start, *end, &mut last, &mut guards);
        }

        finalizer.init(current.origin());
        for i in 0..best_right_size.saturating_sub(1) {
            match current.right_point(i) {
                Some(point) if finalizer.point_push_back(point.edge) => {}
                _ => break,
            }
        }
        for i in 0..best_left_size.saturating_sub(1) {
            match current.left_point(i) {
                Some(point) if finalizer.point_push_front(point.edge) => {}
                _ => break,
            }
        }

        let mut committed = false;
        if finalizer.score(true) > 0 && finalizer.good_instances() > 1 {
            committed = true;
            let block = self.blocks_found.fetch_add(1, Ordering::SeqCst) + 1;
            let mut instance_count = 0u32;
            for inst in finalizer.all_instances() {
                if !finalizer.is_good_instance(inst) {
                    continue;
                }
                let mut it = inst.front();
                loop {
                    it.mark_used();
                    let signed = if it.is_positive_strand() { block } else { -block };
                    self.block_id[it.chr_id()][it.index() as usize]
                        .store(pack_assignment(signed, instance_count), Ordering::SeqCst);
                    if it == inst.back() {
                        break;
                    }
                    it = it.next();
                }
                instance_count += 1;
            }
            self.synteny_path.lock().unwrap().push(finalizer.full_edges());
        }

        finalizer.clear();
        drop(guards);
        committed
    }

    // Randomised-walk extension. Transition probabilities follow the
    // per-vertex bubble counts; the best-scoring snapshot wins and the
    // walk stops once a round fails to improve it by more than a percent.
    fn explore_random(
        &self,
        vid: i64,
        current: &mut Path<'a>,
        finalizer: &mut Path<'a>,
        bubble_count: &[i64],
        rng: &mut StdRng,
    ) {
        current.init(vid);
        if current.instance_count() < 2 {
            current.clear();
            return;
        }

        let mut best = BestPath::default();
        loop {
            let prev_best = best.score;
            for _ in 0..self.sample_size {
                let mut pushed = 0usize;
                for depth in 0i64.. {
                    let e = self.random_backward_edge(current.left_vertex(), bubble_count, rng);
                    match e {
                        Some(e) if depth < self.looking_depth && current.point_push_front(e) => {
                            pushed += 1;
                            let score = current.score(false);
                            if score > best.score && current.instance_count() > 1 {
                                best.score = score;
                                best.left = left_edges(current);
                            }
                        }
                        _ => break,
                    }
                }
                for _ in 0..pushed {
                    current.point_pop_front();
                }
            }
            while current.left_size() > 1 {
                current.point_pop_front();
            }
            for e in best.left.clone() {
                if !current.point_push_front(e) {
                    break;
                }
            }

            for _ in 0..self.sample_size {
                let mut pushed = 0usize;
                for depth in 0i64.. {
                    let e = self.random_forward_edge(current.right_vertex(), bubble_count, rng);
                    match e {
                        Some(e) if depth < self.looking_depth && current.point_push_back(e) => {
                            pushed += 1;
                            let score = current.score(false);
                            if score > best.score && current.instance_count() > 1 {
                                best.score = score;
                                best.right = right_edges(current);
                            }
                        }
                        _ => break,
                    }
                }
                for _ in 0..pushed {
                    current.point_pop_back();
                }
            }
            while current.right_size() > 1 {
                current.point_pop_back();
            }
            for e in best.right.clone() {
                if !current.point_push_back(e) {
                    break;
                }
            }

            if best.score <= prev_best + prev_best / 100 {
                break;
            }
        }

        if current.score(true) > 0
            && current.middle_path_length() >= self.params.min_block_size
            && current.good_instances() > 1
        {
            self.try_finalize_block(current, finalizer, current.right_size(), current.left_size());
        }
        current.clear();
    }

    fn random_forward_edge(
        &self,
        vertex: i64,
        bubble_count: &[i64],
        rng: &mut StdRng,
    ) -> Option<Edge> {
        let vertices = self.storage.vertices_number();
        let mut candidates: Vec<(Edge, i64)> = Vec::new();
        let mut occ = self.storage.vertex_iter(vertex);
        while occ.valid() {
            let seq = occ.sequential();
            occ = occ.next();
            if seq.used() || !seq.next().valid() {
                continue;
            }
            let e = seq.outgoing_edge();
            let weight = bubble_count[(e.end_vertex + vertices) as usize] + 1;
            match candidates.iter_mut().find(|(c, _)| *c == e) {
                Some((_, w)) => *w += weight,
                None => candidates.push((e, weight)),
            }
        }
        pick_weighted(&candidates, rng)
    }

    fn random_backward_edge(
        &self,
        vertex: i64,
        bubble_count: &[i64],
        rng: &mut StdRng,
    ) -> Option<Edge> {
        let vertices = self.storage.vertices_number();
        let mut candidates: Vec<(Edge, i64)> = Vec::new();
        let mut occ = self.storage.vertex_iter(vertex);
        while occ.valid() {
            let seq = occ.sequential();
            occ = occ.next();
            if seq.used() || !seq.prev().valid() {
                continue;
            }
            let e = seq.ingoing_edge();
            let weight = bubble_count[(e.start_vertex + vertices) as usize] + 1;
            match candidates.iter_mut().find(|(c, _)| *c == e) {
                Some((_, w)) => *w += weight,
                None => candidates.push((e, weight)),
            }
        }
        pick_weighted(&candidates, rng)
    }

    fn count_all_bubbles(&self) -> Vec<i64> {
        let vertices = self.storage.vertices_number();
        let mut bubble_count = vec![0i64; (vertices * 2 + 1) as usize];
        for abs_id in 1..vertices {
            for vid in [abs_id, -abs_id] {
                self.count_bubbles(vid, &mut bubble_count);
            }
        }
        bubble_count
    }

    fn count_bubbles(&self, vid: i64, bubble_count: &mut [i64]) {
        let vertices = self.storage.vertices_number();
        let mut visit: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        let mut instance = Vec::new();
        let mut occ = self.storage.vertex_iter(vid);
        while occ.valid() {
            instance.push(occ.sequential());
            occ = occ.next();
        }
        for (i, start) in instance.iter().enumerate() {
            let start_position = start.position();
            let mut vertex = start.next();
            while vertex.valid()
                && (start_position - vertex.position()).abs() < self.params.max_branch_size
            {
                let entry = visit.entry(vertex.vertex_id()).or_default();
                let joined = !entry.is_empty();
                entry.push(i);
                if joined {
                    break;
                }
                vertex = vertex.next();
            }
        }
        for (_, branches) in visit {
            if branches.len() > 1 {
                let n = branches.len() as i64;
                for &branch in &branches {
                    if instance[branch].is_positive_strand() {
                        bubble_count[(vid + vertices) as usize] += n * (n - 1) / 2;
                    }
                }
            }
        }
    }

    /// Collapses the per-position assignments into maximal runs, one
    /// `BlockInstance` per run. The interval spans from the first k-mer
    /// start to the last k-mer end.
    pub fn collect_block_instances(&self) -> Vec<BlockInstance> {
        let k = self.storage.k();
        let mut blocks = Vec::new();
        for chr in 0..self.storage.chr_count() {
            let mut i = 0usize;
            while i < self.storage.chr_size(chr) {
                let packed = self.block_id[chr][i].load(Ordering::SeqCst);
                if packed == 0 {
                    i += 1;
                    continue;
                }
                let mut j = i;
                while j + 1 < self.storage.chr_size(chr)
                    && self.block_id[chr][j + 1].load(Ordering::SeqCst) == packed
                {
                    j += 1;
                }
                let (signed_block, _) = unpack_assignment(packed);
                let start = self.storage.seq_iter(chr, i as i64, true).abs_position();
                let end = self.storage.seq_iter(chr, j as i64, true).abs_position() + k;
                blocks.push(BlockInstance::new(
                    signed_block as i32,
                    chr,
                    start as usize,
                    end as usize,
                ));
                i = j + 1;
            }
        }
        blocks
    }
}

#[derive(Clone, Copy)]
struct NextVertex<'a> {
    diff: i64,
    count: u32,
    origin: Option<SeqIter<'a>>,
}

#[derive(Default)]
struct BestPath {
    score: i64,
    left: Vec<Edge>,
    right: Vec<Edge>,
}

fn left_edges(path: &Path<'_>) -> Vec<Edge> {
    (0..path.left_size().saturating_sub(1))
        .filter_map(|i| path.left_point(i).map(|p| p.edge))
        .collect()
}

fn right_edges(path: &Path<'_>) -> Vec<Edge> {
    (0..path.right_size().saturating_sub(1))
        .filter_map(|i| path.right_point(i).map(|p| p.edge))
        .collect()
}

fn pick_weighted(candidates: &[(Edge, i64)], rng: &mut StdRng) -> Option<Edge> {
    let total: i64 = candidates.iter().map(|(_, w)| *w).sum();
    if total <= 0 {
        return None;
    }
    let mut roll = rng.gen_range(0..total);
    for (e, w) in candidates {
        if roll < *w {
            return Some(*e);
        }
        roll -= w;
    }
    None
}
