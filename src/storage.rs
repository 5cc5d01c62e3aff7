// Junction storage: the immutable indexed view over the input genomes.
//
// Built once at startup from the binary junction stream and the genome
// FASTA; after construction the only mutable state is the per-occurrence
// atomic `used` flag and the stripe mutexes that guard block commits.
// Everything else is plain shared data, so the whole structure can be
// borrowed read-only by every worker thread.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use bio::io::fasta;
use flate2::read::GzDecoder;

use crate::dna;
use crate::edge::Edge;
use crate::junction::{JunctionReader, JunctionRecord};

#[path = "storage_test.rs"]
mod storage_test;

// One junction occurrence in chromosome order.
#[derive(Debug)]
struct Position {
    id: i32,
    pos: i32,
    used: AtomicBool,
}

// The same occurrence in the per-vertex table, sorted by (chr, idx).
// `ch` is the character following the k-mer on the forward strand and
// `rev_ch` the character preceding it on the reverse complement.
#[derive(Debug)]
struct VertexRecord {
    id: i32,
    chr: u32,
    idx: u32,
    pos: i32,
    ch: u8,
    rev_ch: u8,
}

#[derive(Debug)]
pub struct JunctionStorage {
    k: i64,
    sequence: Vec<Vec<u8>>,
    description: Vec<String>,
    position: Vec<Vec<Position>>,
    vertex: Vec<Vec<VertexRecord>>,
    mutexes: Vec<Vec<Mutex<()>>>,
    chr_shift: Vec<u32>,
}

fn format_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn open_plain_or_gz(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

impl JunctionStorage {
    pub fn open(
        junction_path: &Path,
        genome_path: &Path,
        k: usize,
        threads: usize,
    ) -> io::Result<Self> {
        let records = JunctionReader::open(junction_path)?.read_all()?;

        let mut sequences = Vec::new();
        let reader = fasta::Reader::new(open_plain_or_gz(genome_path)?);
        for result in reader.records() {
            let record = result?;
            let name = match record.desc() {
                Some(desc) => format!("{} {}", record.id(), desc),
                None => record.id().to_string(),
            };
            sequences.push((name, record.seq().to_ascii_uppercase()));
        }

        Self::from_parts(&records, sequences, k, threads)
    }

    /// Builds the storage from in-memory parts. The records must be sorted
    /// by (chr, pos) with chromosomes numbered contiguously from zero, and
    /// `sequences` must hold one (description, bases) pair per chromosome.
    pub fn from_parts(
        records: &[JunctionRecord],
        sequences: Vec<(String, Vec<u8>)>,
        k: usize,
        threads: usize,
    ) -> io::Result<Self> {
        let k = k as i64;
        let mut position: Vec<Vec<Position>> = Vec::new();
        let mut vertex: Vec<Vec<VertexRecord>> = Vec::new();

        for record in records {
            if record.id == 0 {
                return Err(format_error("zero vertex id in junction stream".into()));
            }
            if record.pos > i32::MAX as u32 {
                return Err(format_error(format!(
                    "junction position {} exceeds the supported chromosome length",
                    record.pos
                )));
            }
            let chr = record.chr as usize;
            if chr == position.len() {
                position.push(Vec::new());
            } else if chr + 1 != position.len() {
                return Err(format_error(
                    "junction stream is not grouped by chromosome".into(),
                ));
            }
            let chr_positions = &mut position[chr];
            if let Some(last) = chr_positions.last() {
                if last.pos >= record.pos as i32 {
                    return Err(format_error(format!(
                        "junction stream is not sorted by position at chr {} pos {}",
                        chr, record.pos
                    )));
                }
            }

            let idx = chr_positions.len() as u32;
            chr_positions.push(Position {
                id: record.id,
                pos: record.pos as i32,
                used: AtomicBool::new(false),
            });

            let abs_id = record.id.unsigned_abs() as usize;
            while abs_id >= vertex.len() {
                vertex.push(Vec::new());
            }
            vertex[abs_id].push(VertexRecord {
                id: record.id,
                chr: record.chr,
                idx,
                pos: record.pos as i32,
                ch: b'N',
                rev_ch: b'N',
            });
        }

        if sequences.len() != position.len() {
            return Err(format_error(format!(
                "FASTA holds {} records but the junction stream covers {} chromosomes",
                sequences.len(),
                position.len()
            )));
        }

        let mut description = Vec::with_capacity(sequences.len());
        let mut sequence = Vec::with_capacity(sequences.len());
        for (name, seq) in sequences {
            description.push(name);
            sequence.push(seq);
        }

        for (chr, chr_positions) in position.iter().enumerate() {
            for p in chr_positions {
                if p.pos as usize + k as usize > sequence[chr].len() {
                    return Err(format_error(format!(
                        "junction at chr {} pos {} reaches outside the chromosome",
                        chr, p.pos
                    )));
                }
            }
        }

        for records in vertex.iter_mut() {
            for record in records.iter_mut() {
                let seq = &sequence[record.chr as usize];
                let pos = record.pos as usize;
                record.ch = seq.get(pos + k as usize).copied().unwrap_or(b'N');
                record.rev_ch = if pos > 0 {
                    dna::complement(seq[pos - 1])
                } else {
                    b'N'
                };
            }
            records.sort_by_key(|r| (r.chr, r.idx));
        }

        // Stripe count per chromosome is bounded below by the worker count
        // so that commits rarely contend on the same mutex.
        let threads = threads.max(1);
        let mut mutex_bits: u32 = 3;
        while (1usize << mutex_bits) < threads * 128 {
            mutex_bits += 1;
        }
        let mut mutexes = Vec::with_capacity(position.len());
        let mut chr_shift = Vec::with_capacity(position.len());
        for chr_positions in &position {
            let mut size_bits: u32 = 1;
            while (1i64 << size_bits) <= chr_positions.len() as i64 {
                size_bits += 1;
            }
            chr_shift.push(size_bits.saturating_sub(mutex_bits));
            mutexes.push((0..1usize << mutex_bits).map(|_| Mutex::new(())).collect());
        }

        Ok(JunctionStorage {
            k,
            sequence,
            description,
            position,
            vertex,
            mutexes,
            chr_shift,
        })
    }

    pub fn k(&self) -> i64 {
        self.k
    }

    pub fn chr_count(&self) -> usize {
        self.position.len()
    }

    pub fn chr_size(&self, chr: usize) -> usize {
        self.position[chr].len()
    }

    pub fn chr_sequence(&self, chr: usize) -> &[u8] {
        &self.sequence[chr]
    }

    pub fn chr_description(&self, chr: usize) -> &str {
        &self.description[chr]
    }

    /// Number of distinct absolute vertex ids, including the reserved zero.
    pub fn vertices_number(&self) -> i64 {
        self.vertex.len() as i64
    }

    /// Occurrence count of a vertex; the same for both strands.
    pub fn instances_count(&self, vertex_id: i64) -> usize {
        self.vertex[vertex_id.unsigned_abs() as usize].len()
    }

    pub fn seq_iter(&self, chr: usize, idx: i64, positive_strand: bool) -> SeqIter<'_> {
        SeqIter {
            storage: self,
            chr,
            idx,
            forward: positive_strand,
        }
    }

    pub fn begin(&self, chr: usize, positive_strand: bool) -> SeqIter<'_> {
        let idx = if positive_strand {
            0
        } else {
            self.chr_size(chr) as i64 - 1
        };
        self.seq_iter(chr, idx, positive_strand)
    }

    pub fn vertex_iter(&self, vertex_id: i64) -> VertexIter<'_> {
        let len = self.vertex[vertex_id.unsigned_abs() as usize].len();
        VertexIter {
            storage: self,
            vid: vertex_id,
            iidx: if vertex_id > 0 { 0 } else { len as i64 - 1 },
        }
    }

    pub fn mutex_count(&self) -> usize {
        self.mutexes.first().map_or(0, |m| m.len())
    }

    fn mutex_idx(&self, chr: usize, idx: usize) -> usize {
        let stripe = idx >> self.chr_shift[chr];
        debug_assert!(stripe < self.mutexes[chr].len());
        stripe
    }

    /// Locks every stripe covering the inclusive forward-oriented range
    /// `[start, end]`. The `(last_chr, last_stripe)` scratch pair threads
    /// across calls so that adjacent acquisitions coalesce; callers must
    /// present ranges in ascending (chr, stripe) order. Guards accumulate
    /// into `guards` and unlock when the vector is dropped.
    pub fn lock_range<'a>(
        &'a self,
        start: SeqIter<'a>,
        end: SeqIter<'a>,
        last: &mut (usize, usize),
        guards: &mut Vec<MutexGuard<'a, ()>>,
    ) {
        debug_assert!(start.forward && end.forward);
        let mut it = start;
        loop {
            let chr = it.chr_id();
            let stripe = self.mutex_idx(chr, it.index() as usize);
            if (chr, stripe) != *last {
                debug_assert!(*last == (usize::MAX, usize::MAX) || (chr, stripe) > *last);
                guards.push(self.mutexes[chr][stripe].lock().unwrap());
                *last = (chr, stripe);
            }
            if it == end {
                break;
            }
            it = it.next();
        }
    }

    fn char_after(&self, chr: usize, pos: i64) -> u8 {
        self.sequence[chr]
            .get((pos + self.k) as usize)
            .copied()
            .unwrap_or(b'N')
    }

    fn char_before(&self, chr: usize, pos: i64) -> u8 {
        if pos > 0 {
            dna::complement(self.sequence[chr][pos as usize - 1])
        } else {
            b'N'
        }
    }
}

/// Walks the junctions of one chromosome in strand order: increasing index
/// on the forward strand, decreasing on the reverse. Cheap and copyable;
/// all state is a coordinate triple.
#[derive(Clone, Copy)]
pub struct SeqIter<'a> {
    storage: &'a JunctionStorage,
    chr: usize,
    idx: i64,
    forward: bool,
}

impl<'a> SeqIter<'a> {
    fn position_record(&self) -> &'a Position {
        &self.storage.position[self.chr][self.idx as usize]
    }

    pub fn valid(&self) -> bool {
        self.idx >= 0 && (self.idx as usize) < self.storage.chr_size(self.chr)
    }

    pub fn is_positive_strand(&self) -> bool {
        self.forward
    }

    pub fn chr_id(&self) -> usize {
        self.chr
    }

    pub fn index(&self) -> i64 {
        self.idx
    }

    pub fn vertex_id(&self) -> i64 {
        let id = self.position_record().id as i64;
        if self.forward {
            id
        } else {
            -id
        }
    }

    /// Strand-oriented position: the k-mer start on the forward strand, the
    /// k-mer end on the reverse, so that successive junctions of a reverse
    /// traversal keep their spacing.
    pub fn position(&self) -> i64 {
        let pos = self.position_record().pos as i64;
        if self.forward {
            pos
        } else {
            pos + self.storage.k
        }
    }

    /// Raw forward-chromosome position regardless of strand.
    pub fn abs_position(&self) -> i64 {
        self.position_record().pos as i64
    }

    pub fn used(&self) -> bool {
        self.position_record().used.load(Ordering::SeqCst)
    }

    pub fn mark_used(&self) {
        self.position_record().used.store(true, Ordering::SeqCst);
    }

    /// Character this junction emits along the traversal strand.
    pub fn ch(&self) -> u8 {
        let pos = self.abs_position();
        if self.forward {
            self.storage.char_after(self.chr, pos)
        } else {
            self.storage.char_before(self.chr, pos)
        }
    }

    /// Edge to the next junction along the traversal. The successor must be
    /// in range; callers check `self.next().valid()` first.
    pub fn outgoing_edge(&self) -> Edge {
        let s = self.storage;
        let now = self.position_record();
        if self.forward {
            let next = &s.position[self.chr][self.idx as usize + 1];
            Edge::new(
                now.id as i64,
                next.id as i64,
                s.char_after(self.chr, now.pos as i64),
                s.char_before(self.chr, next.pos as i64),
                (next.pos - now.pos) as i64,
            )
        } else {
            let next = &s.position[self.chr][self.idx as usize - 1];
            Edge::new(
                -(now.id as i64),
                -(next.id as i64),
                s.char_before(self.chr, now.pos as i64),
                s.char_after(self.chr, next.pos as i64),
                (now.pos - next.pos) as i64,
            )
        }
    }

    /// Edge from the previous junction along the traversal; same range
    /// precondition as `outgoing_edge`, mirrored.
    pub fn ingoing_edge(&self) -> Edge {
        let s = self.storage;
        let now = self.position_record();
        if self.forward {
            let prev = &s.position[self.chr][self.idx as usize - 1];
            Edge::new(
                prev.id as i64,
                now.id as i64,
                s.char_after(self.chr, prev.pos as i64),
                s.char_before(self.chr, now.pos as i64),
                (now.pos - prev.pos) as i64,
            )
        } else {
            let prev = &s.position[self.chr][self.idx as usize + 1];
            Edge::new(
                -(prev.id as i64),
                -(now.id as i64),
                s.char_before(self.chr, prev.pos as i64),
                s.char_after(self.chr, now.pos as i64),
                (prev.pos - now.pos) as i64,
            )
        }
    }

    pub fn next(mut self) -> Self {
        self.idx += if self.forward { 1 } else { -1 };
        self
    }

    pub fn prev(mut self) -> Self {
        self.idx += if self.forward { -1 } else { 1 };
        self
    }

    /// Same junction, opposite strand.
    pub fn reverse(mut self) -> Self {
        self.forward = !self.forward;
        self
    }
}

impl PartialEq for SeqIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.chr == other.chr && self.idx == other.idx && self.forward == other.forward
    }
}

impl Eq for SeqIter<'_> {}

impl std::fmt::Debug for SeqIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SeqIter(chr {}, idx {}, {})",
            self.chr,
            self.idx,
            if self.forward { '+' } else { '-' }
        )
    }
}

/// Enumerates every occurrence of a signed vertex id. A positive query
/// scans the stored (chr, idx)-sorted vector as-is; a negative query scans
/// the same vector in reverse, mirroring the traversal direction. An
/// occurrence whose stored id matches the query sign is a forward-strand
/// hit; the others are reverse-strand hits.
#[derive(Clone, Copy)]
pub struct VertexIter<'a> {
    storage: &'a JunctionStorage,
    vid: i64,
    iidx: i64,
}

impl<'a> VertexIter<'a> {
    fn record(&self) -> &'a VertexRecord {
        &self.storage.vertex[self.vid.unsigned_abs() as usize][self.iidx as usize]
    }

    pub fn valid(&self) -> bool {
        self.iidx >= 0
            && (self.iidx as usize) < self.storage.vertex[self.vid.unsigned_abs() as usize].len()
    }

    pub fn is_positive_strand(&self) -> bool {
        self.record().id as i64 == self.vid
    }

    pub fn vertex_id(&self) -> i64 {
        self.vid
    }

    pub fn chr_id(&self) -> usize {
        self.record().chr as usize
    }

    pub fn index(&self) -> i64 {
        self.record().idx as i64
    }

    pub fn position(&self) -> i64 {
        self.record().pos as i64
    }

    pub fn ch(&self) -> u8 {
        if self.is_positive_strand() {
            self.record().ch
        } else {
            self.record().rev_ch
        }
    }

    pub fn used(&self) -> bool {
        self.storage.position[self.chr_id()][self.index() as usize]
            .used
            .load(Ordering::SeqCst)
    }

    pub fn sequential(&self) -> SeqIter<'a> {
        self.storage
            .seq_iter(self.chr_id(), self.index(), self.is_positive_strand())
    }

    pub fn next(mut self) -> Self {
        self.iidx += if self.vid > 0 { 1 } else { -1 };
        self
    }
}
