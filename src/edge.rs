// A directed labelled edge between two consecutive junction occurrences on
// one chromosome. Edges are never stored; iterators build them on the fly.

/// `ch` is the character following the k-mer of the start vertex on the
/// traversal strand, `rev_ch` the character emitted by the same edge when
/// read on the opposite strand. `length` is the positive gap between the
/// two junction positions.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub start_vertex: i64,
    pub end_vertex: i64,
    pub ch: u8,
    pub rev_ch: u8,
    pub length: i64,
}

#[path = "edge_test.rs"]
mod edge_test;

impl Edge {
    pub fn new(start_vertex: i64, end_vertex: i64, ch: u8, rev_ch: u8, length: i64) -> Self {
        Edge {
            start_vertex,
            end_vertex,
            ch,
            rev_ch,
            length,
        }
    }

    /// The same edge read on the opposite strand. An involution.
    pub fn reverse(&self) -> Edge {
        Edge {
            start_vertex: -self.end_vertex,
            end_vertex: -self.start_vertex,
            ch: self.rev_ch,
            rev_ch: self.ch,
            length: self.length,
        }
    }

    pub fn valid(&self) -> bool {
        self.start_vertex != 0 && self.end_vertex != 0
    }
}

// Two edges are the same iff they connect the same vertices with the same
// emitted character; `rev_ch` and `length` are derived and do not take part.
impl PartialEq for Edge {
    fn eq(&self, other: &Edge) -> bool {
        self.start_vertex == other.start_vertex
            && self.end_vertex == other.end_vertex
            && self.ch == other.ch
    }
}

impl Eq for Edge {}
