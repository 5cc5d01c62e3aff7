// Binary junction stream input and output.
//
// Records are fixed 12-byte little-endian triples (chr: u32, id: i32,
// pos: u32) sorted by (chr, pos). The same format is consumed here and
// produced by the graph-construction stage upstream; the writer also backs
// the test suite.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const RECORD_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionRecord {
    pub chr: u32,
    /// Signed vertex id; positive for a forward-strand k-mer, negative for
    /// its reverse complement. Zero is reserved and never appears.
    pub id: i32,
    /// Absolute position of the k-mer start on the forward chromosome.
    pub pos: u32,
}

#[path = "junction_test.rs"]
mod junction_test;

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "truncated junction stream")
}

pub struct JunctionReader<R: Read> {
    inner: R,
}

impl JunctionReader<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(JunctionReader {
            inner: BufReader::new(File::open(path)?),
        })
    }
}

impl<R: Read> JunctionReader<R> {
    pub fn new(inner: R) -> Self {
        JunctionReader { inner }
    }

    /// Reads the next record, or `None` at a clean end of stream. A stream
    /// ending in the middle of a record is an input-format error.
    pub fn next_junction(&mut self) -> io::Result<Option<JunctionRecord>> {
        let mut chr_buf = [0u8; 4];
        let mut filled = 0;
        while filled < chr_buf.len() {
            let n = self.inner.read(&mut chr_buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < chr_buf.len() {
            return Err(truncated());
        }

        let mut id_buf = [0u8; 4];
        let mut pos_buf = [0u8; 4];
        for buf in [&mut id_buf, &mut pos_buf] {
            self.inner.read_exact(buf).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    truncated()
                } else {
                    e
                }
            })?;
        }

        Ok(Some(JunctionRecord {
            chr: u32::from_le_bytes(chr_buf),
            id: i32::from_le_bytes(id_buf),
            pos: u32::from_le_bytes(pos_buf),
        }))
    }

    pub fn read_all(mut self) -> io::Result<Vec<JunctionRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_junction()? {
            records.push(record);
        }
        Ok(records)
    }
}

pub struct JunctionWriter<W: Write> {
    inner: W,
}

impl JunctionWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(JunctionWriter {
            inner: BufWriter::new(File::create(path)?),
        })
    }
}

impl<W: Write> JunctionWriter<W> {
    pub fn new(inner: W) -> Self {
        JunctionWriter { inner }
    }

    pub fn write_junction(&mut self, record: &JunctionRecord) -> io::Result<()> {
        self.inner.write_all(&record.chr.to_le_bytes())?;
        self.inner.write_all(&record.id.to_le_bytes())?;
        self.inner.write_all(&record.pos.to_le_bytes())?;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
