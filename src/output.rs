// Output formatting for committed blocks: legacy coordinate listing, GFF,
// per-block sequences, the coverage report and the Graphviz dump.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::block::{compare_by_chr, compare_by_id, group_by, BlockInstance};
use crate::dna;
use crate::edge::Edge;
use crate::storage::JunctionStorage;

const DELIMITER_WIDTH: usize = 80;

pub fn create_out_directory(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("cannot create directory {}: {}", path.display(), e),
        )
    })
}

fn try_create(path: &Path) -> io::Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| {
        io::Error::new(e.kind(), format!("cannot open file {}: {}", path.display(), e))
    })?;
    Ok(BufWriter::new(file))
}

fn delimiter() -> String {
    "-".repeat(DELIMITER_WIDTH)
}

fn list_chrs(out: &mut impl Write, storage: &JunctionStorage) -> io::Result<()> {
    writeln!(out, "Seq_id\tSize\tDescription")?;
    for chr in 0..storage.chr_count() {
        writeln!(
            out,
            "{}\t{}\t{}",
            chr + 1,
            storage.chr_sequence(chr).len(),
            storage.chr_description(chr)
        )?;
    }
    writeln!(out, "{}", delimiter())?;
    Ok(())
}

fn output_index(block: &BlockInstance) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        block.chr_id() + 1,
        if block.signed_id() < 0 { '-' } else { '+' },
        block.conventional_start(),
        block.conventional_end(),
        block.length()
    )
}

/// Legacy coordinate listing: chromosome table followed by one section per
/// block with a line per instance.
pub fn list_blocks_indices(
    storage: &JunctionStorage,
    blocks: &[BlockInstance],
    path: &Path,
) -> io::Result<()> {
    let mut out = try_create(path)?;
    list_chrs(&mut out, storage)?;
    let mut blocks = blocks.to_vec();
    for (begin, end) in group_by(&mut blocks, compare_by_id) {
        blocks[begin..end].sort_by(compare_by_chr);
        writeln!(out, "Block #{}", blocks[begin].block_id())?;
        writeln!(out, "Seq_id\tStrand\tStart\tEnd\tLength")?;
        for block in &blocks[begin..end] {
            writeln!(out, "{}", output_index(block))?;
        }
        writeln!(out, "{}", delimiter())?;
    }
    out.flush()
}

/// GFF3 listing, one feature per instance.
pub fn list_blocks_indices_gff(
    storage: &JunctionStorage,
    blocks: &[BlockInstance],
    path: &Path,
) -> io::Result<()> {
    let mut out = try_create(path)?;
    writeln!(out, "##gff-version 3")?;
    let mut blocks = blocks.to_vec();
    for (begin, end) in group_by(&mut blocks, compare_by_id) {
        for (instance, block) in blocks[begin..end].iter().enumerate() {
            let description = storage.chr_description(block.chr_id());
            let seqid = description.split_whitespace().next().unwrap_or(description);
            writeln!(
                out,
                "{}\t{}\tLCB\t{}\t{}\t.\t{}\t.\tID=block_{};Instance={}",
                seqid,
                env!("CARGO_PKG_NAME"),
                block.start() + 1,
                block.end(),
                if block.direction() { '+' } else { '-' },
                block.block_id(),
                instance
            )?;
        }
    }
    out.flush()
}

fn output_lines(
    out: &mut impl Write,
    mut chars: impl Iterator<Item = u8>,
    length: usize,
) -> io::Result<()> {
    for i in 1..=length {
        let ch = chars.next().unwrap_or(b'N');
        out.write_all(&[ch])?;
        if i % 80 == 0 && i != length {
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Multi-FASTA with the sequence of every instance, reverse-complemented
/// for the negative strand.
pub fn list_blocks_sequences(
    storage: &JunctionStorage,
    blocks: &[BlockInstance],
    path: &Path,
) -> io::Result<()> {
    let mut out = try_create(path)?;
    let mut blocks = blocks.to_vec();
    for (begin, end) in group_by(&mut blocks, compare_by_id) {
        for block in &blocks[begin..end] {
            let chr = block.chr_id();
            let strand = if block.direction() { '+' } else { '-' };
            writeln!(
                out,
                ">Seq=\"{}\",Strand='{}',Block_id={},Start={},End={}",
                storage.chr_description(chr),
                strand,
                block.block_id(),
                block.conventional_start(),
                block.conventional_end()
            )?;
            let sequence = storage.chr_sequence(chr);
            if block.direction() {
                output_lines(
                    &mut out,
                    sequence[block.start()..block.end()].iter().copied(),
                    block.length(),
                )?;
            } else {
                output_lines(
                    &mut out,
                    sequence[block.start()..block.end()]
                        .iter()
                        .rev()
                        .map(|&ch| dna::complement(ch)),
                    block.length(),
                )?;
            }
            writeln!(out)?;
        }
    }
    out.flush()
}

fn coverage_of_groups(
    storage: &JunctionStorage,
    groups: &[&[BlockInstance]],
) -> Vec<f64> {
    let mut ret = Vec::new();
    let mut total_bp = 0f64;
    let mut total_covered = 0f64;
    for chr in 0..storage.chr_count() {
        let size = storage.chr_sequence(chr).len();
        total_bp += size as f64;
        let mut cover = vec![false; size];
        for group in groups {
            for block in group.iter() {
                if block.chr_id() == chr {
                    for covered in cover[block.start()..block.end()].iter_mut() {
                        *covered = true;
                    }
                }
            }
        }
        let covered = cover.iter().filter(|&&c| c).count() as f64;
        ret.push(covered / size as f64 * 100.0);
        total_covered += covered;
    }
    ret.insert(0, total_covered / total_bp * 100.0);
    ret
}

/// Percentage of all input bases covered by some block.
pub fn total_coverage(storage: &JunctionStorage, blocks: &[BlockInstance]) -> f64 {
    coverage_of_groups(storage, &[blocks])[0]
}

/// Coverage report grouped by block multiplicity: for every copy count,
/// how much of each chromosome the blocks of that degree cover.
pub fn generate_report(
    storage: &JunctionStorage,
    blocks: &[BlockInstance],
    path: &Path,
) -> io::Result<()> {
    let mut out = try_create(path)?;
    list_chrs(&mut out, storage)?;

    let mut blocks = blocks.to_vec();
    let mut by_degree: Vec<(usize, Vec<BlockInstance>)> = Vec::new();
    for (begin, end) in group_by(&mut blocks, compare_by_id) {
        by_degree.push((end - begin, blocks[begin..end].to_vec()));
    }
    by_degree.sort_by_key(|(degree, _)| *degree);

    write!(out, "Degree\tCount\tTotal")?;
    for chr in 0..storage.chr_count() {
        write!(out, "\tSeq {}", chr + 1)?;
    }
    writeln!(out)?;

    let mut groups = Vec::new();
    {
        let mut now = 0;
        while now < by_degree.len() {
            let prev = now;
            while now < by_degree.len() && by_degree[now].0 == by_degree[prev].0 {
                now += 1;
            }
            groups.push((prev, now));
        }
    }
    groups.push((0, by_degree.len()));

    for (index, (begin, end)) in groups.iter().enumerate() {
        if index + 1 < groups.len() {
            write!(out, "{}\t{}\t", by_degree[*begin].0, end - begin)?;
        } else {
            write!(out, "All\t{}\t", end - begin)?;
        }
        let slices: Vec<&[BlockInstance]> = by_degree[*begin..*end]
            .iter()
            .map(|(_, group)| group.as_slice())
            .collect();
        let coverage = coverage_of_groups(storage, &slices);
        let formatted: Vec<String> = coverage.iter().map(|c| format!("{:.2}%", c)).collect();
        writeln!(out, "{}", formatted.join("\t"))?;
    }
    writeln!(out, "{}", delimiter())?;
    out.flush()
}

/// Writes every output artifact into `out_dir`.
pub fn generate_output(
    storage: &JunctionStorage,
    blocks: &[BlockInstance],
    out_dir: &Path,
    gen_sequences: bool,
) -> io::Result<()> {
    create_out_directory(out_dir)?;
    list_blocks_indices(storage, blocks, &out_dir.join("blocks_coords.txt"))?;
    list_blocks_indices_gff(storage, blocks, &out_dir.join("blocks_coords.gff"))?;
    generate_report(storage, blocks, &out_dir.join("coverage_report.txt"))?;
    if gen_sequences {
        list_blocks_sequences(storage, blocks, &out_dir.join("blocks_sequences.fasta"))?;
    }
    Ok(())
}

/// Graphviz dump of the junction graph, forward edges in blue, reverse in
/// red, committed block paths in green.
pub fn dump_graph(
    storage: &JunctionStorage,
    synteny_paths: &[Vec<Edge>],
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "digraph G\n{{\nrankdir = LR")?;
    for chr in 0..storage.chr_count() {
        for idx in 0..storage.chr_size(chr) as i64 - 1 {
            let it = storage.seq_iter(chr, idx, true);
            let jt = it.next();
            writeln!(
                out,
                "{} -> {}[label=\"{}, {}, {}\" color=blue]",
                it.vertex_id(),
                jt.vertex_id(),
                it.ch() as char,
                chr,
                it.position()
            )?;
            writeln!(
                out,
                "{} -> {}[label=\"{}, {}, {}\" color=red]",
                jt.reverse().vertex_id(),
                it.reverse().vertex_id(),
                jt.reverse().ch() as char,
                chr,
                jt.reverse().position()
            )?;
        }
    }
    for (block, edges) in synteny_paths.iter().enumerate() {
        for e in edges {
            writeln!(
                out,
                "{} -> {}[label=\"{}, {}\" color=green]",
                e.start_vertex,
                e.end_vertex,
                e.ch as char,
                block + 1
            )?;
            let r = e.reverse();
            writeln!(
                out,
                "{} -> {}[label=\"{}, {}\" color=green]",
                r.start_vertex,
                r.end_vertex,
                r.ch as char,
                -((block + 1) as i64)
            )?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}
