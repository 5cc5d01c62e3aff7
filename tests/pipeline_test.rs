// File-level pipeline test: write a junction stream and a FASTA to disk,
// load them through the storage, run the finder and check the artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lcb_find::finder::BlocksFinder;
use lcb_find::junction::{JunctionRecord, JunctionWriter};
use lcb_find::opts::FinderOpt;
use lcb_find::output;
use lcb_find::storage::JunctionStorage;

fn setup_test_dir(test_name: &str) -> io::Result<PathBuf> {
    let temp_dir = PathBuf::from(format!("target/test_{test_name}"));
    if temp_dir.exists() {
        fs::remove_dir_all(&temp_dir)?;
    }
    fs::create_dir_all(&temp_dir)?;
    Ok(temp_dir)
}

fn cleanup_test_dir(temp_dir: &Path) {
    if temp_dir.exists() {
        if let Err(e) = fs::remove_dir_all(temp_dir) {
            eprintln!("Failed to clean up {}: {}", temp_dir.display(), e);
        }
    }
}

fn cycle(pattern: &[u8], len: usize) -> Vec<u8> {
    pattern.iter().copied().cycle().take(len).collect()
}

// Two chromosomes sharing one 500 bp region with 100 bp private flanks.
fn write_inputs(dir: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let shared = cycle(b"GATTACACCGGTTAACC", 500);
    let mut chr_a = cycle(b"AAAAC", 100);
    chr_a.extend_from_slice(&shared);
    chr_a.extend_from_slice(&cycle(b"GGGGA", 100));
    let mut chr_b = cycle(b"TTTTG", 100);
    chr_b.extend_from_slice(&shared);
    chr_b.extend_from_slice(&cycle(b"CCCCT", 100));

    let junction_path = dir.join("junctions.bin");
    let mut writer = JunctionWriter::create(&junction_path)?;
    for (chr, head_base, tail_base) in [(0u32, 100, 200), (1u32, 300, 400)] {
        for slot in 0..4 {
            writer.write_junction(&JunctionRecord {
                chr,
                id: head_base + slot,
                pos: slot as u32 * 25,
            })?;
        }
        for slot in 0..20 {
            writer.write_junction(&JunctionRecord {
                chr,
                id: 1 + slot,
                pos: 100 + slot as u32 * 25,
            })?;
        }
        for slot in 0..4 {
            writer.write_junction(&JunctionRecord {
                chr,
                id: tail_base + slot,
                pos: 600 + slot as u32 * 25,
            })?;
        }
    }
    writer.finish()?;

    let fasta_path = dir.join("genomes.fa");
    let mut fasta = String::new();
    for (name, seq) in [("chrA", &chr_a), ("chrB", &chr_b)] {
        fasta.push_str(&format!(">{}\n", name));
        fasta.push_str(std::str::from_utf8(seq).unwrap());
        fasta.push('\n');
    }
    fs::write(&fasta_path, fasta)?;

    Ok((junction_path, fasta_path))
}

#[test]
fn test_end_to_end_pipeline() -> io::Result<()> {
    let temp_dir = setup_test_dir("pipeline")?;
    let (junction_path, fasta_path) = write_inputs(&temp_dir)?;

    let opt = FinderOpt {
        k: 5,
        threads: 1,
        ..Default::default()
    };
    let storage = JunctionStorage::open(&junction_path, &fasta_path, opt.k, opt.threads)?;
    assert_eq!(storage.chr_count(), 2);
    assert_eq!(storage.chr_size(0), 28);
    assert_eq!(storage.chr_description(0), "chrA");

    let mut finder = BlocksFinder::new(&storage);
    finder.find_blocks(&opt)?;
    assert_eq!(finder.blocks_found(), 1);

    let blocks = finder.collect_block_instances();
    assert_eq!(blocks.len(), 2);
    for block in &blocks {
        assert_eq!((block.start(), block.end()), (100, 580));
    }

    let out_dir = temp_dir.join("out");
    output::generate_output(&storage, &blocks, &out_dir, true)?;

    let coords = fs::read_to_string(out_dir.join("blocks_coords.txt"))?;
    assert!(coords.contains("Seq_id\tSize\tDescription"));
    assert!(coords.contains("Block #1"));
    assert!(coords.contains("1\t+\t101\t580\t480"));
    assert!(coords.contains("2\t+\t101\t580\t480"));

    let gff = fs::read_to_string(out_dir.join("blocks_coords.gff"))?;
    assert!(gff.starts_with("##gff-version 3"));
    assert!(gff.contains("chrA\tlcb-find\tLCB\t101\t580\t.\t+\t.\tID=block_1"));

    let sequences = fs::read_to_string(out_dir.join("blocks_sequences.fasta"))?;
    assert_eq!(sequences.matches('>').count(), 2);
    // Both instances carry the shared sequence.
    let shared = cycle(b"GATTACACCGGTTAACC", 480);
    assert!(sequences.replace('\n', "").contains(std::str::from_utf8(&shared).unwrap()));

    let report = fs::read_to_string(out_dir.join("coverage_report.txt"))?;
    assert!(report.contains("Degree\tCount\tTotal"));

    let coverage = output::total_coverage(&storage, &blocks);
    assert!(coverage > 60.0 && coverage < 75.0);

    cleanup_test_dir(&temp_dir);
    Ok(())
}

#[test]
fn test_missing_input_fails() {
    let err = JunctionStorage::open(
        Path::new("target/does_not_exist.bin"),
        Path::new("target/does_not_exist.fa"),
        5,
        1,
    )
    .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}
