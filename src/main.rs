use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use lcb_find::finder::BlocksFinder;
use lcb_find::opts::FinderOpt;
use lcb_find::output;
use lcb_find::storage::JunctionStorage;

#[derive(Parser)]
#[command(name = "lcb-find")]
#[command(about = "Construction of locally collinear blocks from complete genomes", long_about = None)]
#[command(version)]
struct Cli {
    /// Value of k; must be odd
    #[arg(short = 'k', long = "kvalue", value_name = "INT", default_value_t = 25)]
    k: usize,

    /// Maximum branch size
    #[arg(short = 'b', long = "branchsize", value_name = "INT", default_value_t = 125)]
    max_branch_size: i64,

    /// Maximum flank size
    #[arg(short = 'f', long = "flanksize", value_name = "INT", default_value_t = 50)]
    max_flanking_size: i64,

    /// Minimum block size
    #[arg(short = 'm', long = "blocksize", value_name = "INT", default_value_t = 300)]
    min_block_size: i64,

    /// Looking depth of the greedy extender, in vertices
    #[arg(long = "depth", value_name = "INT", default_value_t = 8)]
    looking_depth: i64,

    /// Sample size for the randomized walk extender (0 = vote count mode)
    #[arg(long = "ssize", value_name = "INT", default_value_t = 0)]
    sample_size: i64,

    /// Number of worker threads (0 = all available cores)
    #[arg(short = 't', long, value_name = "INT", default_value_t = 1)]
    threads: usize,

    /// Extend from every vertex instead of bubble sources only
    #[arg(long)]
    all_seeds: bool,

    /// Input junction file
    #[arg(long = "infile", value_name = "FILE")]
    infile: PathBuf,

    /// FASTA file with the genomes
    #[arg(long = "gfile", value_name = "FILE")]
    gfile: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "outdir", value_name = "DIR", default_value = "out")]
    outdir: PathBuf,

    /// Write per-block sequences next to the coordinates
    #[arg(long)]
    gen_seq: bool,

    /// Dump the junction graph and the found paths in DOT format
    #[arg(short = 'd', long)]
    dump_graph: bool,

    /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, value_name = "INT", default_value_t = 3)]
    verbosity: i32,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> io::Result<()> {
    let threads = if cli.threads == 0 {
        num_cpus::get()
    } else {
        cli.threads
    };
    let opt = FinderOpt {
        k: cli.k,
        max_branch_size: cli.max_branch_size,
        max_flanking_size: cli.max_flanking_size,
        min_block_size: cli.min_block_size,
        looking_depth: cli.looking_depth,
        sample_size: cli.sample_size,
        threads,
        all_seeds: cli.all_seeds,
    };
    opt.validate()?;

    log::info!(
        "Loading junctions from {} and genomes from {}",
        cli.infile.display(),
        cli.gfile.display()
    );
    let mark = Instant::now();
    let storage = JunctionStorage::open(&cli.infile, &cli.gfile, opt.k, opt.threads)?;
    log::info!(
        "Loaded {} chromosomes, {} vertices in {:.2}s",
        storage.chr_count(),
        storage.vertices_number().saturating_sub(1),
        mark.elapsed().as_secs_f64()
    );

    let mark = Instant::now();
    let mut finder = BlocksFinder::new(&storage);
    finder.find_blocks(&opt)?;
    log::info!("Search time: {:.2}s", mark.elapsed().as_secs_f64());

    let blocks = finder.collect_block_instances();
    log::info!("Blocks found: {}", finder.blocks_found());
    log::info!(
        "Total coverage: {:.2}%",
        output::total_coverage(&storage, &blocks)
    );

    output::generate_output(&storage, &blocks, &cli.outdir, cli.gen_seq)?;
    if cli.dump_graph {
        let mut out = BufWriter::new(File::create(cli.outdir.join("graph.dot"))?);
        output::dump_graph(&storage, &finder.synteny_paths(), &mut out)?;
    }
    Ok(())
}
