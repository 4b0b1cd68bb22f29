//! px - pixel cache and colorspace transform CLI
//!
//! Inspects cache storage decisions, runs colorspace transforms on
//! synthetic images and samples virtual pixels.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use px_core::{ResourceLimits, ResourceManager};

mod commands;

#[derive(Parser)]
#[command(name = "px")]
#[command(author, version, about = "Pixel cache and colorspace transform CLI")]
#[command(long_about = "
Exercises the px pixel cache: storage selection under resource limits,
whole-image colorspace transforms and virtual pixel policies.

Examples:
  px info -W 4000 -H 3000                     # Limits and planned storage
  px --memory-limit 1MB info -W 1000 -H 1000  # Forces a memory-mapped cache
  px transform --to lab --round-trip          # RGB -> Lab -> RGB error
  px transform --to cmyk -W 1920 -H 1080 -j 4
  px sample --method mirror -- -3,2 10,-1
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Heap budget for pixel caches (e.g. 512MB, 2GiB, unlimited)
    #[arg(long, global = true, value_parser = parse_size)]
    memory_limit: Option<u64>,

    /// Budget for memory-mapped caches
    #[arg(long, global = true, value_parser = parse_size)]
    map_limit: Option<u64>,

    /// Budget for disk caches
    #[arg(long, global = true, value_parser = parse_size)]
    disk_limit: Option<u64>,

    /// Largest pixel count kept in memory
    #[arg(long, global = true, value_parser = parse_size)]
    area_limit: Option<u64>,

    /// Directory for cache files
    #[arg(long, global = true)]
    temporary_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resource limits and the storage a cache would get
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Transform a synthetic image to another colorspace
    #[command(visible_alias = "t")]
    Transform(TransformArgs),

    /// Read virtual pixels around a synthetic image
    #[command(visible_alias = "s")]
    Sample(SampleArgs),
}

/// Arguments for the `info` command.
#[derive(Args)]
struct InfoArgs {
    /// Image width to plan for
    #[arg(short = 'W', long, default_value = "1920")]
    columns: usize,

    /// Image height to plan for
    #[arg(short = 'H', long, default_value = "1080")]
    rows: usize,

    /// Plan with an index channel (CMYK black or palette indexes)
    #[arg(long)]
    indexes: bool,

    /// Allocate the cache instead of only planning it
    #[arg(long)]
    open: bool,
}

/// Arguments for the `transform` command.
#[derive(Args)]
struct TransformArgs {
    /// Target colorspace (e.g. lab, cmyk, rec709ycbcr, srgb)
    #[arg(short, long)]
    to: String,

    /// Image width
    #[arg(short = 'W', long, default_value = "512")]
    columns: usize,

    /// Image height
    #[arg(short = 'H', long, default_value = "512")]
    rows: usize,

    /// Transform back to RGB and report the error
    #[arg(short, long)]
    round_trip: bool,

    /// Image property as NAME=VALUE (e.g. gamma=2.2 for log)
    #[arg(short, long = "property")]
    properties: Vec<String>,
}

/// Arguments for the `sample` command.
#[derive(Args)]
struct SampleArgs {
    /// Coordinates as X,Y (may lie outside the image)
    #[arg(required = true, allow_hyphen_values = true)]
    points: Vec<String>,

    /// Virtual pixel method (e.g. edge, tile, mirror, constant)
    #[arg(short, long, default_value = "edge")]
    method: String,

    /// Image width
    #[arg(short = 'W', long, default_value = "8")]
    columns: usize,

    /// Image height
    #[arg(short = 'H', long, default_value = "8")]
    rows: usize,
}

fn parse_size(text: &str) -> Result<u64, String> {
    px_core::parse_size(text).map_err(|e| e.to_string())
}

impl Cli {
    /// Environment limits with command-line overrides on top.
    fn resources(&self) -> Arc<ResourceManager> {
        let mut limits = ResourceLimits::from_env();
        if let Some(v) = self.memory_limit {
            limits = limits.with_memory(v);
        }
        if let Some(v) = self.map_limit {
            limits = limits.with_map(v);
        }
        if let Some(v) = self.disk_limit {
            limits = limits.with_disk(v);
        }
        if let Some(v) = self.area_limit {
            limits = limits.with_area(v);
        }
        if let Some(path) = &self.temporary_path {
            limits = limits.with_temporary_path(path);
        }
        if self.threads > 0 {
            limits = limits.with_threads(self.threads);
        }
        ResourceManager::new(limits)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Size of the global rayon pool, or `None` to keep rayon's default.
///
/// `-j` wins; otherwise a thread limit other than the core count
/// (e.g. from `PX_THREAD_LIMIT`) caps the pool.
fn pool_threads(cli_threads: usize, limits: &ResourceLimits) -> Option<usize> {
    if cli_threads > 0 {
        Some(cli_threads)
    } else if limits.threads != px_core::system_threads() {
        Some(limits.threads)
    } else {
        None
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let resources = cli.resources();

    // Configure thread pool
    if let Some(threads) = pool_threads(cli.threads, resources.limits()) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Info(args) => commands::info::run(args, &resources, cli.verbose),
        Commands::Transform(args) => commands::transform::run(args, &resources, cli.verbose),
        Commands::Sample(args) => commands::sample::run(args, &resources, cli.verbose),
    }
}
