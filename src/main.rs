// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eikonal_agsi::config::{BoundActiveBlocks, RunConfig, RunOptions, OPTION_DOCS};
use eikonal_agsi::core::BlockGrid;
use eikonal_agsi::scheduler::{ProgressInfo, Solver};
use eikonal_agsi::update_kernels::IsotropicKernel;

#[derive(Parser)]
#[command(
    name = "eikonal-agsi",
    about = "Block-structured adaptive propagation eikonal solver"
)]
struct Cli {
    /// Domain shape, comma-separated (e.g., 256,256); 1 to 3 axes
    #[arg(short = 's', long)]
    size: Option<String>,

    /// Tile shape, comma-separated; defaults to 64 cells per tile
    #[arg(long)]
    tile: Option<String>,

    /// Periodic axis index (repeatable)
    #[arg(long)]
    periodic: Vec<usize>,

    /// Seed as "i,j[=value]" (repeatable); value defaults to 0
    #[arg(long, num_args = 1)]
    seed: Vec<String>,

    /// Uniform cost
    #[arg(long, default_value = "1.0")]
    cost: f64,

    /// JSON file with solver options; replaces the option flags below
    #[arg(long)]
    options: Option<PathBuf>,

    /// Scheduling strategy: global_iteration or AGSI
    #[arg(long, default_value = "AGSI")]
    solver: String,

    /// Maximum number of rounds
    #[arg(long, default_value = "2000")]
    nitermax: usize,

    /// Store values as f32 plus an integer multiple of a fixed step
    #[arg(long)]
    multiprecision: bool,

    /// Reconstruct multiprecision values directly in f64
    #[arg(long)]
    values_float64: bool,

    /// Double-buffer the value field
    #[arg(long)]
    strict: bool,

    /// Use per-block flags instead of the candidate list
    #[arg(long)]
    no_pruning: bool,

    /// Target admitted-block count, or "auto"
    #[arg(long)]
    bound_active_blocks: Option<String>,

    /// Minimum admission-window growth per round
    #[arg(long)]
    min_chg_delta_min: Option<f64>,

    /// Return partial values with a warning when the round cap is hit
    #[arg(long)]
    warn_on_non_convergence: bool,

    /// Grid spacing
    #[arg(long, default_value = "1.0")]
    grid_scale: f64,

    /// Smallest decrease counted as a change
    #[arg(short = 't', long)]
    tolerance: Option<f64>,

    /// Relaxation sweeps per block visit
    #[arg(long, default_value = "1")]
    inner_iterations: usize,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Print per-round progress to stderr
    #[arg(long)]
    progress: bool,

    /// Write the value field as JSON
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// List recognized options with defaults and exit
    #[arg(long)]
    list_options: bool,
}

fn parse_list<T: std::str::FromStr>(s: &str, what: &str) -> Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    s.split(',')
        .map(|p| p.trim().parse::<T>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid {}: expected comma-separated values", what))
}

fn to_array<const N: usize>(v: &[usize], what: &str) -> Result<[usize; N]> {
    match <[usize; N]>::try_from(v) {
        Ok(a) => Ok(a),
        Err(_) => bail!("{} has {} components, expected {}", what, v.len(), N),
    }
}

fn parse_seed(s: &str) -> Result<(Vec<usize>, f64)> {
    let (index, value) = match s.split_once('=') {
        Some((index, value)) => (
            index,
            value
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid seed value in '{}'", s))?,
        ),
        None => (s, 0.0),
    };
    Ok((parse_list(index, "--seed")?, value))
}

fn run_options(cli: &Cli) -> Result<RunOptions> {
    if let Some(path) = &cli.options {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("failed to parse options in {}", path.display()));
    }

    let bound_active_blocks = match cli.bound_active_blocks.as_deref() {
        None => BoundActiveBlocks::Flag(false),
        Some("auto") => BoundActiveBlocks::Flag(true),
        Some(n) => BoundActiveBlocks::Count(
            n.parse::<f64>()
                .context("invalid --bound-active-blocks: expected a number or 'auto'")?,
        ),
    };

    Ok(RunOptions {
        solver: cli.solver.clone(),
        multiprecision: cli.multiprecision,
        values_float64: cli.values_float64,
        nitermax_o: cli.nitermax,
        bound_active_blocks,
        min_chg_delta_min: cli.min_chg_delta_min,
        raise_on_non_convergence: !cli.warn_on_non_convergence,
        strict_iter_o: cli.strict,
        pruning: !cli.no_pruning,
        grid_scale: cli.grid_scale,
        tol: cli.tolerance,
    })
}

fn run<const N: usize>(cli: &Cli, size: &[usize], config: RunConfig) -> Result<()> {
    let shape: [usize; N] = to_array(size, "--size")?;
    let tile: [usize; N] = match &cli.tile {
        Some(t) => to_array(&parse_list::<usize>(t, "--tile")?, "--tile")?,
        None => [[64, 8, 4][N - 1]; N],
    };
    let mut periodic = [false; N];
    for &axis in &cli.periodic {
        if axis >= N {
            bail!("--periodic axis {} out of range for {} dimensions", axis, N);
        }
        periodic[axis] = true;
    }

    let grid = BlockGrid::new(shape, tile)?.with_periodic(periodic);
    let mut solver = Solver::uniform(grid, cli.cost, config)?;
    if let Some(threads) = cli.threads {
        solver = solver.with_threads(threads);
    }
    if cli.progress {
        solver = solver.with_progress(Box::new(|info: ProgressInfo| {
            eprintln!(
                "[{:.1}s] round={} candidates={} active={} frozen={} window=[{}, {}]",
                info.elapsed.as_secs_f64(),
                info.round,
                info.candidates,
                info.active,
                info.frozen,
                info.window.prev,
                info.window.next,
            );
        }));
    }

    for s in &cli.seed {
        let (index, value) = parse_seed(s)?;
        solver.add_seed(to_array(&index, "--seed")?, value)?;
    }

    let kernel = IsotropicKernel::new().with_inner_iterations(cli.inner_iterations);
    let out = solver.solve(&kernel)?;

    if let Some(warning) = &out.warning {
        eprintln!("warning: {}", warning);
    }
    let (min, max) = out
        .values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    println!(
        "solver={} rounds={} converged={} elapsed={:.3}s range=[{}, {}]",
        solver.config().solver,
        out.rounds,
        out.converged,
        out.elapsed.as_secs_f64(),
        min,
        max
    );

    if let Some(path) = &cli.output {
        let doc = serde_json::json!({
            "shape": out.values.shape(),
            "rounds": out.rounds,
            "converged": out.converged,
            "values": out.values.iter().map(|&v| if v.is_finite() { Some(v) } else { None }).collect::<Vec<_>>(),
        });
        std::fs::write(path, serde_json::to_string(&doc)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_options {
        for doc in OPTION_DOCS {
            println!("{:<24} {:<34} {}", doc.key, doc.default, doc.help);
        }
        return Ok(());
    }

    let Some(size) = &cli.size else {
        bail!("--size is required");
    };
    if cli.seed.is_empty() {
        bail!("at least one --seed must be specified");
    }
    let size: Vec<usize> = parse_list(size, "--size")?;
    let config = RunConfig::try_from(run_options(&cli)?)?;

    match size.len() {
        1 => run::<1>(&cli, &size, config)?,
        2 => run::<2>(&cli, &size, config)?,
        3 => run::<3>(&cli, &size, config)?,
        n => bail!("--size must have 1 to 3 components, got {}", n),
    }

    Ok(())
}
