#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use bench_bridge::backend::default_backend;
use bench_bridge::engine::{Engine, EngineConfig};
use bench_bridge::report::{RunConfig, render_markdown};
use bench_bridge::{BridgeResult, harness, logging};

#[derive(Parser, Debug)]
#[command(name = "bench-bridge")]
#[command(about = "Drive the built-in benchmark backend through its handle protocol", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set BENCH_BRIDGE_LOG)
    #[arg(long)]
    verbose: bool,

    /// Engine settings (TOML) passed to the backend at init
    #[arg(long, value_name = "engine.toml")]
    engine_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the registered benchmarks
    List,

    /// Show a benchmark descriptor and its default parameter sets
    Describe {
        /// Catalog index, as printed by `list`
        index: usize,
    },

    /// Run one benchmark through the full pipeline and report timings
    Run {
        /// Run settings (TOML); flags below override it
        #[arg(long, value_name = "run.toml")]
        config: Option<PathBuf>,
        /// Catalog index, as printed by `list`
        #[arg(long)]
        descriptor: Option<usize>,
        /// Default parameter set to use
        #[arg(long)]
        default_set: Option<usize>,
        /// Number of measured iterations of `operate`
        #[arg(long)]
        iterations: Option<u32>,
        /// Number of warmup iterations before measuring
        #[arg(long)]
        warmup: Option<u32>,
        /// Seed for generated operands
        #[arg(long)]
        seed: Option<u64>,
        /// Write machine-readable JSON report to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn load_engine(path: Option<&PathBuf>) -> BridgeResult<Engine> {
    let config = match path {
        Some(p) => {
            let bytes = std::fs::read(p).map_err(|e| {
                bench_bridge::BridgeError::invalid_args(format!("reading {}: {e}", p.display()))
            })?;
            EngineConfig::from_bytes(&bytes)?
        }
        None => EngineConfig::default(),
    };
    Engine::with_backend(default_backend().as_ref(), config)
}

fn list(engine: &Engine) -> BridgeResult<()> {
    for (i, h) in engine.list_descriptors().iter().enumerate() {
        let (_, descriptor, _) = harness::describe(engine, i)?;
        println!(
            "[{i}] {} | {:?} | {} | {}{}",
            descriptor.workload.name(),
            descriptor.category,
            engine.scheme_name(descriptor.scheme)?,
            engine.security_name(descriptor.security)?,
            engine.benchmark_description_ex(h, None)?
        );
    }
    Ok(())
}

fn describe(engine: &Engine, index: usize) -> BridgeResult<()> {
    let (h, descriptor, defaults) = harness::describe(engine, index)?;
    println!("{} ({:?})", descriptor.workload.name(), descriptor.category);
    println!("  data type: {:?}", descriptor.data_type);
    println!("  cipher mask: {:#x}", descriptor.cipher_param_mask);
    for (i, set) in defaults.iter().enumerate() {
        let rendered: Vec<String> = set.iter().map(|p| format!("{}={}", p.name(), p.bits)).collect();
        println!(
            "  default set {i}: {}{}",
            rendered.join(", "),
            engine.benchmark_description_ex(&h, Some(set))?
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run(
    engine: &Engine,
    config: Option<PathBuf>,
    descriptor: Option<usize>,
    default_set: Option<usize>,
    iterations: Option<u32>,
    warmup: Option<u32>,
    seed: Option<u64>,
    json: Option<PathBuf>,
) -> BridgeResult<()> {
    let mut cfg = match config {
        Some(p) => RunConfig::from_toml_file(&p)?,
        None => RunConfig::default(),
    };
    if let Some(v) = descriptor {
        cfg.descriptor = v;
    }
    if let Some(v) = default_set {
        cfg.default_set = v;
    }
    if let Some(v) = iterations {
        cfg.measured_iterations = v;
    }
    if let Some(v) = warmup {
        cfg.warmup_iterations = v;
    }
    if let Some(v) = seed {
        cfg.seed = v;
    }

    let backend = default_backend();
    let report = harness::run(engine, backend.as_ref(), &cfg)?;
    if let Some(path) = json {
        report.write_json(&path)?;
        info!(path = %path.display(), "wrote JSON report");
    }
    println!("{}", render_markdown(&report));
    if !report.verification.passed {
        return Err(bench_bridge::BridgeError::critical(format!(
            "decoded results differ from the reference (max abs error {:e})",
            report.verification.max_abs_error
        )));
    }
    Ok(())
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    logging::init(None, cli.verbose);

    let result = load_engine(cli.engine_config.as_ref()).and_then(|engine| match cli.command {
        Commands::List => list(&engine),
        Commands::Describe { index } => describe(&engine, index),
        Commands::Run { config, descriptor, default_set, iterations, warmup, seed, json } => {
            run(&engine, config, descriptor, default_set, iterations, warmup, seed, json)
        }
    });

    if let Err(e) = result {
        eprintln!("error (code {:#x}): {e}", e.code());
        std::process::exit(1);
    }
}
