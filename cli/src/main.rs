use anyhow::Context;
use clap::{Parser, Subcommand};
use grt_common::db::core::RoutingDB;
use grt_common::db::parser::ispd;
use grt_common::util::config::Config;
use grt_common::util::generator::{self, BenchmarkParams};
use grt_common::util::{check, logger, visualization};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a benchmark and write the segments.
    Route {
        /// Overrides `input.benchmark`.
        #[arg(long)]
        benchmark: Option<String>,
        /// Overrides `input.output_routes`.
        #[arg(long)]
        output: Option<String>,
    },
    /// Write a random benchmark.
    Generate {
        #[arg(long, default_value_t = 64)]
        x_grids: u32,
        #[arg(long, default_value_t = 64)]
        y_grids: u32,
        #[arg(long, default_value_t = 4)]
        layers: u8,
        #[arg(long, default_value_t = 8)]
        capacity: u32,
        #[arg(long, default_value_t = 2000)]
        nets: usize,
        #[arg(long, default_value_t = 6)]
        max_pins: usize,
        #[arg(long, default_value_t = 16)]
        max_span: u32,
        #[arg(long, default_value_t = 20)]
        blockages: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value = "inputs/random.gr")]
        output: String,
    },
    /// Verify a route file against its benchmark.
    Check {
        routes: String,
        /// Overrides `input.benchmark`.
        #[arg(long)]
        benchmark: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config: Config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    let command = args.command.unwrap_or(Commands::Route {
        benchmark: None,
        output: None,
    });

    match command {
        Commands::Generate {
            x_grids,
            y_grids,
            layers,
            capacity,
            nets,
            max_pins,
            max_span,
            blockages,
            seed,
            output,
        } => {
            prepare_output_dir(&output)?;
            let params = BenchmarkParams {
                x_grids,
                y_grids,
                layers,
                capacity,
                nets,
                max_pins,
                max_span,
                blockages,
                seed,
            };
            log::info!(
                "Generating random benchmark ({}x{}x{}, {} nets, seed {})...",
                x_grids,
                y_grids,
                layers,
                nets,
                seed
            );
            let db = generator::generate_random_benchmark(&params);
            ispd::write_benchmark(&output, &db)?;
            log::info!("Generated: {}", output);
        }
        Commands::Route { benchmark, output } => {
            let benchmark = benchmark.unwrap_or_else(|| config.input.benchmark.clone());
            let output = output.unwrap_or_else(|| config.input.output_routes.clone());
            if run_routing(&config, &benchmark, &output).is_err() {
                std::process::exit(1);
            }
        }
        Commands::Check { routes, benchmark } => {
            let benchmark = benchmark.unwrap_or_else(|| config.input.benchmark.clone());
            let db = load_benchmark(&benchmark)?;
            let parsed = ispd::parse_routes(&routes, &db)?;
            let report = check::verify_routes(&db, &parsed).map_err(|e| anyhow::anyhow!(e))?;
            log::info!(
                "{}: WL {}, vias {}, overflow {} (max {})",
                routes,
                report.wirelength,
                report.vias,
                report.total_overflow,
                report.max_overflow
            );
        }
    }

    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn load_benchmark(path: &str) -> anyhow::Result<RoutingDB> {
    if !Path::new(path).exists() {
        return Err(anyhow::anyhow!("Benchmark file missing: {}", path));
    }
    ispd::parse(path).with_context(|| format!("Invalid benchmark '{}'", path))
}

fn run_routing(config: &Config, benchmark: &str, output: &str) -> anyhow::Result<()> {
    let db = load_benchmark(benchmark)?;

    if config.routing.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(config.routing.threads)
            .build_global()
        {
            log::warn!("Could not size the worker pool: {}", e);
        }
    }

    let result = grt_router::route(&db, &config.routing).map_err(|e| {
        log::error!("Routing failed: {}", e);
        anyhow::Error::from(e)
    })?;
    log::info!(
        "Result: WL {}, vias {}, overflow {} (max {}), layer overflow {}, {} unresolved nets",
        result.wirelength,
        result.via_count,
        result.total_overflow,
        result.max_overflow,
        result.layer_overflow,
        result.unresolved
    );

    if let Err(e) = check::verify_routes(&db, &result.nets) {
        log::error!("Route verification failed: {}", e);
        return Err(anyhow::anyhow!(e));
    }

    prepare_output_dir(output)?;
    ispd::write_routes(output, &db, &result.nets)?;

    if let Some(heatmap) = &config.input.heatmap {
        prepare_output_dir(heatmap)?;
        log::info!("Generating congestion heat map...");
        if let Err(e) = visualization::draw_congestion(&db, &result.nets, heatmap, 8) {
            log::warn!("Heat map failed: {}", e);
        }
    }
    Ok(())
}
