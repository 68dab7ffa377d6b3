use water_balancer::{
    BalancerMetrics, BalancerSettings, Config, DatabaseBalancer, Inventory, MonteCarloMaterializer, NodeKey,
    PackageOptions, SamplePackage, WaterProductTables,
};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

/// Rebalance sampled water flows of an inventory and package the samples
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to $CONFIG_FILE or config/water_balancer.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inventory JSON file
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Collection of processes to balance
    #[arg(short, long)]
    database: Option<String>,

    /// Biosphere database holding elementary flows
    #[arg(long)]
    biosphere: Option<String>,

    /// Release version of the water product tables
    #[arg(long)]
    release: Option<String>,

    /// Monte-Carlo iterations per process
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Seed for reproducible draws
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Balance a single process, given by its code
    #[arg(long)]
    process: Option<String>,

    /// Print balance plans without sampling
    #[arg(long)]
    dry_run: bool,

    /// Package output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Package name
    #[arg(long)]
    name: Option<String>,

    /// Replace an existing package with the same id
    #[arg(long)]
    overwrite: bool,

    /// Write the inventory, with water formulas, back to this file
    #[arg(long)]
    save_inventory: Option<PathBuf>,

    /// Write Prometheus metrics to this file
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default()?,
    };
    apply_overrides(&mut config, &args);

    water_balancer::utils::init_from_config(&config.logging)?;

    if config.general.database.is_empty() {
        bail!("no database to balance: set general.database or pass --database");
    }

    info!(inventory = %config.general.inventory, "Loading inventory");
    let mut inventory = Inventory::from_json_file(&config.general.inventory)?;

    let tables = if config.lookup.tables_path.is_empty() {
        WaterProductTables::builtin()?
    } else {
        WaterProductTables::from_file(&config.lookup.tables_path)?
    };

    let settings = BalancerSettings {
        database: config.general.database.clone(),
        biosphere: config.general.biosphere.clone(),
        release: config.general.release_version.clone(),
    };
    let mut balancer = DatabaseBalancer::new(&inventory, &settings, &tables)?;
    if config.metrics.enabled || args.metrics_out.is_some() {
        balancer = balancer.with_metrics(BalancerMetrics::new()?);
    }

    if args.dry_run {
        let plans: Vec<_> = balancer
            .plan_all(&inventory)
            .into_iter()
            .map(|(key, plan)| match plan {
                Ok(plan) => serde_json::json!({ "process": key, "plan": plan }),
                Err(err) => serde_json::json!({ "process": key, "error": err.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    let materializer = match config.sampling.seed {
        Some(seed) => MonteCarloMaterializer::with_seed(seed),
        None => MonteCarloMaterializer::new(),
    };
    let iterations = config.sampling.iterations;

    if let Some(code) = &args.process {
        let key = NodeKey::new(config.general.database.as_str(), code.as_str());
        let strategy = balancer.add_samples_for_process(&mut inventory, &key, &materializer, iterations)?;
        info!(process = %key, strategy = %strategy, "Balanced process");
    } else if config.sampling.workers > 1 {
        balancer.add_samples_parallel(&mut inventory, &materializer, iterations, config.sampling.workers)?;
    } else {
        balancer.add_samples_for_all(&mut inventory, &materializer, iterations);
    }

    let report = balancer.report();
    for failure in &report.failures {
        warn!(process = %failure.key, "{}", failure.message);
    }
    println!("{}", serde_json::to_string_pretty(report)?);

    if let Some(path) = &args.save_inventory {
        inventory.save_json_file(path)?;
        info!(path = %path.display(), "Saved inventory");
    }

    if let Some(metrics) = balancer.metrics() {
        let path = args
            .metrics_out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.metrics.output_path));
        if !path.as_os_str().is_empty() {
            std::fs::write(&path, metrics.render()?)
                .with_context(|| format!("writing metrics to {}", path.display()))?;
        }
    }

    let options = PackageOptions {
        name: config.output.package_name.clone(),
        id: None,
        directory: PathBuf::from(&config.output.directory),
        overwrite: config.output.overwrite,
        seed: materializer.seed(),
    };
    match SamplePackage::write(balancer.collection(), &options)? {
        Some(package) => println!("Package {} written at {}", package.id, package.path.display()),
        None => println!("No samples to package"),
    }

    Ok(())
}

/// Command-line flags take precedence over the configuration file
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(inventory) = &args.inventory {
        config.general.inventory = inventory.display().to_string();
    }
    if let Some(database) = &args.database {
        config.general.database = database.clone();
    }
    if let Some(biosphere) = &args.biosphere {
        config.general.biosphere = biosphere.clone();
    }
    if let Some(release) = &args.release {
        config.general.release_version = Some(release.clone());
    }
    if let Some(iterations) = args.iterations {
        config.sampling.iterations = iterations;
    }
    if let Some(seed) = args.seed {
        config.sampling.seed = Some(seed);
    }
    if let Some(workers) = args.workers {
        config.sampling.workers = workers;
    }
    if let Some(output) = &args.output {
        config.output.directory = output.display().to_string();
    }
    if let Some(name) = &args.name {
        config.output.package_name = name.clone();
    }
    if args.overwrite {
        config.output.overwrite = true;
    }
}
