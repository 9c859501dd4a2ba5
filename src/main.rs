//! lockscan CLI entry point

use anyhow::{Context, Result};
use env_logger::{Builder, Target};
use lockscan::client::sim::{SimBehavior, SimClient};
use lockscan::client::AccountQuery;
use lockscan::config::cli::Cli;
use lockscan::config::{toml as scan_file, ScanPlan};
use lockscan::coordinator::Coordinator;
use lockscan::directory::{FileDirectory, Node, NodeDirectory, StaticDirectory};
use lockscan::output::{json, text};
use lockscan::report::FleetReport;
use lockscan::strategy::create_strategy;
use log::LevelFilter;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    println!("lockscan v{}", env!("CARGO_PKG_VERSION"));
    println!("Concurrent account lockout scanner");
    println!();

    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;
    init_logging(cli.verbose);

    // Resolve the effective plan from CLI and scan file
    let plan = scan_file::build_plan(&cli)?;
    if let Err(e) = plan.validate() {
        anyhow::bail!("Scan plan validation failed: {}", e);
    }

    // Display the plan
    print!("{}", plan);

    if plan.dry_run {
        println!();
        println!("Dry run mode - scan plan validated successfully");
        return Ok(());
    }

    println!();
    println!("Starting scan...");
    println!();

    run_scan(&plan)
}

/// Execute the scan described by the plan
fn run_scan(plan: &ScanPlan) -> Result<()> {
    // Resolve the node list
    let nodes = match (&plan.servers[..], &plan.servers_file) {
        ([], Some(path)) => FileDirectory::new(path).list_nodes()?,
        (names, _) => StaticDirectory::new(names.iter().cloned()).list_nodes()?,
    };

    let client = build_sim_client(plan, &nodes);
    let coordinator = Coordinator::new(plan.run.clone(), client)?;

    let mut query = AccountQuery::new(plan.account.clone());
    if let Some(ref base) = plan.search_base {
        query = query.with_search_base(base.clone());
    }

    let mut strategy = create_strategy(plan.strategy);

    let start = Instant::now();
    let reports = coordinator.run(&nodes, &query, strategy.as_mut())?;
    let elapsed = start.elapsed();

    let fleet = FleetReport::reduce(&reports);
    text::print_results(&reports, &fleet, nodes.len(), elapsed, plan);

    if let Some(ref path) = plan.json_output {
        let doc = json::build_scan_report(&plan.account, &reports, &fleet, nodes.len(), elapsed);
        json::write_json_report(path, &doc)
            .with_context(|| format!("Failed to write JSON report: {}", path.display()))?;
        println!("JSON report written to {}", path.display());
    }

    Ok(())
}

/// Build the simulated backend for this run
///
/// Every node gets seeded pseudo-random behavior first; nodes named in
/// the fail and hang lists are then overridden.
fn build_sim_client(plan: &ScanPlan, nodes: &[Node]) -> Arc<SimClient> {
    let client = SimClient::randomized(plan.sim.seed, nodes);

    for name in &plan.sim.fail {
        client.set_node(name, SimBehavior::unreachable());
    }
    for name in &plan.sim.hang {
        client.set_node(name, SimBehavior::hanging(Duration::from_secs(3600)));
    }

    Arc::new(client)
}

/// Wire log verbosity to the -v count, honoring RUST_LOG when set
fn init_logging(verbosity: u8) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new()
        .target(Target::Stderr)
        .filter_level(level)
        .format_timestamp(None)
        .init();
}
