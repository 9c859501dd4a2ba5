//! TOML scan file parsing

use super::{default_concurrency, RunConfig, ScanPlan, SimConfig};
use crate::config::cli::{Cli, StrategyArg};
use crate::strategy::StrategyKind;
use crate::util::time::parse_duration;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk scan file
///
/// Every field is optional; the CLI supplies or overrides whatever the
/// file leaves out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanFile {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub fleet: FleetSection,
}

/// `[scan]` section: what to look up and how hard to push
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanSection {
    pub account: Option<String>,
    pub search_base: Option<String>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub node_timeout_secs: Option<u64>,
    pub strategy: Option<String>,
    pub json_output: Option<PathBuf>,
}

/// `[fleet]` section: which nodes to query and how they are simulated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetSection {
    #[serde(default)]
    pub servers: Vec<String>,
    pub servers_file: Option<PathBuf>,
    pub sim_seed: Option<u64>,
    #[serde(default)]
    pub sim_fail: Vec<String>,
    #[serde(default)]
    pub sim_hang: Vec<String>,
}

/// Parse a TOML scan file
pub fn parse_scan_file(path: &Path) -> Result<ScanFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scan file: {}", path.display()))?;

    parse_scan_string(&contents)
        .with_context(|| format!("Failed to parse scan file: {}", path.display()))
}

/// Parse a TOML scan file from a string
pub fn parse_scan_string(contents: &str) -> Result<ScanFile> {
    let file: ScanFile = ::toml::from_str(contents).context("Failed to parse TOML scan file")?;

    Ok(file)
}

/// Parse a strategy name from the scan file
pub fn parse_strategy(name: &str) -> Result<StrategyKind> {
    match name {
        "isolated" => Ok(StrategyKind::Isolated),
        "pooled" => Ok(StrategyKind::Pooled),
        other => anyhow::bail!("Unknown strategy '{}'. Use isolated or pooled", other),
    }
}

/// Split a comma-separated node list, dropping blank entries
pub fn split_server_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Resolve the effective scan plan from CLI arguments and the optional
/// scan file (CLI takes precedence)
pub fn build_plan(cli: &Cli) -> Result<ScanPlan> {
    let file = match cli.config {
        Some(ref path) => parse_scan_file(path)?,
        None => ScanFile::default(),
    };

    let account = cli
        .account
        .clone()
        .or_else(|| file.scan.account.clone())
        .unwrap_or_default();

    let search_base = cli
        .search_base
        .clone()
        .or_else(|| file.scan.search_base.clone());

    let concurrency = cli
        .concurrency
        .or(file.scan.concurrency)
        .unwrap_or_else(default_concurrency);

    let defaults = RunConfig::default();

    let global_timeout = match cli.timeout {
        Some(ref s) => parse_duration(s).with_context(|| format!("invalid --timeout '{}'", s))?,
        None => file
            .scan
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.global_timeout),
    };

    let node_timeout = match cli.node_timeout {
        Some(ref s) => {
            parse_duration(s).with_context(|| format!("invalid --node-timeout '{}'", s))?
        }
        None => file
            .scan
            .node_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.node_timeout),
    };

    let strategy = match cli.strategy {
        Some(StrategyArg::Isolated) => StrategyKind::Isolated,
        Some(StrategyArg::Pooled) => StrategyKind::Pooled,
        None => match file.scan.strategy.as_deref() {
            Some(name) => parse_strategy(name)?,
            None => StrategyKind::default(),
        },
    };

    // A node source given on the command line replaces both file sources
    let (servers, servers_file) = if let Some(ref list) = cli.servers {
        (split_server_list(list), None)
    } else if let Some(ref path) = cli.servers_file {
        (Vec::new(), Some(path.clone()))
    } else if !file.fleet.servers.is_empty() {
        (file.fleet.servers.clone(), None)
    } else {
        (Vec::new(), file.fleet.servers_file.clone())
    };

    let sim = SimConfig {
        seed: if cli.sim_seed != 42 {
            cli.sim_seed
        } else {
            file.fleet.sim_seed.unwrap_or(cli.sim_seed)
        },
        fail: if !cli.sim_fail.is_empty() {
            cli.sim_fail.clone()
        } else {
            file.fleet.sim_fail.clone()
        },
        hang: if !cli.sim_hang.is_empty() {
            cli.sim_hang.clone()
        } else {
            file.fleet.sim_hang.clone()
        },
    };

    let json_output = cli
        .json_output
        .clone()
        .or_else(|| file.scan.json_output.clone());

    Ok(ScanPlan {
        account,
        search_base,
        servers,
        servers_file,
        strategy,
        run: RunConfig {
            concurrency,
            global_timeout,
            node_timeout,
        },
        sim,
        json_output,
        dry_run: cli.dry_run,
    })
}
