//! CLI argument parsing using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Execution strategy for node queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Dedicated thread per node, launched in capped batches
    Isolated,
    /// Fixed worker pool fed through a task queue (default)
    Pooled,
}

/// lockscan - Concurrent account lockout scanner for directory fleets
#[derive(Parser, Debug)]
#[command(name = "lockscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Account identifier to scan
    #[arg(short = 'a', long)]
    pub account: Option<String>,

    /// Search base narrowing where the account lookup starts
    #[arg(long)]
    pub search_base: Option<String>,

    // === Fleet Options ===
    /// Comma-separated node list (e.g., "dc01,dc02,dc03")
    #[arg(long, env = "LOCKSCAN_SERVERS")]
    pub servers: Option<String>,

    /// File containing node names (one per line, # comments allowed)
    #[arg(long)]
    pub servers_file: Option<PathBuf>,

    // === Run Options ===
    /// Maximum node queries in flight at once (1-20)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Whole-scan deadline (e.g., 30s, 2m)
    #[arg(short = 't', long)]
    pub timeout: Option<String>,

    /// Budget for a single node query (e.g., 10s, 500ms)
    #[arg(long)]
    pub node_timeout: Option<String>,

    /// How node queries are spread across worker threads
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    // === Simulation Options ===
    /// Seed driving simulated counters and latency jitter
    #[arg(long, default_value = "42")]
    pub sim_seed: u64,

    /// Node that refuses connections (repeatable)
    #[arg(long, value_name = "NODE")]
    pub sim_fail: Vec<String>,

    /// Node that never answers within any deadline (repeatable)
    #[arg(long, value_name = "NODE")]
    pub sim_hang: Vec<String>,

    // === Output Options ===
    /// JSON report file path
    #[arg(long = "json", value_name = "PATH")]
    pub json_output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    // === Configuration File ===
    /// TOML scan file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Dry run - validate the scan plan without executing
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    ///
    /// Cross-flag checks only; range checks live on the resolved plan.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_some() && self.servers_file.is_some() {
            anyhow::bail!("use either --servers or --servers-file, not both");
        }

        if let Some(ref servers) = self.servers {
            if servers.split(',').all(|s| s.trim().is_empty()) {
                anyhow::bail!("servers list is empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_invocation() {
        let cli = Cli::try_parse_from(["lockscan", "--account", "svc-backup", "--servers", "dc01,dc02"])
            .unwrap();

        assert_eq!(cli.account.as_deref(), Some("svc-backup"));
        assert_eq!(cli.servers.as_deref(), Some("dc01,dc02"));
        assert_eq!(cli.sim_seed, 42);
        assert!(cli.strategy.is_none());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_parse_strategy_values() {
        let cli = Cli::try_parse_from(["lockscan", "--strategy", "isolated"]).unwrap();
        assert_eq!(cli.strategy, Some(StrategyArg::Isolated));

        let cli = Cli::try_parse_from(["lockscan", "--strategy", "pooled"]).unwrap();
        assert_eq!(cli.strategy, Some(StrategyArg::Pooled));

        assert!(Cli::try_parse_from(["lockscan", "--strategy", "fanout"]).is_err());
    }

    #[test]
    fn test_repeatable_sim_flags() {
        let cli = Cli::try_parse_from([
            "lockscan",
            "--sim-fail",
            "dc02",
            "--sim-fail",
            "dc05",
            "--sim-hang",
            "dc09",
        ])
        .unwrap();

        assert_eq!(cli.sim_fail, vec!["dc02", "dc05"]);
        assert_eq!(cli.sim_hang, vec!["dc09"]);
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["lockscan", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["lockscan"]).unwrap();
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_validate_rejects_both_node_sources() {
        let cli = Cli::try_parse_from([
            "lockscan",
            "--servers",
            "dc01",
            "--servers-file",
            "hosts.txt",
        ])
        .unwrap();

        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_server_list() {
        let cli = Cli::try_parse_from(["lockscan", "--servers", " , ,"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
