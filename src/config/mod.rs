//! Configuration module
//!
//! Handles CLI argument parsing, TOML scan files, and validation.

pub mod cli;
pub mod toml;

use crate::strategy::StrategyKind;
use crate::util::time::format_duration;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Bounds for the worker cap
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;

/// Bounds for the whole-scan deadline
pub const MIN_GLOBAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_GLOBAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Default worker cap: one per CPU, clamped to the supported range
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Timing and parallelism knobs for a single scan run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum node queries in flight at once (1-20)
    pub concurrency: usize,
    /// Hard deadline for the whole scan
    pub global_timeout: Duration,
    /// Budget for a single node query
    pub node_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            global_timeout: Duration::from_secs(30),
            node_timeout: Duration::from_secs(10),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency < MIN_CONCURRENCY || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be {}-{}, got {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY, self.concurrency
            ));
        }
        if self.global_timeout < MIN_GLOBAL_TIMEOUT || self.global_timeout > MAX_GLOBAL_TIMEOUT {
            return Err(format!(
                "global timeout must be {}-{}, got {}",
                format_duration(MIN_GLOBAL_TIMEOUT),
                format_duration(MAX_GLOBAL_TIMEOUT),
                format_duration(self.global_timeout)
            ));
        }
        if self.node_timeout.is_zero() {
            return Err("node timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "concurrency={}, global_timeout={}, node_timeout={}",
            self.concurrency,
            format_duration(self.global_timeout),
            format_duration(self.node_timeout)
        )
    }
}

/// Scripted behavior for the simulated fleet
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed driving per-node counters and latency jitter
    pub seed: u64,
    /// Nodes forced to refuse connections
    pub fail: Vec<String>,
    /// Nodes forced to hold their answer past any deadline
    pub hang: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            fail: Vec::new(),
            hang: Vec::new(),
        }
    }
}

impl fmt::Display for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("seed={}", self.seed)];
        if !self.fail.is_empty() {
            parts.push(format!("fail=[{}]", self.fail.join(", ")));
        }
        if !self.hang.is_empty() {
            parts.push(format!("hang=[{}]", self.hang.join(", ")));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Everything one scan invocation needs, resolved from CLI and scan file
#[derive(Debug, Clone)]
pub struct ScanPlan {
    /// Account under investigation
    pub account: String,
    /// Optional search base passed through to every node query
    pub search_base: Option<String>,
    /// Node names given directly
    pub servers: Vec<String>,
    /// File with one node name per line, used when `servers` is empty
    pub servers_file: Option<PathBuf>,
    /// How node queries are spread across worker threads
    pub strategy: StrategyKind,
    /// Run knobs
    pub run: RunConfig,
    /// Simulated fleet behavior
    pub sim: SimConfig,
    /// Write the machine-readable report here
    pub json_output: Option<PathBuf>,
    /// Validate and print the plan without scanning
    pub dry_run: bool,
}

impl ScanPlan {
    pub fn validate(&self) -> Result<(), String> {
        if self.account.trim().is_empty() {
            return Err("account must not be empty".to_string());
        }
        if self.servers.is_empty() && self.servers_file.is_none() {
            return Err("no nodes to scan: provide --servers or --servers-file".to_string());
        }
        self.run.validate()
    }
}

impl fmt::Display for ScanPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan plan:")?;
        writeln!(f, "  Account: {}", self.account)?;
        if let Some(ref base) = self.search_base {
            writeln!(f, "  Search base: {}", base)?;
        }
        if self.servers.is_empty() {
            if let Some(ref path) = self.servers_file {
                writeln!(f, "  Nodes: from {}", path.display())?;
            }
        } else {
            writeln!(
                f,
                "  Nodes: {} ({})",
                self.servers.len(),
                self.servers.join(", ")
            )?;
        }
        writeln!(f, "  Strategy: {}", self.strategy)?;
        writeln!(f, "  Run: {}", self.run)?;
        writeln!(f, "  Simulation: {}", self.sim)?;
        if let Some(ref path) = self.json_output {
            writeln!(f, "  JSON output: {}", path.display())?;
        }
        Ok(())
    }
}
