//! lockscan - Concurrent account lockout scanner
//!
//! lockscan fans an account lookup out across every node of a directory
//! fleet, collects the per-node bad-attempt counters, and reduces them to
//! one fleet-wide picture. Nodes track these counters locally without
//! replicating them, so only a full sweep shows the true total.
//!
//! # Architecture
//!
//! - **Pluggable execution strategies**: isolated threads or a fixed pool
//! - **Deadline discipline**: per-node budgets inside one global deadline
//! - **Dual result capture**: direct channel plus a shared side store
//! - **Scriptable backend**: deterministic fleet simulation for testing

pub mod client;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod executor;
pub mod output;
pub mod report;
pub mod strategy;
pub mod util;

// Re-export commonly used types
pub use coordinator::Coordinator;
pub use report::{FleetReport, NodeReport};

/// Result type used throughout lockscan
pub type Result<T> = anyhow::Result<T>;
