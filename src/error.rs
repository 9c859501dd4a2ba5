//! Error types for scan runs and per-node queries
//!
//! Per-node failures are data, not control flow: a `QueryError` ends up
//! embedded in the node's report and the scan keeps going. Only `RunError`
//! aborts a run.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single node query
///
/// Carried inside the node's report so callers can see exactly why a node
/// produced no counter. `Clone` and `PartialEq` so reports stay copyable
/// and tests can assert on the variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Node could not be reached (connect or transport failure)
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// Node responded with something we could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The account does not exist on this node
    #[error("account not found")]
    NotFound,

    /// The query exceeded its per-node budget
    #[error("timed out after {}ms", .limit.as_millis())]
    Timeout {
        /// Budget that was exceeded
        limit: Duration,
    },

    /// Unclassified fault, including converted panics from the query path
    #[error("query fault: {0}")]
    Fault(String),
}

/// Fatal scan failure
#[derive(Error, Debug)]
pub enum RunError {
    /// No usable node list: the directory is empty or cannot be read
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Configuration outside the supported bounds
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
