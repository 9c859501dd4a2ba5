//! Node query abstraction
//!
//! This module defines the seam between the scan machinery and the actual
//! directory wire protocol. The coordinator and executors only ever talk
//! to `NodeQueryClient` and `NodeSession`; how bytes get on the wire
//! (LDAP, an RPC gateway, a test double) is the implementor's business.
//!
//! # Architecture
//!
//! A `NodeQueryClient` is shared across all worker threads and hands out
//! one `NodeSession` per node query. Sessions are short-lived: connect,
//! fetch the attribute set once, close. The per-node executor guarantees
//! `close()` runs on every path, so implementations can hold real network
//! resources.
//!
//! # Implementations
//!
//! The crate ships [`sim::SimClient`], a fully scriptable in-process
//! backend used by the CLI harness and the test suite.

use crate::directory::Node;
use crate::error::QueryError;
use std::time::Instant;

pub mod sim;

/// Account lookup parameters, identical for every node in a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountQuery {
    /// Account identifier to look up
    pub account: String,
    /// Optional search base narrowing where the lookup starts
    pub search_base: Option<String>,
}

impl AccountQuery {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            search_base: None,
        }
    }

    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into());
        self
    }
}

/// Raw attribute set fetched from one node
///
/// Timestamps are wire-format ticks (100ns units since 1601-01-01 UTC).
/// `None` means the attribute was absent from the response; `Some(0)` is
/// the directory's own encoding of "never". Both read as "no event".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAttributes {
    /// Bad-attempt counter maintained by this node
    pub counter: u32,
    /// Raw timestamp of the most recent failed attempt
    pub last_failure_raw: Option<u64>,
    /// Raw timestamp of the lockout event
    pub lock_raw: Option<u64>,
}

/// Connection factory for node queries
///
/// One client instance serves the whole scan, so implementations must be
/// `Send + Sync`. Each call to `connect` yields an independent session
/// owned by a single worker thread.
///
/// # Deadlines
///
/// The `deadline` passed to `connect` and `fetch` is the absolute point
/// past which the caller no longer wants an answer. Implementations
/// should give up and return `QueryError::Timeout` once it passes; the
/// scan survives implementations that ignore it, at the cost of a worker
/// thread staying busy until the call returns on its own.
pub trait NodeQueryClient: Send + Sync {
    /// Open a session to the given node
    ///
    /// # Errors
    ///
    /// `QueryError::Unreachable` when the node cannot be contacted,
    /// `QueryError::Timeout` when the deadline passes first.
    fn connect(
        &self,
        node: &Node,
        deadline: Instant,
    ) -> Result<Box<dyn NodeSession>, QueryError>;
}

/// Open session against a single node
pub trait NodeSession: Send {
    /// Fetch the account's attribute set
    ///
    /// Called at most once per session. Returns the raw counters and
    /// timestamps exactly as the node reported them.
    fn fetch(
        &mut self,
        query: &AccountQuery,
        deadline: Instant,
    ) -> Result<RawAttributes, QueryError>;

    /// Release the session
    ///
    /// Idempotent: calling it on an already-closed session is a no-op.
    /// Must not panic; release failures are the implementation's to
    /// swallow or log.
    fn close(&mut self);
}
