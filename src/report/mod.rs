//! Result types for one scan round
//!
//! This module defines the per-node outcome record ([`NodeReport`]) and the
//! fleet-wide aggregate derived from it ([`FleetReport`]). A scan produces
//! one `NodeReport` per node regardless of how that node fared; the
//! aggregate is computed afterwards and is never stored alongside the raw
//! results.
//!
//! # Example
//!
//! ```
//! use lockscan::client::RawAttributes;
//! use lockscan::directory::Node;
//! use lockscan::report::{FleetReport, NodeReport};
//! use std::time::Duration;
//!
//! let reports = vec![
//!     NodeReport::completed(
//!         Node::new("dc01"),
//!         RawAttributes { counter: 3, ..Default::default() },
//!         Duration::from_millis(12),
//!     ),
//!     NodeReport::completed(
//!         Node::new("dc02"),
//!         RawAttributes { counter: 2, ..Default::default() },
//!         Duration::from_millis(9),
//!     ),
//! ];
//!
//! let fleet = FleetReport::reduce(&reports);
//! assert_eq!(fleet.total, 5);
//! assert_eq!(fleet.peak.unwrap().node.name, "dc01");
//! ```

use crate::client::RawAttributes;
use crate::directory::Node;
use crate::error::QueryError;
use crate::util::time::raw_timestamp_to_datetime;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::time::Duration;

/// Outcome of querying a single node
///
/// Exactly one of these exists per node per scan. A failed query is still a
/// report: `success` is false, `error` holds the fault, and every numeric
/// field is zeroed so failures never leak into aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    /// Node this report describes
    pub node: Node,

    /// Failure counter read from the node (0 for failed queries)
    pub counter: u32,

    /// Most recent failure event, if the node has ever recorded one
    pub last_failure: Option<DateTime<Utc>>,

    /// When the account locked on this node, if it is currently locked
    pub locked_at: Option<DateTime<Utc>>,

    /// Whether this node holds an active lockout
    pub flagged: bool,

    /// Whether the query completed and the fields above are real data
    pub success: bool,

    /// The fault, for failed queries
    pub error: Option<QueryError>,

    /// Wall-clock time the query took, measured even on failure
    pub elapsed: Duration,
}

impl NodeReport {
    /// Build a report from a successful fetch
    ///
    /// Raw directory timestamps are converted to calendar time here; a raw
    /// value of zero (or an absent attribute) means the event never
    /// happened and converts to `None`. The node is flagged exactly when
    /// it carries a live lock timestamp.
    pub fn completed(node: Node, attrs: RawAttributes, elapsed: Duration) -> Self {
        let last_failure = attrs.last_failure_raw.and_then(raw_timestamp_to_datetime);
        let locked_at = attrs.lock_raw.and_then(raw_timestamp_to_datetime);

        Self {
            node,
            counter: attrs.counter,
            last_failure,
            flagged: locked_at.is_some(),
            locked_at,
            success: true,
            error: None,
            elapsed,
        }
    }

    /// Build a report from a failed query
    ///
    /// Carries no attribute data: the counter is zero and both timestamps
    /// are absent, so aggregation can sum over the full result set without
    /// inspecting `success` for the numeric fields.
    pub fn failed(node: Node, error: QueryError, elapsed: Duration) -> Self {
        Self {
            node,
            counter: 0,
            last_failure: None,
            locked_at: None,
            flagged: false,
            success: false,
            error: Some(error),
            elapsed,
        }
    }

    /// Query duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Fleet-wide aggregate over one scan's results
///
/// Derived, never stored: [`FleetReport::reduce`] is a pure function of
/// the result set, so reducing the same set twice yields identical
/// reports.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetReport {
    /// Sum of the failure counter across successful queries
    pub total: u64,

    /// Successful result with the largest counter, if any query succeeded
    pub peak: Option<NodeReport>,

    /// Most recent failure event seen on any successfully queried node
    pub latest_failure: Option<DateTime<Utc>>,

    /// Names of nodes holding an active lockout, sorted
    pub flagged: Vec<String>,

    /// Queries that completed
    pub success_count: usize,

    /// Queries that failed, timed out, or never ran
    pub failure_count: usize,

    /// Mean query duration across successful queries, 0 when none succeeded
    pub avg_duration_ms: f64,
}

impl FleetReport {
    /// Reduce a result set into the fleet aggregate
    ///
    /// Only successful reports contribute to the numeric fields. When
    /// several nodes share the maximum counter, the lexicographically
    /// smallest node name wins, so the aggregate does not depend on the
    /// order results arrived in.
    pub fn reduce(reports: &[NodeReport]) -> Self {
        let successes: Vec<&NodeReport> = reports.iter().filter(|r| r.success).collect();

        let total = successes.iter().map(|r| u64::from(r.counter)).sum();

        let peak = successes
            .iter()
            .max_by_key(|r| (r.counter, Reverse(&r.node.name)))
            .map(|r| (*r).clone());

        let latest_failure = successes.iter().filter_map(|r| r.last_failure).max();

        let mut flagged: Vec<String> = reports
            .iter()
            .filter(|r| r.flagged)
            .map(|r| r.node.name.clone())
            .collect();
        flagged.sort();

        let avg_duration_ms = if successes.is_empty() {
            0.0
        } else {
            let total_ms: f64 = successes.iter().map(|r| r.duration_ms()).sum();
            total_ms / successes.len() as f64
        };

        Self {
            total,
            peak,
            latest_failure,
            flagged,
            success_count: successes.len(),
            failure_count: reports.len() - successes.len(),
            avg_duration_ms,
        }
    }
}
