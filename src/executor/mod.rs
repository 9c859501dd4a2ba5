//! Per-node query execution
//!
//! A [`NodeExecutor`] runs exactly one query attempt against one node and
//! always produces a [`NodeReport`]. Nothing escapes this boundary: wire
//! errors, deadline overruns and even panics inside the client are caught
//! and folded into a failed report, so the dispatch layer above never has
//! to reason about unwinding worker threads.
//!
//! Sessions are released through a drop guard. Whether the fetch succeeds,
//! fails or panics, the session's `close` runs before `execute` returns.

use crate::client::{AccountQuery, NodeQueryClient, NodeSession, RawAttributes};
use crate::directory::Node;
use crate::error::QueryError;
use crate::report::NodeReport;
use log::{debug, warn};
use std::cmp;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One unit of scan work: which node to ask, what to ask it, and the
/// budgets that bound the attempt
#[derive(Debug, Clone)]
pub struct QueryTask {
    /// Node to query
    pub node: Node,

    /// Account attributes to fetch
    pub query: AccountQuery,

    /// Time budget for this node alone
    pub node_timeout: Duration,

    /// Hard stop for the whole scan
    pub global_deadline: Instant,
}

/// Runs single query attempts against nodes
///
/// Cheap to clone: every clone shares the underlying client.
#[derive(Clone)]
pub struct NodeExecutor {
    client: Arc<dyn NodeQueryClient>,
}

impl NodeExecutor {
    pub fn new(client: Arc<dyn NodeQueryClient>) -> Self {
        Self { client }
    }

    /// Run one query attempt and report the outcome
    ///
    /// The attempt is bounded by whichever comes first, the node budget or
    /// the global scan deadline. Elapsed time is measured on every path,
    /// including failures.
    ///
    /// Never panics and never returns an error: a panic inside the client
    /// surfaces as [`QueryError::Fault`] in the report.
    pub fn execute(&self, task: &QueryTask) -> NodeReport {
        let start = Instant::now();
        let deadline = cmp::min(start + task.node_timeout, task.global_deadline);

        debug!("querying {} for {}", task.node, task.query.account);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.attempt(task, deadline)));
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(attrs)) => NodeReport::completed(task.node.clone(), attrs, elapsed),
            Ok(Err(err)) => {
                debug!("query on {} failed: {}", task.node, err);
                NodeReport::failed(task.node.clone(), err, elapsed)
            }
            Err(payload) => {
                let msg = panic_message(payload);
                warn!("query on {} panicked: {}", task.node, msg);
                NodeReport::failed(task.node.clone(), QueryError::Fault(msg), elapsed)
            }
        }
    }

    fn attempt(&self, task: &QueryTask, deadline: Instant) -> Result<RawAttributes, QueryError> {
        let session = self.client.connect(&task.node, deadline)?;
        let mut guard = SessionGuard { session };
        guard.session.fetch(&task.query, deadline)
    }
}

/// Closes the session when dropped, so release happens on success, error
/// and panic paths alike
struct SessionGuard {
    session: Box<dyn NodeSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sim::{SimBehavior, SimClient, SimOutcome};

    fn task_for(node: &str) -> QueryTask {
        QueryTask {
            node: Node::new(node),
            query: AccountQuery::new("alice"),
            node_timeout: Duration::from_secs(5),
            global_deadline: Instant::now() + Duration::from_secs(30),
        }
    }

    #[test]
    fn test_execute_success() {
        let client = Arc::new(SimClient::new());
        client.set_node(
            "dc01",
            SimBehavior::responding(RawAttributes {
                counter: 3,
                ..Default::default()
            }),
        );

        let executor = NodeExecutor::new(client.clone());
        let report = executor.execute(&task_for("dc01"));

        assert!(report.success);
        assert_eq!(report.counter, 3);
        assert_eq!(report.node.name, "dc01");
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_execute_connect_failure() {
        let client = Arc::new(SimClient::new());
        client.set_node("dc01", SimBehavior::unreachable());

        let executor = NodeExecutor::new(client.clone());
        let report = executor.execute(&task_for("dc01"));

        assert!(!report.success);
        assert!(matches!(report.error, Some(QueryError::Unreachable(_))));
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_execute_fetch_failure_releases_session() {
        let client = Arc::new(SimClient::new());
        client.set_node("dc01", SimBehavior::failing(QueryError::NotFound));

        let executor = NodeExecutor::new(client.clone());
        let report = executor.execute(&task_for("dc01"));

        assert!(!report.success);
        assert_eq!(report.error, Some(QueryError::NotFound));
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_execute_contains_panic() {
        let client = Arc::new(SimClient::new());
        client.set_node(
            "dc01",
            SimBehavior {
                outcome: SimOutcome::Panic,
                ..SimBehavior::default()
            },
        );

        let executor = NodeExecutor::new(client.clone());
        let report = executor.execute(&task_for("dc01"));

        assert!(!report.success);
        match report.error {
            Some(QueryError::Fault(ref msg)) => {
                assert!(msg.contains("simulated protocol fault"))
            }
            ref other => panic!("expected fault, got {:?}", other),
        }
        // The drop guard ran during unwinding
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_execute_honors_node_budget() {
        let client = Arc::new(SimClient::new());
        client.set_node(
            "slow",
            SimBehavior::responding_after(RawAttributes::default(), Duration::from_millis(300)),
        );

        let executor = NodeExecutor::new(client);
        let mut task = task_for("slow");
        task.node_timeout = Duration::from_millis(50);

        let report = executor.execute(&task);

        assert!(!report.success);
        assert!(matches!(report.error, Some(QueryError::Timeout { .. })));
        // Gave up at the budget, well before the node would have answered
        assert!(report.elapsed < Duration::from_millis(250));
    }

    #[test]
    fn test_execute_global_deadline_caps_node_budget() {
        let client = Arc::new(SimClient::new());
        client.set_node(
            "slow",
            SimBehavior::responding_after(RawAttributes::default(), Duration::from_millis(300)),
        );

        let executor = NodeExecutor::new(client);
        let mut task = task_for("slow");
        task.node_timeout = Duration::from_secs(5);
        task.global_deadline = Instant::now() + Duration::from_millis(50);

        let report = executor.execute(&task);

        assert!(!report.success);
        assert!(matches!(report.error, Some(QueryError::Timeout { .. })));
        assert!(report.elapsed < Duration::from_millis(250));
    }

    #[test]
    fn test_execute_measures_elapsed() {
        let client = Arc::new(SimClient::new());
        client.set_node(
            "dc01",
            SimBehavior::responding_after(RawAttributes::default(), Duration::from_millis(40)),
        );

        let executor = NodeExecutor::new(client);
        let report = executor.execute(&task_for("dc01"));

        assert!(report.success);
        assert!(report.elapsed >= Duration::from_millis(40));
    }
}
