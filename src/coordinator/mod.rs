//! Scan coordination
//!
//! This module drives one round of fan-out queries: one task per node,
//! dispatched through an [`ExecutionStrategy`] under a concurrency cap,
//! bounded by a single global deadline measured from dispatch start.
//!
//! # Result capture
//!
//! Every task delivers its report twice: back through the strategy's
//! result channel, and into a mutex-guarded side store keyed by node name.
//! The final collection step unions both paths, so a report that survives
//! either one makes it into the result set. The union is emitted in
//! dispatch order, which keeps aggregation deterministic across runs with
//! identical inputs.
//!
//! # Deadlines
//!
//! When the global deadline fires, the coordinator returns with whatever
//! it has. Tasks still running keep their threads until the underlying
//! call returns, at which point their sessions are released; a late report
//! that reaches the side store before the final union is still collected,
//! anything after that is logged and discarded. Tasks that never started
//! are dropped outright. A cut-short scan is partial data, never an error.
//!
//! # Example
//!
//! ```
//! use lockscan::client::sim::SimClient;
//! use lockscan::client::AccountQuery;
//! use lockscan::config::RunConfig;
//! use lockscan::coordinator::Coordinator;
//! use lockscan::directory::Node;
//! use lockscan::report::FleetReport;
//! use lockscan::strategy::{create_strategy, StrategyKind};
//! use std::sync::Arc;
//!
//! let nodes = vec![Node::new("dc01"), Node::new("dc02")];
//! let client = Arc::new(SimClient::new());
//!
//! let coordinator = Coordinator::new(RunConfig::default(), client).unwrap();
//! let mut strategy = create_strategy(StrategyKind::Pooled);
//!
//! let results = coordinator
//!     .run(&nodes, &AccountQuery::new("alice"), strategy.as_mut())
//!     .unwrap();
//! let fleet = FleetReport::reduce(&results);
//!
//! assert_eq!(results.len(), 2);
//! assert_eq!(fleet.success_count, 2);
//! ```

use crate::client::{AccountQuery, NodeQueryClient};
use crate::config::RunConfig;
use crate::directory::Node;
use crate::error::{QueryError, RunError};
use crate::executor::{NodeExecutor, QueryTask};
use crate::report::NodeReport;
use crate::strategy::{ExecutionStrategy, StrategyConfig, TaskUnit};
use crate::util::time::format_duration;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Lifecycle of one query task within a scan
///
/// `Abandoned` is only reachable from `Pending`: it marks a task the
/// deadline caught before any worker picked it up. A task caught while
/// executing becomes `TimedOut` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, no worker has picked it up yet
    Pending,
    /// A worker is executing it
    Running,
    /// It produced a report
    Completed,
    /// Still executing when the scan deadline fired
    TimedOut,
    /// Never started before the scan deadline fired
    Abandoned,
}

/// Drives one scatter-gather scan round
///
/// Owns the run parameters and the query client; the dispatch strategy is
/// supplied per run so callers can pick it at the last moment.
pub struct Coordinator {
    config: RunConfig,
    client: Arc<dyn NodeQueryClient>,
}

impl Coordinator {
    /// Create a coordinator, validating the run parameters
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidConfig`] when the concurrency cap or the
    /// global timeout is outside its permitted range.
    pub fn new(config: RunConfig, client: Arc<dyn NodeQueryClient>) -> Result<Self, RunError> {
        config.validate().map_err(RunError::InvalidConfig)?;
        Ok(Self { config, client })
    }

    /// Run one scan round over the given nodes
    ///
    /// Every node is attempted exactly once; there are no retries. The
    /// result set contains at most one report per node, in dispatch order.
    /// Nodes whose tasks were cut off by the global deadline are absent
    /// from the set unless their report reached the side store first.
    ///
    /// # Errors
    ///
    /// Only an empty node list is fatal, as [`RunError::DirectoryUnavailable`].
    /// Everything that goes wrong on an individual node is folded into
    /// that node's report.
    pub fn run(
        &self,
        nodes: &[Node],
        query: &AccountQuery,
        strategy: &mut dyn ExecutionStrategy,
    ) -> Result<Vec<NodeReport>, RunError> {
        if nodes.is_empty() {
            strategy.shutdown();
            return Err(RunError::DirectoryUnavailable(
                "directory returned no nodes".to_string(),
            ));
        }

        let start = Instant::now();
        let deadline = start + self.config.global_timeout;

        info!(
            "scanning {} nodes for {} (concurrency {}, timeout {})",
            nodes.len(),
            query.account,
            self.config.concurrency,
            format_duration(self.config.global_timeout)
        );

        strategy.init(&StrategyConfig {
            concurrency: self.config.concurrency,
            task_count: nodes.len(),
        });

        let states = Arc::new(Mutex::new(vec![TaskState::Pending; nodes.len()]));
        let side_store: Arc<Mutex<HashMap<String, NodeReport>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let executor = NodeExecutor::new(Arc::clone(&self.client));

        for (index, node) in nodes.iter().enumerate() {
            let task = QueryTask {
                node: node.clone(),
                query: query.clone(),
                node_timeout: self.config.node_timeout,
                global_deadline: deadline,
            };
            let executor = executor.clone();
            let states = Arc::clone(&states);
            let task_store = Arc::clone(&side_store);

            let unit = TaskUnit::new(node.clone(), move || {
                states.lock().unwrap()[index] = TaskState::Running;
                let report = executor.execute(&task);

                if Instant::now() >= task.global_deadline {
                    debug!("late result from {} after the scan deadline", report.node);
                }
                task_store
                    .lock()
                    .unwrap()
                    .insert(report.node.name.clone(), report.clone());
                states.lock().unwrap()[index] = TaskState::Completed;
                report
            });

            if let Err(err) = strategy.submit(unit) {
                // The task never ran; record the refusal as this node's
                // report so the scan stays whole
                warn!("could not dispatch query for {}: {}", node, err);
                side_store.lock().unwrap().insert(
                    node.name.clone(),
                    NodeReport::failed(
                        node.clone(),
                        QueryError::Fault(format!("dispatch failed: {}", err)),
                        std::time::Duration::ZERO,
                    ),
                );
            }
        }

        let direct = strategy.drain(deadline);
        strategy.shutdown();

        // Finalize states before snapshotting the store: a report that
        // slips in between the two is still collected below
        let final_states: Vec<TaskState> = {
            let mut guard = states.lock().unwrap();
            for state in guard.iter_mut() {
                *state = match *state {
                    TaskState::Pending => TaskState::Abandoned,
                    TaskState::Running => TaskState::TimedOut,
                    other => other,
                };
            }
            guard.clone()
        };
        let mut store = std::mem::take(&mut *side_store.lock().unwrap());

        let mut direct_map: HashMap<String, NodeReport> = direct
            .into_iter()
            .map(|report| (report.node.name.clone(), report))
            .collect();

        let mut results = Vec::with_capacity(nodes.len());
        let mut lost = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            if let Some(report) = direct_map.remove(&node.name) {
                store.remove(&node.name);
                results.push(report);
            } else if let Some(report) = store.remove(&node.name) {
                debug!("recovered result for {} from the side store", node);
                results.push(report);
            } else {
                warn!("no result from {} before the deadline", node);
                lost.push(index);
            }
        }

        let (cut_off, abandoned) = tally_lost(&final_states, &lost);
        if !lost.is_empty() {
            warn!(
                "deadline cut the scan short: {} cut off while running, {} never started",
                cut_off, abandoned
            );
        }
        info!(
            "scan finished in {}: {} of {} nodes reported",
            format_duration(start.elapsed()),
            results.len(),
            nodes.len()
        );

        Ok(results)
    }
}

/// Classify the nodes that produced no report, by final task state
///
/// Counts only lost nodes: a task that completed too late for its report
/// to be collected lands in the cut-off bucket, and a node whose report
/// was recovered is never counted at all.
fn tally_lost(states: &[TaskState], lost: &[usize]) -> (usize, usize) {
    let mut cut_off = 0;
    let mut abandoned = 0;
    for &index in lost {
        match states[index] {
            TaskState::Abandoned => abandoned += 1,
            _ => cut_off += 1,
        }
    }
    (cut_off, abandoned)
}
