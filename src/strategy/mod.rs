//! Task dispatch strategies
//!
//! This module defines the abstraction the coordinator uses to run query
//! tasks in parallel. A strategy owns the threads that execute tasks and
//! enforces the concurrency cap; the coordinator stays agnostic to how
//! dispatch actually happens and simply submits work, drains results, and
//! shuts the strategy down.
//!
//! # Strategy Types
//!
//! - **Isolated**: one fresh OS thread per task, dispatched in batches of
//!   at most the concurrency cap. A batch must finish before the next one
//!   starts. Slow nodes cannot poison a reused thread, at the cost of one
//!   thread spawn per node.
//! - **Pooled**: a fixed pool of reusable worker threads fed over a
//!   channel. A task starts as soon as a worker frees up, so one slow node
//!   only ever occupies one slot.
//!
//! # Example
//!
//! ```
//! use lockscan::client::RawAttributes;
//! use lockscan::directory::Node;
//! use lockscan::report::NodeReport;
//! use lockscan::strategy::{create_strategy, StrategyConfig, StrategyKind, TaskUnit};
//! use std::time::{Duration, Instant};
//!
//! let mut strategy = create_strategy(StrategyKind::Pooled);
//! strategy.init(&StrategyConfig {
//!     concurrency: 2,
//!     task_count: 2,
//! });
//!
//! for name in ["dc01", "dc02"] {
//!     let node = Node::new(name);
//!     let unit = TaskUnit::new(node.clone(), move || {
//!         NodeReport::completed(node, RawAttributes::default(), Duration::ZERO)
//!     });
//!     strategy.submit(unit).unwrap();
//! }
//!
//! let results = strategy.drain(Instant::now() + Duration::from_secs(5));
//! strategy.shutdown();
//!
//! assert_eq!(results.len(), 2);
//! ```

use crate::directory::Node;
use crate::report::NodeReport;
use crate::Result;
use std::fmt;
use std::time::Instant;

/// One task handed to a strategy
///
/// The closure performs the whole query attempt and always returns a
/// report; it never panics. The node identity rides along so strategies
/// can label threads and log what they are dispatching.
pub struct TaskUnit {
    /// Node this task will query
    pub node: Node,

    /// The work itself
    pub work: Box<dyn FnOnce() -> NodeReport + Send + 'static>,
}

impl TaskUnit {
    pub fn new(node: Node, work: impl FnOnce() -> NodeReport + Send + 'static) -> Self {
        Self {
            node,
            work: Box::new(work),
        }
    }
}

impl fmt::Debug for TaskUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskUnit").field("node", &self.node).finish()
    }
}

/// Dispatch parameters shared by all strategies
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Upper bound on tasks running at the same time
    pub concurrency: usize,

    /// Number of tasks the scan will submit
    ///
    /// Lets pooled dispatch avoid spawning more workers than there is
    /// work for.
    pub task_count: usize,
}

/// Dispatch strategy for running query tasks in parallel
///
/// # Lifecycle
///
/// 1. Create via [`create_strategy`] (or a concrete type's `new()`)
/// 2. Call `init()` once with the dispatch parameters
/// 3. Submit every task via `submit()`
/// 4. Call `drain()` once to collect results until done or deadline
/// 5. Call `shutdown()` on every exit path
///
/// # Thread Safety
///
/// Strategies are `Send` so a scan can be driven from any thread, but a
/// single strategy instance belongs to one scan and is not shared.
///
/// # Shutdown
///
/// `shutdown()` is idempotent and safe to call at any point in the
/// lifecycle. Once it begins, no submitted task that has not already
/// started will start. Tasks already inside a blocking call are left to
/// run out on their own threads; their sessions are still released when
/// the call returns, the results just go nowhere.
pub trait ExecutionStrategy: Send {
    /// Prepare for dispatch
    ///
    /// Called once before any `submit()`. Strategies allocate their
    /// threads or queues here.
    fn init(&mut self, config: &StrategyConfig);

    /// Hand one task to the strategy
    ///
    /// # Errors
    ///
    /// Fails if the strategy has been shut down or its workers are gone.
    /// The task is not run in that case; the caller decides how to
    /// account for it.
    fn submit(&mut self, unit: TaskUnit) -> Result<()>;

    /// Collect results until every submitted task reported or the
    /// deadline passes
    ///
    /// Blocks without polling. Returns however many reports arrived in
    /// time; tasks still outstanding at the deadline are simply absent
    /// from the result.
    fn drain(&mut self, deadline: Instant) -> Vec<NodeReport>;

    /// Release dispatch resources
    ///
    /// Idempotent. Called exactly once per scan on every exit path,
    /// including early timeout and fatal errors before dispatch.
    fn shutdown(&mut self);
}

/// Which dispatch strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Fresh thread per task, batched dispatch
    Isolated,
    /// Fixed worker pool, continuous dispatch
    Pooled,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Pooled
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Isolated => write!(f, "isolated"),
            StrategyKind::Pooled => write!(f, "pooled"),
        }
    }
}

/// Create a strategy of the given kind
pub fn create_strategy(kind: StrategyKind) -> Box<dyn ExecutionStrategy> {
    match kind {
        StrategyKind::Isolated => Box::new(isolated::IsolatedStrategy::new()),
        StrategyKind::Pooled => Box::new(pooled::PooledStrategy::new()),
    }
}

pub mod isolated;
pub mod pooled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::Isolated.to_string(), "isolated");
        assert_eq!(StrategyKind::Pooled.to_string(), "pooled");
    }

    #[test]
    fn test_default_strategy_is_pooled() {
        assert_eq!(StrategyKind::default(), StrategyKind::Pooled);
    }

    #[test]
    fn test_create_strategy_builds_each_kind() {
        // Smoke test: both kinds construct and survive an immediate shutdown
        for kind in [StrategyKind::Isolated, StrategyKind::Pooled] {
            let mut strategy = create_strategy(kind);
            strategy.shutdown();
        }
    }
}
