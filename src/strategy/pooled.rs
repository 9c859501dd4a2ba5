//! Pooled dispatch
//!
//! A fixed pool of reusable worker threads fed over a channel. Submission
//! is continuous: a task starts the moment a worker frees up, so a slow
//! node occupies one slot while the rest of the pool keeps moving. The
//! pool never grows past the concurrency cap and never past the number of
//! tasks in the scan.
//!
//! Completions come back over a second channel and `drain` blocks on it
//! with a deadline. No thread ever spins waiting for work or results.

use super::{ExecutionStrategy, StrategyConfig, TaskUnit};
use crate::report::NodeReport;
use crate::Result;
use anyhow::{anyhow, bail};
use crossbeam::channel::{self, Receiver, Sender};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Worker-pool dispatch
pub struct PooledStrategy {
    task_tx: Option<Sender<TaskUnit>>,
    result_rx: Option<Receiver<NodeReport>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    outstanding: usize,
    shut_down: bool,
}

impl PooledStrategy {
    pub fn new() -> Self {
        Self {
            task_tx: None,
            result_rx: None,
            workers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            outstanding: 0,
            shut_down: false,
        }
    }

    /// Number of worker threads in the pool
    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }
}

impl Default for PooledStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStrategy for PooledStrategy {
    fn init(&mut self, config: &StrategyConfig) {
        let pool = config.concurrency.min(config.task_count).max(1);
        debug!("starting worker pool of {}", pool);

        let (task_tx, task_rx) = channel::unbounded::<TaskUnit>();
        let (result_tx, result_rx) = channel::unbounded::<NodeReport>();

        for _ in 0..pool {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let stop = Arc::clone(&self.stop);

            self.workers.push(thread::spawn(move || {
                while let Ok(unit) = task_rx.recv() {
                    // Tasks received after shutdown began are never run
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if result_tx.send((unit.work)()).is_err() {
                        break;
                    }
                }
            }));
        }

        self.task_tx = Some(task_tx);
        self.result_rx = Some(result_rx);
    }

    fn submit(&mut self, unit: TaskUnit) -> Result<()> {
        if self.shut_down {
            bail!("strategy is shut down");
        }
        let tx = self
            .task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("strategy not initialized"))?;

        tx.send(unit)
            .map_err(|_| anyhow!("worker pool disconnected"))?;
        self.outstanding += 1;
        Ok(())
    }

    fn drain(&mut self, deadline: Instant) -> Vec<NodeReport> {
        let rx = match &self.result_rx {
            Some(rx) => rx,
            None => return Vec::new(),
        };

        let mut results = Vec::with_capacity(self.outstanding);
        while results.len() < self.outstanding {
            match rx.recv_deadline(deadline) {
                Ok(report) => results.push(report),
                // Deadline passed or every worker is gone
                Err(_) => break,
            }
        }

        self.outstanding -= results.len();
        results
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stop.store(true, Ordering::SeqCst);

        // Disconnecting both channels wakes idle workers and gives late
        // completions nowhere to land
        self.task_tx.take();
        self.result_rx.take();

        let mut joined = 0;
        for handle in self.workers.drain(..) {
            // A worker stuck inside a node call keeps its thread until the
            // call returns; everyone else is collected here
            if handle.is_finished() {
                let _ = handle.join();
                joined += 1;
            }
        }
        debug!("worker pool shut down, {} workers joined", joined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RawAttributes;
    use crate::directory::Node;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn quick_unit(name: &str) -> TaskUnit {
        let node = Node::new(name);
        TaskUnit::new(node.clone(), move || {
            NodeReport::completed(node, RawAttributes::default(), Duration::ZERO)
        })
    }

    fn slow_unit(name: &str, latency: Duration) -> TaskUnit {
        let node = Node::new(name);
        TaskUnit::new(node.clone(), move || {
            thread::sleep(latency);
            NodeReport::completed(node, RawAttributes::default(), latency)
        })
    }

    #[test]
    fn test_pooled_runs_all_tasks() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 3,
            task_count: 6,
        });

        for i in 0..6 {
            strategy.submit(quick_unit(&format!("dc{:02}", i))).unwrap();
        }

        let results = strategy.drain(Instant::now() + Duration::from_secs(5));
        strategy.shutdown();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn test_pooled_pool_size_capped_by_task_count() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 8,
            task_count: 2,
        });
        assert_eq!(strategy.pool_size(), 2);
        strategy.shutdown();

        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 10,
        });
        assert_eq!(strategy.pool_size(), 2);
        strategy.shutdown();

        // Degenerate scan still gets one worker
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 4,
            task_count: 0,
        });
        assert_eq!(strategy.pool_size(), 1);
        strategy.shutdown();
    }

    #[test]
    fn test_pooled_never_exceeds_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 8,
        });

        for i in 0..8 {
            let node = Node::new(format!("dc{:02}", i));
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            strategy
                .submit(TaskUnit::new(node.clone(), move || {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(current, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    NodeReport::completed(node, RawAttributes::default(), Duration::ZERO)
                }))
                .unwrap();
        }

        let results = strategy.drain(Instant::now() + Duration::from_secs(5));
        strategy.shutdown();

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_pooled_reuses_workers() {
        let ids = Arc::new(Mutex::new(HashSet::new()));

        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 6,
        });

        for i in 0..6 {
            let node = Node::new(format!("dc{:02}", i));
            let ids = Arc::clone(&ids);
            strategy
                .submit(TaskUnit::new(node.clone(), move || {
                    ids.lock().unwrap().insert(thread::current().id());
                    thread::sleep(Duration::from_millis(10));
                    NodeReport::completed(node, RawAttributes::default(), Duration::ZERO)
                }))
                .unwrap();
        }

        let results = strategy.drain(Instant::now() + Duration::from_secs(5));
        strategy.shutdown();

        assert_eq!(results.len(), 6);
        // Six tasks ran on at most two threads
        assert!(ids.lock().unwrap().len() <= 2);
    }

    #[test]
    fn test_pooled_slow_task_occupies_one_slot() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 4,
        });

        // One wedged node plus three responsive ones. The free worker
        // walks through all three while the other sits on the wedge;
        // batched dispatch would have stalled behind it
        strategy
            .submit(slow_unit("stuck", Duration::from_secs(2)))
            .unwrap();
        for i in 0..3 {
            strategy.submit(quick_unit(&format!("dc{:02}", i))).unwrap();
        }

        let started = Instant::now();
        let results = strategy.drain(started + Duration::from_millis(300));
        strategy.shutdown();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.node.name != "stuck"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pooled_deadline_returns_partial() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 1,
            task_count: 4,
        });

        for i in 0..4 {
            strategy
                .submit(slow_unit(&format!("dc{:02}", i), Duration::from_millis(100)))
                .unwrap();
        }

        let started = Instant::now();
        let results = strategy.drain(started + Duration::from_millis(250));
        strategy.shutdown();

        assert!(!results.is_empty());
        assert!(results.len() < 4);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pooled_submit_after_shutdown_fails() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 1,
            task_count: 1,
        });

        strategy.shutdown();
        assert!(strategy.submit(quick_unit("dc01")).is_err());
    }

    #[test]
    fn test_pooled_submit_before_init_fails() {
        let mut strategy = PooledStrategy::new();
        assert!(strategy.submit(quick_unit("dc01")).is_err());
    }

    #[test]
    fn test_pooled_drain_before_init_is_empty() {
        let mut strategy = PooledStrategy::new();
        let results = strategy.drain(Instant::now() + Duration::from_millis(50));
        assert!(results.is_empty());
    }

    #[test]
    fn test_pooled_shutdown_idempotent() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 2,
        });

        strategy.shutdown();
        strategy.shutdown();
    }

    #[test]
    fn test_pooled_shutdown_does_not_wait_for_hung_worker() {
        let mut strategy = PooledStrategy::new();
        strategy.init(&StrategyConfig {
            concurrency: 2,
            task_count: 2,
        });

        strategy
            .submit(slow_unit("stuck", Duration::from_millis(1_500)))
            .unwrap();
        strategy.submit(quick_unit("dc01")).unwrap();

        let started = Instant::now();
        let results = strategy.drain(started + Duration::from_millis(100));
        strategy.shutdown();

        assert_eq!(results.len(), 1);
        // Shutdown left the wedged worker behind instead of joining it
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
