//! Isolated dispatch
//!
//! One fresh OS thread per task. Tasks are dispatched in batches of at
//! most the concurrency cap, and a batch must fully clear before the next
//! one starts. Nothing is reused between tasks, so a node that corrupts
//! or wedges its thread affects that thread alone.
//!
//! The cost is one spawn per node and a convoy effect: the slowest task
//! in a batch holds up dispatch of the entire next batch.

use super::{ExecutionStrategy, StrategyConfig, TaskUnit};
use crate::report::NodeReport;
use crate::Result;
use anyhow::bail;
use crossbeam::channel;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Fresh-thread-per-task dispatch
///
/// `submit` only queues; all spawning happens inside `drain`, where the
/// batch boundaries are enforced.
pub struct IsolatedStrategy {
    concurrency: usize,
    queue: Vec<TaskUnit>,
    stop: Arc<AtomicBool>,
    shut_down: bool,
}

impl IsolatedStrategy {
    pub fn new() -> Self {
        Self {
            concurrency: 1,
            queue: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            shut_down: false,
        }
    }
}

impl Default for IsolatedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStrategy for IsolatedStrategy {
    fn init(&mut self, config: &StrategyConfig) {
        self.concurrency = config.concurrency.max(1);
        self.queue = Vec::with_capacity(config.task_count);
    }

    fn submit(&mut self, unit: TaskUnit) -> Result<()> {
        if self.shut_down {
            bail!("strategy is shut down");
        }
        self.queue.push(unit);
        Ok(())
    }

    fn drain(&mut self, deadline: Instant) -> Vec<NodeReport> {
        let pending = std::mem::take(&mut self.queue);
        let mut results = Vec::with_capacity(pending.len());
        let mut iter = pending.into_iter();

        'batches: loop {
            if self.stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
                break;
            }

            let batch: Vec<TaskUnit> = iter.by_ref().take(self.concurrency).collect();
            if batch.is_empty() {
                break;
            }

            let launched = batch.len();
            debug!("dispatching batch of {}", launched);

            let (tx, rx) = channel::unbounded();
            for unit in batch {
                let tx = tx.clone();
                let stop = Arc::clone(&self.stop);
                thread::spawn(move || {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    let _ = tx.send((unit.work)());
                });
            }
            drop(tx);

            // The whole batch must clear before the next one starts
            for _ in 0..launched {
                match rx.recv_deadline(deadline) {
                    Ok(report) => results.push(report),
                    // Deadline passed. Stragglers keep their own threads
                    // and are not waited on; undispatched tasks stay queued
                    // on the floor
                    Err(_) => break 'batches,
                }
            }
        }

        results
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stop.store(true, Ordering::SeqCst);

        let dropped = self.queue.len();
        self.queue.clear();
        if dropped > 0 {
            debug!("shutdown dropped {} undispatched tasks", dropped);
        }
    }
}
