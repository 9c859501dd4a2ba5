//! Simulated query backend
//!
//! An in-process implementation of the node query traits that performs no
//! network IO. Behaviour is scripted per node: response latency, the
//! attribute set returned, connect failures, fetch failures, panics, and
//! whether the node honours deadlines at all. The CLI harness runs
//! against it and most of the test suite drives scans through it.
//!
//! # Features
//!
//! - Per-node behaviour overrides on top of a default
//! - Records every connect in order
//! - In-flight and peak-concurrency gauges
//! - Open-session gauge for verifying release on all paths
//! - Seeded random fleet generation for the CLI
//!
//! # Example
//!
//! ```
//! use lockscan::client::sim::{SimBehavior, SimClient};
//! use lockscan::client::{AccountQuery, NodeQueryClient, RawAttributes};
//! use lockscan::directory::Node;
//! use std::time::{Duration, Instant};
//!
//! let client = SimClient::new();
//! client.set_node(
//!     "dc01",
//!     SimBehavior::responding(RawAttributes {
//!         counter: 3,
//!         ..Default::default()
//!     }),
//! );
//!
//! let deadline = Instant::now() + Duration::from_secs(1);
//! let mut session = client.connect(&Node::new("dc01"), deadline).unwrap();
//! let attrs = session.fetch(&AccountQuery::new("alice"), deadline).unwrap();
//! session.close();
//!
//! assert_eq!(attrs.counter, 3);
//! assert_eq!(client.open_sessions(), 0);
//! ```

use super::{AccountQuery, NodeQueryClient, NodeSession, RawAttributes};
use crate::directory::Node;
use crate::error::QueryError;
use crate::util::time::datetime_to_raw_timestamp;
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What a simulated fetch produces once its latency has elapsed
#[derive(Debug, Clone)]
pub enum SimOutcome {
    /// Return this attribute set
    Respond(RawAttributes),
    /// Fail with this error
    Fail(QueryError),
    /// Panic inside the fetch, as a crashed protocol handler would
    Panic,
}

/// Scripted behaviour for one node
#[derive(Debug, Clone)]
pub struct SimBehavior {
    /// Time the fetch takes before producing its outcome
    pub latency: Duration,
    /// Error returned from connect instead of opening a session
    pub connect_error: Option<QueryError>,
    /// Result of the fetch
    pub outcome: SimOutcome,
    /// Sleep the full latency even when the deadline passes first
    pub ignore_deadline: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            connect_error: None,
            outcome: SimOutcome::Respond(RawAttributes::default()),
            ignore_deadline: false,
        }
    }
}

impl SimBehavior {
    /// Respond instantly with the given attributes
    pub fn responding(attrs: RawAttributes) -> Self {
        Self {
            outcome: SimOutcome::Respond(attrs),
            ..Self::default()
        }
    }

    /// Respond with the given attributes after a delay
    pub fn responding_after(attrs: RawAttributes, latency: Duration) -> Self {
        Self {
            latency,
            outcome: SimOutcome::Respond(attrs),
            ..Self::default()
        }
    }

    /// Refuse connections
    pub fn unreachable() -> Self {
        Self {
            connect_error: Some(QueryError::Unreachable(
                "connection refused".to_string(),
            )),
            ..Self::default()
        }
    }

    /// Fail every fetch with the given error
    pub fn failing(error: QueryError) -> Self {
        Self {
            outcome: SimOutcome::Fail(error),
            ..Self::default()
        }
    }

    /// Sleep for the full latency regardless of the deadline
    ///
    /// Models a node that has stopped answering without dropping the
    /// connection. The querying thread stays busy until the latency
    /// elapses.
    pub fn hanging(latency: Duration) -> Self {
        Self {
            latency,
            ignore_deadline: true,
            ..Self::default()
        }
    }
}

/// Scriptable in-process query backend
///
/// Cheap to share: the coordinator takes it as `Arc<SimClient>` and every
/// session holds clones of the shared gauges. Behaviour can be adjusted
/// through `&self` at any point, including mid-scan.
pub struct SimClient {
    default_behavior: SimBehavior,
    per_node: Mutex<HashMap<String, SimBehavior>>,
    connect_log: Mutex<Vec<String>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl SimClient {
    /// Create a client where every node responds instantly with clean
    /// (all-zero) attributes
    pub fn new() -> Self {
        Self::with_default(SimBehavior::default())
    }

    /// Create a client with a custom default behaviour
    pub fn with_default(default_behavior: SimBehavior) -> Self {
        Self {
            default_behavior,
            per_node: Mutex::new(HashMap::new()),
            connect_log: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Generate a plausible fleet from a seed
    ///
    /// Each node gets a small counter, jittered latency, and occasionally
    /// a recent failure or a lockout. The same seed and node list always
    /// produce the same fleet.
    pub fn randomized(seed: u64, nodes: &[Node]) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let client = Self::new();
        let now = Utc::now();

        for node in nodes {
            let counter: u32 = rng.gen_range(0..=5);

            let last_failure_raw = if counter > 0 {
                let age = ChronoDuration::seconds(rng.gen_range(60..86_400));
                Some(datetime_to_raw_timestamp(&(now - age)))
            } else {
                Some(0)
            };

            // Roughly one node in six is sitting on a lockout
            let lock_raw = if counter >= 4 && rng.gen_bool(0.5) {
                let age = ChronoDuration::seconds(rng.gen_range(60..3_600));
                Some(datetime_to_raw_timestamp(&(now - age)))
            } else {
                Some(0)
            };

            let behavior = SimBehavior::responding_after(
                RawAttributes {
                    counter,
                    last_failure_raw,
                    lock_raw,
                },
                Duration::from_millis(rng.gen_range(5..80)),
            );
            client.set_node(&node.name, behavior);
        }

        client
    }

    /// Override the behaviour of one node
    pub fn set_node(&self, node: &str, behavior: SimBehavior) {
        self.per_node
            .lock()
            .unwrap()
            .insert(node.to_string(), behavior);
    }

    /// Nodes connected to so far, in connect order
    pub fn connect_log(&self) -> Vec<String> {
        self.connect_log.lock().unwrap().clone()
    }

    /// Number of sessions currently open (connected, not yet closed)
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Number of fetches currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous fetches observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, node: &str) -> SimBehavior {
        self.per_node
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

impl Default for SimClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeQueryClient for SimClient {
    fn connect(
        &self,
        node: &Node,
        _deadline: Instant,
    ) -> Result<Box<dyn NodeSession>, QueryError> {
        self.connect_log.lock().unwrap().push(node.name.clone());

        let behavior = self.behavior_for(&node.name);
        if let Some(err) = behavior.connect_error {
            return Err(err);
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimSession {
            node: node.name.clone(),
            behavior,
            closed: false,
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }
}

struct SimSession {
    node: String,
    behavior: SimBehavior,
    closed: bool,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl SimSession {
    /// Sleep out the scripted latency, honouring the deadline unless the
    /// node is scripted to ignore it
    fn wait(&self, deadline: Instant) -> Result<(), QueryError> {
        if self.behavior.ignore_deadline {
            thread::sleep(self.behavior.latency);
            return Ok(());
        }

        let now = Instant::now();
        let budget = deadline.saturating_duration_since(now);

        if self.behavior.latency > budget {
            // The answer would arrive too late; burn the remaining budget
            // the way a blocking wire call would
            thread::sleep(budget);
            return Err(QueryError::Timeout {
                limit: self.behavior.latency,
            });
        }

        thread::sleep(self.behavior.latency);
        Ok(())
    }
}

impl NodeSession for SimSession {
    fn fetch(
        &mut self,
        _query: &AccountQuery,
        deadline: Instant,
    ) -> Result<RawAttributes, QueryError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let waited = self.wait(deadline);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        waited?;

        match &self.behavior.outcome {
            SimOutcome::Respond(attrs) => Ok(attrs.clone()),
            SimOutcome::Fail(err) => Err(err.clone()),
            SimOutcome::Panic => panic!("simulated protocol fault on {}", self.node),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::UNIX_EPOCH_TICKS;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_sim_client_responds() {
        let client = SimClient::new();
        client.set_node(
            "dc01",
            SimBehavior::responding(RawAttributes {
                counter: 4,
                last_failure_raw: Some(UNIX_EPOCH_TICKS as u64),
                lock_raw: Some(0),
            }),
        );

        let mut session = client.connect(&Node::new("dc01"), far_deadline()).unwrap();
        let attrs = session
            .fetch(&AccountQuery::new("alice"), far_deadline())
            .unwrap();

        assert_eq!(attrs.counter, 4);
        assert_eq!(attrs.lock_raw, Some(0));
    }

    #[test]
    fn test_sim_client_default_behavior_applies_to_unknown_nodes() {
        let client = SimClient::with_default(SimBehavior::responding(RawAttributes {
            counter: 1,
            ..Default::default()
        }));

        let mut session = client
            .connect(&Node::new("anything"), far_deadline())
            .unwrap();
        let attrs = session
            .fetch(&AccountQuery::new("alice"), far_deadline())
            .unwrap();

        assert_eq!(attrs.counter, 1);
    }

    #[test]
    fn test_sim_client_connect_error() {
        let client = SimClient::new();
        client.set_node("dc02", SimBehavior::unreachable());

        let err = client
            .connect(&Node::new("dc02"), far_deadline())
            .err()
            .unwrap();

        assert!(matches!(err, QueryError::Unreachable(_)));
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_sim_client_fetch_times_out_past_deadline() {
        let client = SimClient::new();
        client.set_node(
            "slow",
            SimBehavior::responding_after(
                RawAttributes::default(),
                Duration::from_millis(200),
            ),
        );

        let deadline = Instant::now() + Duration::from_millis(20);
        let mut session = client.connect(&Node::new("slow"), deadline).unwrap();
        let err = session
            .fetch(&AccountQuery::new("alice"), deadline)
            .err()
            .unwrap();

        assert!(matches!(err, QueryError::Timeout { .. }));
        session.close();
    }

    #[test]
    fn test_sim_client_hanging_node_ignores_deadline() {
        let client = SimClient::new();
        client.set_node("stuck", SimBehavior::hanging(Duration::from_millis(150)));

        let deadline = Instant::now() + Duration::from_millis(10);
        let mut session = client.connect(&Node::new("stuck"), deadline).unwrap();

        let started = Instant::now();
        let result = session.fetch(&AccountQuery::new("alice"), deadline);

        // The hang outlives the deadline and then completes normally
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(result.is_ok());
    }

    #[test]
    fn test_sim_client_session_gauge() {
        let client = SimClient::new();

        let mut a = client.connect(&Node::new("dc01"), far_deadline()).unwrap();
        let mut b = client.connect(&Node::new("dc02"), far_deadline()).unwrap();
        assert_eq!(client.open_sessions(), 2);

        a.close();
        assert_eq!(client.open_sessions(), 1);

        // close is idempotent
        a.close();
        assert_eq!(client.open_sessions(), 1);

        b.close();
        assert_eq!(client.open_sessions(), 0);
    }

    #[test]
    fn test_sim_client_connect_log() {
        let client = SimClient::new();

        client
            .connect(&Node::new("dc01"), far_deadline())
            .unwrap()
            .close();
        client
            .connect(&Node::new("dc02"), far_deadline())
            .unwrap()
            .close();

        assert_eq!(client.connect_log(), vec!["dc01", "dc02"]);
    }

    #[test]
    fn test_randomized_fleet_is_deterministic() {
        let nodes = vec![Node::new("dc01"), Node::new("dc02"), Node::new("dc03")];

        let a = SimClient::randomized(7, &nodes);
        let b = SimClient::randomized(7, &nodes);

        for node in &nodes {
            let mut sa = a.connect(node, far_deadline()).unwrap();
            let mut sb = b.connect(node, far_deadline()).unwrap();

            let attrs_a = sa.fetch(&AccountQuery::new("alice"), far_deadline());
            let attrs_b = sb.fetch(&AccountQuery::new("alice"), far_deadline());
            assert_eq!(attrs_a.unwrap().counter, attrs_b.unwrap().counter);
        }
    }
}
