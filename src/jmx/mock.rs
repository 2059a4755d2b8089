//! Mock implementation for [`JmxClient`]
//!
//! Serves canned failure detector states per address so the poller and the
//! HTTP surface can be exercised without a Jolokia agent or a Cassandra node.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::gossip::{AllEndpointStates, EndpointState};

use super::error::{Error, Result};
use super::{CassandraNodeState, JmxClient};

/// What the mock answers for a given address
#[derive(Debug, Clone)]
pub enum MockResponse {
    State(CassandraNodeState),
    Fault(Error),
}

#[derive(Debug, Default)]
struct MockInner {
    responses: HashMap<String, MockResponse>,
    calls: HashMap<String, usize>,
}

#[derive(Clone, Debug, Default)]
pub struct MockJmxClient {
    inner: Arc<Mutex<MockInner>>,
}

impl MockJmxClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire_lock(&self) -> MutexGuard<MockInner> {
        // a poisoned mock means a test already panicked
        self.inner.lock().unwrap()
    }

    pub fn with_node_state(self, addr: &str, state: CassandraNodeState) -> Self {
        self.set_node_state(addr, state);
        self
    }

    pub fn set_node_state(&self, addr: &str, state: CassandraNodeState) {
        self.acquire_lock()
            .responses
            .insert(addr.to_string(), MockResponse::State(state));
    }

    pub fn set_fault(&self, addr: &str, err: Error) {
        self.acquire_lock()
            .responses
            .insert(addr.to_string(), MockResponse::Fault(err));
    }

    pub fn remove(&self, addr: &str) {
        self.acquire_lock().responses.remove(addr);
    }

    /// Number of fetches issued for `addr` so far
    pub fn calls(&self, addr: &str) -> usize {
        self.acquire_lock().calls.get(addr).copied().unwrap_or(0)
    }
}

#[async_trait]
impl JmxClient for MockJmxClient {
    async fn fetch_node_state(&self, addr: &str) -> Result<CassandraNodeState> {
        let mut guard = self.acquire_lock();
        *guard.calls.entry(addr.to_string()).or_default() += 1;

        match guard.responses.get(addr) {
            Some(MockResponse::State(state)) => Ok(state.clone()),
            Some(MockResponse::Fault(err)) => Err(err.clone()),
            None => Err(Error::Transport {
                reason: format!("node {} not found", addr),
            }),
        }
    }
}

/// Gossip attributes of a node in `dc`, addressed by a bare ip (`10.0.0.1`)
pub fn endpoint_state(ip: &str, status: &str, dc: &str) -> EndpointState {
    EndpointState {
        status: status.to_string(),
        datacenter: dc.to_string(),
        rack: "rack1".to_string(),
        internal_ip: ip.to_string(),
        rpc_address: ip.to_string(),
    }
}

/// Builds the view a node has of its peers.
///
/// `peers` maps bare ips to the simple state this node reports for them.
/// Every peer is advertised in gossip as `NORMAL` in `dc`.
pub fn cassandra_node_state(dc: &str, peers: &[(&str, &str)]) -> CassandraNodeState {
    let simple_states: BTreeMap<String, String> = peers
        .iter()
        .map(|(ip, state)| (format!("/{}", ip), state.to_string()))
        .collect();
    let all_endpoint_states: AllEndpointStates = peers
        .iter()
        .map(|(ip, _)| (format!("/{}", ip), endpoint_state(ip, "NORMAL", dc)))
        .collect();

    CassandraNodeState {
        simple_states,
        all_endpoint_states,
    }
}
