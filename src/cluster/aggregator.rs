//! Readiness consensus and peer discovery.
//!
//! A node is ready when every *healthy* node that knows about it sees it as
//! UP. A reporter is healthy if its own gossip status is `NORMAL` and it sees
//! itself as `UP`; anything else it says about its peers is ignored. With no
//! healthy reporter at all the node is ready, which is what lets the very
//! first Cassandra node of a cluster pass its readiness probe.
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{event, Level};

use crate::gossip::EndpointState;
use crate::jmx::{self, CassandraNodeState};

use super::state::{Dc, NodeState};

/// Rendered in a diagnostic view when a peer has no opinion about the probed node
pub const UNKNOWN_STATE: &str = "?";

const UP: &str = "up";
const NORMAL: &str = "normal";

/// Verdict of a readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    /// peer address -> what that peer thinks of the probed node
    pub view: BTreeMap<String, String>,
}

fn is_healthy_reporter(addr: &str, node: &NodeState) -> bool {
    let sees_itself_up = node
        .simple_states
        .get(addr)
        .map(|s| s.eq_ignore_ascii_case(UP))
        .unwrap_or(false);

    node.endpoint.status.eq_ignore_ascii_case(NORMAL) && sees_itself_up
}

/// Checks whether every healthy known node sees `addr` as UP
pub fn is_ready(nodes: &BTreeMap<String, NodeState>, addr: &str) -> Readiness {
    let mut view = BTreeMap::new();
    let mut ignored = Vec::new();
    let mut unready_view = Vec::new();

    for (peer, node) in nodes.iter() {
        let simple_state = node
            .simple_states
            .get(addr)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_STATE);
        view.insert(peer.clone(), simple_state.to_string());

        if !is_healthy_reporter(peer, node) {
            ignored.push(peer.as_str());
            continue;
        }

        if !simple_state.eq_ignore_ascii_case(UP) {
            unready_view.push(peer.as_str());
        }
    }

    if !ignored.is_empty() {
        event!(
            Level::DEBUG,
            "ignoring the view of {:?} as they are not ready",
            ignored
        );
    }

    let ready = unready_view.is_empty();
    if ready {
        event!(Level::DEBUG, "all healthy nodes see node {} as ready", addr);
    } else {
        event!(Level::DEBUG, "node {} not seen as ready by {:?}", addr, unready_view);
    }

    Readiness { ready, view }
}

/// Builds the node map for the next snapshot out of one poll cycle.
///
/// 1. every successfully polled node gets its own view and gossip attributes
/// 2. peers found in those gossip dumps are added if they belong to an owned dc
/// 3. failed polls get a single self-entry holding the failure status code.
///    If at least one poll succeeded, a failed node that no live gossip dump
///    mentions anymore is dropped instead, which is how decommissioned nodes age out.
pub fn merge_poll_results(
    results: BTreeMap<String, jmx::error::Result<CassandraNodeState>>,
    owned_dcs: &[Dc],
    previous: &BTreeMap<String, NodeState>,
) -> BTreeMap<String, NodeState> {
    let owns = |dc: &str| owned_dcs.iter().any(|owned| owned.name == dc);
    let any_success = results.values().any(Result::is_ok);

    let mut nodes = BTreeMap::new();
    for (addr, result) in results.iter() {
        if let Ok(state) = result {
            nodes.insert(
                addr.clone(),
                NodeState {
                    simple_states: state.simple_states.clone(),
                    endpoint: state
                        .all_endpoint_states
                        .get(addr)
                        .cloned()
                        .unwrap_or_default(),
                },
            );
        }
    }

    let mut discovered: BTreeMap<String, EndpointState> = BTreeMap::new();
    for state in results.values().filter_map(|r| r.as_ref().ok()) {
        for (peer, endpoint) in state.all_endpoint_states.iter() {
            if nodes.contains_key(peer) || discovered.contains_key(peer) {
                continue;
            }

            if owns(&endpoint.datacenter) {
                if !previous.contains_key(peer) {
                    event!(Level::INFO, ip = %peer, dc = %endpoint.datacenter, "new node found");
                }
                discovered.insert(peer.clone(), endpoint.clone());
            }
        }
    }

    for (addr, result) in results.into_iter() {
        let Err(err) = result else {
            continue;
        };

        let endpoint = discovered.remove(&addr);
        if any_success && endpoint.is_none() {
            continue;
        }

        nodes.insert(
            addr.clone(),
            NodeState {
                simple_states: BTreeMap::from([(addr, err.status_code().to_string())]),
                endpoint: endpoint.unwrap_or_default(),
            },
        );
    }

    for (peer, endpoint) in discovered.into_iter() {
        nodes.insert(
            peer,
            NodeState {
                simple_states: BTreeMap::new(),
                endpoint,
            },
        );
    }

    nodes
}
