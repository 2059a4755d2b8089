//! This file contains the [`State`] data structure.
//! It holds everything the prober knows at any given time:
//!  1. the failure detector view of every tracked Cassandra node ([`NodeState`])
//!  2. coordination fields published by the reconciler (seeds, owned dcs, readiness flags, IP sets)
//!
//! Node views are refreshed by the [`super::poller`], which rebuilds the whole
//! node map every cycle and swaps it in through [`State::replace_nodes`].
//! Coordination fields are only written through the HTTP control surface.
//!
//! Every accessor takes the lock, copies what it needs and releases it.
//! No reference to the inner data ever escapes.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::gossip::EndpointState;

use super::aggregator::{self, Readiness};
use super::error::{Error, Result};

/// Turns an ip (`10.0.0.1`) into the address form used by gossip (`/10.0.0.1`)
pub fn gossip_address(ip: &str) -> String {
    if ip.starts_with('/') {
        ip.to_string()
    } else {
        format!("/{}", ip)
    }
}

/// What the prober knows about a single Cassandra node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// peer address -> "UP"/"DOWN" as seen by this node.
    /// Holds a single self-entry with a status code if the last poll failed.
    pub simple_states: BTreeMap<String, String>,
    /// this node's own gossip attributes
    pub endpoint: EndpointState,
}

/// A datacenter owned by this region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dc {
    pub name: String,
    pub replicas: u32,
}

#[derive(Debug, Default)]
struct StateInner {
    nodes: BTreeMap<String, NodeState>,
    dcs: Vec<Dc>,
    seeds: Vec<String>,
    region_ready: bool,
    reaper_ready: bool,
    // gossip address -> pod ip, as last seen by a readiness probe
    pod_ips: BTreeMap<String, String>,
    region_ips: Vec<String>,
    reaper_ips: Vec<String>,
}

#[derive(Clone, Default)]
pub struct State {
    inner: Arc<Mutex<StateInner>>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(inner) => {
                write!(f, "State: {:?}", inner.nodes)
            }
            Err(_) => {
                write!(f, "Unable to acquire lock for logging at this time...")
            }
        }
    }
}

macro_rules! field_accessors {
    ($get:ident, $set:ident, $field:ident, $t:ty) => {
        pub fn $get(&self) -> Result<$t> {
            Ok(self.acquire_lock()?.$field.clone())
        }

        pub fn $set(&self, value: $t) -> Result<()> {
            self.acquire_lock()?.$field = value;
            Ok(())
        }
    };
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire_lock(&self) -> Result<MutexGuard<StateInner>> {
        if let Ok(guard) = self.inner.lock() {
            Ok(guard)
        } else {
            Err(Error::Logic {
                reason: "Unable to acquire lock".to_string(),
            })
        }
    }

    /// Handles a readiness probe for `ip`.
    ///
    /// The first probe from an unknown address registers it with an empty
    /// [`NodeState`] so it gets polled on the next cycle. `pod_ip` is the
    /// caller's socket address, remembered to bridge broadcast and pod addresses.
    pub fn probe(&self, ip: &str, pod_ip: Option<&str>) -> Result<Readiness> {
        let addr = gossip_address(ip);
        let mut guard = self.acquire_lock()?;

        if !guard.nodes.contains_key(&addr) {
            event!(Level::INFO, ip = %addr, "new ip from readiness probe");
            guard.nodes.insert(addr.clone(), NodeState::default());
        }

        if let Some(pod_ip) = pod_ip {
            guard.pod_ips.insert(addr.clone(), gossip_address(pod_ip));
        }

        Ok(aggregator::is_ready(&guard.nodes, &addr))
    }

    /// Addresses to poll on the next cycle
    pub fn addresses(&self) -> Result<BTreeSet<String>> {
        let guard = self.acquire_lock()?;
        Ok(guard.nodes.keys().cloned().collect())
    }

    pub fn nodes(&self) -> Result<BTreeMap<String, NodeState>> {
        Ok(self.acquire_lock()?.nodes.clone())
    }

    /// Swaps in the node map built by a poll cycle, if it differs from the current one.
    ///
    /// `polled` is the address set the cycle started from. Addresses
    /// registered by readiness probes while the cycle was running are not part
    /// of it and are carried over untouched. Returns true if the map changed.
    pub fn replace_nodes(
        &self,
        polled: &BTreeSet<String>,
        mut nodes: BTreeMap<String, NodeState>,
    ) -> Result<bool> {
        let mut guard = self.acquire_lock()?;

        for (addr, node) in guard.nodes.iter() {
            if !polled.contains(addr) && !nodes.contains_key(addr) {
                nodes.insert(addr.clone(), node.clone());
            }
        }

        if nodes == guard.nodes {
            return Ok(false);
        }

        for addr in guard.nodes.keys() {
            if !nodes.contains_key(addr) {
                event!(Level::INFO, ip = %addr, "removing unreferenced node");
            }
        }

        event!(Level::INFO, "node states updated");
        event!(Level::DEBUG, "previous: {:?}, current: {:?}", guard.nodes, nodes);
        guard.nodes = nodes;
        Ok(true)
    }

    pub fn pod_ips(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.acquire_lock()?.pod_ips.clone())
    }

    field_accessors!(dcs, set_dcs, dcs, Vec<Dc>);
    field_accessors!(seeds, set_seeds, seeds, Vec<String>);
    field_accessors!(region_ready, set_region_ready, region_ready, bool);
    field_accessors!(reaper_ready, set_reaper_ready, reaper_ready, bool);
    field_accessors!(region_ips, set_region_ips, region_ips, Vec<String>);
    field_accessors!(reaper_ips, set_reaper_ips, reaper_ips, Vec<String>);
}

#[cfg(test)]
impl State {
    /// Readiness of `addr` without registering it
    pub(crate) fn readiness(&self, addr: &str) -> Result<Readiness> {
        let guard = self.acquire_lock()?;
        Ok(aggregator::is_ready(&guard.nodes, &gossip_address(addr)))
    }

    pub(crate) fn knows_node(&self, addr: &str) -> Result<bool> {
        let guard = self.acquire_lock()?;
        Ok(guard.nodes.contains_key(&gossip_address(addr)))
    }

    pub(crate) fn owns_dc(&self, dc: &str) -> Result<bool> {
        let guard = self.acquire_lock()?;
        Ok(guard.dcs.iter().any(|owned| owned.name == dc))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{gossip_address, Dc, NodeState, State};
    use crate::jmx::mock::endpoint_state;

    fn healthy(ip: &str) -> NodeState {
        NodeState {
            simple_states: BTreeMap::from([(format!("/{}", ip), "UP".to_string())]),
            endpoint: endpoint_state(ip, "NORMAL", "dc1"),
        }
    }

    #[test]
    fn gossip_addresses() {
        assert_eq!(gossip_address("10.0.0.1"), "/10.0.0.1");
        assert_eq!(gossip_address("/10.0.0.1"), "/10.0.0.1");
    }

    #[test]
    fn first_probe_registers_node() {
        let state = State::new();

        let readiness = state.probe("10.0.0.1", Some("172.16.0.1")).unwrap();
        assert!(readiness.ready);
        assert_eq!(
            readiness.view,
            BTreeMap::from([("/10.0.0.1".to_string(), "?".to_string())])
        );

        assert!(state.knows_node("10.0.0.1").unwrap());
        assert_eq!(state.nodes().unwrap()["/10.0.0.1"], NodeState::default());
        assert_eq!(
            state.pod_ips().unwrap(),
            BTreeMap::from([("/10.0.0.1".to_string(), "/172.16.0.1".to_string())])
        );
    }

    #[test]
    fn probing_known_node_keeps_its_state() {
        let state = State::new();
        let polled = BTreeSet::new();
        state
            .replace_nodes(
                &polled,
                BTreeMap::from([("/10.0.0.1".to_string(), healthy("10.0.0.1"))]),
            )
            .unwrap();

        state.probe("10.0.0.1", None).unwrap();
        assert_eq!(state.nodes().unwrap()["/10.0.0.1"], healthy("10.0.0.1"));
        assert!(state.pod_ips().unwrap().is_empty());
    }

    #[test]
    fn replace_nodes_only_on_change() {
        let state = State::new();
        let polled = BTreeSet::new();
        let nodes = BTreeMap::from([("/10.0.0.1".to_string(), healthy("10.0.0.1"))]);

        assert!(state.replace_nodes(&polled, nodes.clone()).unwrap());
        assert!(!state.replace_nodes(&polled, nodes).unwrap());
    }

    #[test]
    fn replace_nodes_drops_polled_addresses_missing_from_new_map() {
        let state = State::new();
        state
            .replace_nodes(
                &BTreeSet::new(),
                BTreeMap::from([
                    ("/10.0.0.1".to_string(), healthy("10.0.0.1")),
                    ("/10.0.0.2".to_string(), healthy("10.0.0.2")),
                ]),
            )
            .unwrap();

        let polled = state.addresses().unwrap();
        assert!(state
            .replace_nodes(
                &polled,
                BTreeMap::from([("/10.0.0.1".to_string(), healthy("10.0.0.1"))]),
            )
            .unwrap());
        assert!(!state.knows_node("/10.0.0.2").unwrap());
    }

    #[test]
    fn replace_nodes_keeps_nodes_registered_mid_cycle() {
        let state = State::new();
        state.probe("10.0.0.1", None).unwrap();
        let polled = state.addresses().unwrap();

        // a readiness probe lands while the cycle is running
        state.probe("10.0.0.2", None).unwrap();

        state
            .replace_nodes(
                &polled,
                BTreeMap::from([("/10.0.0.1".to_string(), healthy("10.0.0.1"))]),
            )
            .unwrap();

        let nodes = state.nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes["/10.0.0.2"], NodeState::default());
    }

    #[test]
    fn coordination_fields() {
        let state = State::new();
        assert!(state.seeds().unwrap().is_empty());
        assert!(!state.region_ready().unwrap());

        state
            .set_seeds(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
            .unwrap();
        state
            .set_dcs(vec![Dc {
                name: "dc1".to_string(),
                replicas: 3,
            }])
            .unwrap();
        state.set_reaper_ready(true).unwrap();

        assert_eq!(state.seeds().unwrap(), vec!["10.0.0.1", "10.0.0.2"]);
        assert!(state.owns_dc("dc1").unwrap());
        assert!(!state.owns_dc("dc2").unwrap());
        assert!(state.reaper_ready().unwrap());
        assert!(!state.region_ready().unwrap());
    }
}
