//! Module that contains the client API used to read Cassandra's failure
//! detector state through a JMX-to-HTTP proxy.
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::gossip::AllEndpointStates;

pub mod error;
pub mod jolokia;
pub mod mock;

use error::Result;

/// Failure detector MBean read on every poll
pub const FAILURE_DETECTOR_MBEAN: &str = "org.apache.cassandra.net:type=FailureDetector";

/// Attributes of [`FAILURE_DETECTOR_MBEAN`] requested on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::IntoStaticStr, strum_macros::EnumIter)]
pub enum Attribute {
    SimpleStates,
    AllEndpointStates,
}

/// The failure detector view of a single Cassandra node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CassandraNodeState {
    /// maps peer addresses to either "UP" or "DOWN" as seen by this node
    pub simple_states: BTreeMap<String, String>,
    /// maps peer addresses to their gossip attributes
    pub all_endpoint_states: AllEndpointStates,
}

/// Narrow capability the poller needs from a JMX proxy.
#[async_trait]
pub trait JmxClient {
    /// Reads `SimpleStates` and `AllEndpointStates` from the node with the given gossip address
    async fn fetch_node_state(&self, addr: &str) -> Result<CassandraNodeState>;
}

pub type SyncJmxClient = Arc<dyn JmxClient + Send + Sync + 'static>;
