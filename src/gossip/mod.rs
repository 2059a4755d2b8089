//! Decoder for the failure detector's `AllEndpointStates` dump.
//!
//! Cassandra exposes the gossip view of every endpoint as a single text blob
//! with one block per peer:
//!
//! ```text
//! /10.244.0.6
//!   generation:1614289198
//!   heartbeat:828499
//!   STATUS:22:NORMAL,-2918089050085335913
//!   DC:8:dc1
//!   RACK:10:rack1
//!   INTERNAL_IP:6:10.244.0.6
//!   RPC_ADDRESS:3:10.244.0.6
//! ```
//!
//! The grammar is close enough to YAML that two regex passes turn it into a
//! nested mapping:
//!  1. drop version tokens (`22:`) and anything after a comma (`,-2918...`)
//!  2. turn the `/address` header and every `KEY:` into `address: ` / `KEY: `
//!
//! Only [`EndpointState`]'s fields are kept, every other key is discarded.
use std::collections::BTreeMap;
use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Max number of bytes of the raw dump carried by a [`DecodeError`]
const MAX_FRAGMENT_LEN: usize = 256;

lazy_static! {
    // matches digits before a colon OR anything after a comma:
    //   RACK:10:rack1 -> `10:`
    //   STATUS:22:NORMAL,-2918089050085335913 -> `22:`, `,-2918089050085335913`
    static ref REMOVALS: Regex = Regex::new(r"\d+:|,.+").unwrap();
    // matches addresses starting with a slash OR colons:
    //   /10.244.0.22 -> `/10.244.0.22` (group 1)
    //   RACK:rack1 -> `:`
    static ref TO_YAML: Regex = Regex::new(r"(/\S+)|:").unwrap();
}

/// Attributes of a single Cassandra node as seen through gossip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    #[serde(rename = "STATUS", default)]
    pub status: String,
    #[serde(rename = "DC", default)]
    pub datacenter: String,
    #[serde(rename = "RACK", default)]
    pub rack: String,
    #[serde(rename = "INTERNAL_IP", default)]
    pub internal_ip: String,
    #[serde(rename = "RPC_ADDRESS", default)]
    pub rpc_address: String,
}

/// Peer address (`/10.244.0.6`) -> [`EndpointState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllEndpointStates(pub BTreeMap<String, EndpointState>);

impl AllEndpointStates {
    pub fn get(&self, addr: &str) -> Option<&EndpointState> {
        self.0.get(addr)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &EndpointState)> {
        self.0.iter()
    }
}

#[cfg(test)]
impl AllEndpointStates {
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, EndpointState)> for AllEndpointStates {
    fn from_iter<T: IntoIterator<Item = (String, EndpointState)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The JMX proxy returns the dump as a JSON string. Deserializing through a
/// [`String`] takes care of backslash escapes (`\/`, `\n`) before decoding.
impl<'de> Deserialize<'de> for AllEndpointStates {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        decode(&raw).map_err(serde::de::Error::custom)
    }
}

/// Returned when a dump doesn't follow the expected grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeError {
    pub reason: String,
    /// Leading part of the raw dump, for diagnostics
    pub fragment: String,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DecodeError {}

/// Rewrites a raw dump into YAML
fn to_yaml(raw: &str) -> String {
    let stripped = REMOVALS.replace_all(raw, "");
    TO_YAML.replace_all(&stripped, "${1}: ").into_owned()
}

/// Decodes a raw `AllEndpointStates` dump.
///
/// # Errors
/// Returns [`DecodeError`] if the rewritten text is not a mapping of mappings.
pub fn decode(raw: &str) -> Result<AllEndpointStates, DecodeError> {
    if raw.trim().is_empty() {
        return Ok(AllEndpointStates::default());
    }

    let yaml = to_yaml(raw);
    let states: BTreeMap<String, EndpointState> =
        serde_yaml::from_str(&yaml).map_err(|e| DecodeError {
            reason: e.to_string(),
            fragment: fragment(raw),
        })?;

    Ok(AllEndpointStates(states))
}

fn fragment(raw: &str) -> String {
    if raw.len() <= MAX_FRAGMENT_LEN {
        return raw.to_string();
    }

    let mut end = MAX_FRAGMENT_LEN;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::{decode, to_yaml, AllEndpointStates, EndpointState};

    const UNESCAPED: &str = r#""/10.244.0.6\n  generation:1614289198\n  heartbeat:828499\n  STATUS:22:NORMAL,-2918089050085335913\n  LOAD:828474:134596.0\n  SCHEMA:144:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc1\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.6\n  RPC_ADDRESS:3:10.244.0.6\n  NET_VERSION:1:11\n  HOST_ID:2:3e0d7191-84af-40cf-9e7f-0ce11c925e7f\n  RPC_READY:33:true\n  TOKENS:21:<hidden>\n/10.244.0.7\n  generation:1614289198\n  heartbeat:828572\n  STATUS:22:NORMAL,-139581499681091162\n  LOAD:828543:140333.0\n  SCHEMA:143:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc2\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.7\n  RPC_ADDRESS:3:10.244.0.7\n  NET_VERSION:1:11\n  HOST_ID:2:070ef8d2-7f54-4fd4-b34d-dfd8c2690588\n  RPC_READY:32:true\n  TOKENS:21:<hidden>\n/10.244.0.5\n  generation:1614289203\n  heartbeat:828488\n  STATUS:33:NORMAL,-1068096267908218392\n  LOAD:828452:165615.0\n  SCHEMA:146:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc1\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.5\n  RPC_ADDRESS:3:10.244.0.5\n  NET_VERSION:1:11\n  HOST_ID:2:d629438b-7158-4558-8675-80dc705ddc8e\n  RPC_READY:43:true\n  TOKENS:32:<hidden>\n""#;

    const ESCAPED: &str = r#""\/10.244.0.6\n  generation:1614289198\n  heartbeat:828499\n  STATUS:22:NORMAL,-2918089050085335913\n  LOAD:828474:134596.0\n  SCHEMA:144:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc1\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.6\n  RPC_ADDRESS:3:10.244.0.6\n  NET_VERSION:1:11\n  HOST_ID:2:3e0d7191-84af-40cf-9e7f-0ce11c925e7f\n  RPC_READY:33:true\n  TOKENS:21:<hidden>\n\/10.244.0.7\n  generation:1614289198\n  heartbeat:828572\n  STATUS:22:NORMAL,-139581499681091162\n  LOAD:828543:140333.0\n  SCHEMA:143:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc2\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.7\n  RPC_ADDRESS:3:10.244.0.7\n  NET_VERSION:1:11\n  HOST_ID:2:070ef8d2-7f54-4fd4-b34d-dfd8c2690588\n  RPC_READY:32:true\n  TOKENS:21:<hidden>\n\/10.244.0.5\n  generation:1614289203\n  heartbeat:828488\n  STATUS:33:NORMAL,-1068096267908218392\n  LOAD:828452:165615.0\n  SCHEMA:146:69ea6896-bc4b-3690-8d18-50ee71f33237\n  DC:8:dc1\n  RACK:10:rack1\n  RELEASE_VERSION:4:3.11.9\n  INTERNAL_IP:6:10.244.0.5\n  RPC_ADDRESS:3:10.244.0.5\n  NET_VERSION:1:11\n  HOST_ID:2:d629438b-7158-4558-8675-80dc705ddc8e\n  RPC_READY:43:true\n  TOKENS:32:<hidden>\n""#;

    fn endpoint(ip: &str, dc: &str) -> EndpointState {
        EndpointState {
            status: "NORMAL".to_string(),
            datacenter: dc.to_string(),
            rack: "rack1".to_string(),
            internal_ip: ip.to_string(),
            rpc_address: ip.to_string(),
        }
    }

    fn expected() -> AllEndpointStates {
        AllEndpointStates::from_iter([
            ("/10.244.0.5".to_string(), endpoint("10.244.0.5", "dc1")),
            ("/10.244.0.6".to_string(), endpoint("10.244.0.6", "dc1")),
            ("/10.244.0.7".to_string(), endpoint("10.244.0.7", "dc2")),
        ])
    }

    #[test]
    fn decodes_unescaped_dump() {
        let states: AllEndpointStates = serde_json::from_str(UNESCAPED).unwrap();
        assert_eq!(states, expected());
    }

    #[test]
    fn decodes_escaped_dump() {
        let states: AllEndpointStates = serde_json::from_str(ESCAPED).unwrap();
        assert_eq!(states, expected());
    }

    #[test]
    fn escaping_style_does_not_matter() {
        let unescaped: AllEndpointStates = serde_json::from_str(UNESCAPED).unwrap();
        let escaped: AllEndpointStates = serde_json::from_str(ESCAPED).unwrap();
        assert_eq!(unescaped, escaped);
    }

    #[test]
    fn strips_status_token_suffix() {
        let states =
            decode("/10.0.0.1\n  STATUS:17:LEAVING,-1068096267908218392\n  DC:9:dc1\n").unwrap();
        let state = states.get("/10.0.0.1").unwrap();
        assert_eq!(state.status, "LEAVING");
        assert_eq!(state.datacenter, "dc1");
        assert_eq!(state.rack, "");
    }

    #[test]
    fn rewrites_dump_as_yaml() {
        assert_eq!(
            to_yaml("/10.0.0.1\n  STATUS:17:NORMAL,-1068\n  DC:9:dc1\n"),
            "/10.0.0.1: \n  STATUS: NORMAL\n  DC: dc1\n"
        );
    }

    #[test]
    fn blank_dump_is_empty() {
        assert!(decode("").unwrap().is_empty());
        assert!(decode("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn malformed_dump_keeps_fragment() {
        let raw = "/10.0.0.1\n  DC:dc1\n    RACK: [unclosed\n";
        let err = decode(raw).err().unwrap();
        assert_eq!(err.fragment, raw);
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn fragment_is_truncated() {
        let raw = format!("/10.0.0.1\n  DC:dc1\n    RACK: [{}\n", "x".repeat(1024));
        let err = decode(&raw).err().unwrap();
        assert_eq!(err.fragment.len(), super::MAX_FRAGMENT_LEN);
    }
}
