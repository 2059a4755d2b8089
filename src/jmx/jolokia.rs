//! A concrete [`JmxClient`] implementation talking to a local Jolokia agent in proxy mode.
//!
//! Every call issues a single bulk read request targeting the node's JMX
//! service URL. The admin credentials are snapshotted from
//! [`SharedCredentials`] when the request is built, so a credential rotation
//! only affects requests issued after it.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::{event, instrument, Level};

use crate::credentials::{Credentials, SharedCredentials};
use crate::gossip;

use super::error::{Error, Result};
use super::{Attribute, CassandraNodeState, JmxClient, FAILURE_DETECTOR_MBEAN};

lazy_static! {
    static ref USER_FIELD: Regex = Regex::new(r#"("user":)".*?""#).unwrap();
    static ref PASSWORD_FIELD: Regex = Regex::new(r#"("password":)".*?""#).unwrap();
}

/// Jolokia status for a successful read
const JOLOKIA_OK: u16 = 200;

/// Builds the JMX service URL for a gossip address (`/10.0.0.1` or `10.0.0.1`)
pub fn jmx_url(addr: &str, jmx_port: u16) -> String {
    format!(
        "service:jmx:rmi:///jndi/rmi://{}:{}/jmxrmi",
        addr.trim_start_matches('/'),
        jmx_port
    )
}

#[derive(Debug, Serialize)]
struct Target<'a> {
    url: String,
    user: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    mbean: &'static str,
    attribute: Vec<&'static str>,
    target: Target<'a>,
}

/// One entry of the bulk response
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FailureDetectorValue {
    #[serde(rename = "SimpleStates", default)]
    simple_states: BTreeMap<String, String>,
    #[serde(rename = "AllEndpointStates", default)]
    all_endpoint_states: String,
}

/// Serializes the bulk read request for a single node
pub fn node_state_request(addr: &str, jmx_port: u16, credentials: &Credentials) -> Result<Vec<u8>> {
    let request = [ReadRequest {
        kind: "read",
        mbean: FAILURE_DETECTOR_MBEAN,
        attribute: Attribute::iter().map(Into::into).collect(),
        target: Target {
            url: jmx_url(addr, jmx_port),
            user: &credentials.user,
            password: &credentials.password,
        },
    }];

    Ok(serde_json::to_vec(&request)?)
}

/// Hides credentials echoed back by the proxy before a body is logged or returned
pub fn redact(body: &str) -> String {
    let body = USER_FIELD.replace_all(body, r#"${1}"***""#);
    PASSWORD_FIELD
        .replace_all(&body, r#"${1}"***""#)
        .into_owned()
}

/// Interprets the proxy's HTTP response.
///
/// # Errors
/// See [`Error`] for every possible failure.
pub fn parse_response(http_status: u16, body: &[u8]) -> Result<CassandraNodeState> {
    let redacted = redact(&String::from_utf8_lossy(body));

    if !(200..300).contains(&http_status) {
        return Err(Error::HttpStatus {
            status: http_status,
            body: redacted,
        });
    }

    let mut envelopes: Vec<Envelope> = serde_json::from_slice(body)?;
    if envelopes.is_empty() {
        return Err(Error::EmptyResponse);
    }

    if envelopes.len() > 1 {
        event!(
            Level::WARN,
            "expected one response, {} given. Response body: {}",
            envelopes.len(),
            redacted
        );
    }

    let envelope = envelopes.swap_remove(0);
    let error = envelope.error.unwrap_or_default();
    if envelope.status != JOLOKIA_OK || !error.is_empty() {
        event!(Level::DEBUG, "jolokia read failed: {}", redacted);
        return Err(Error::Jolokia {
            status: envelope.status,
            reason: error,
        });
    }

    let value = envelope.value.ok_or_else(|| Error::InvalidResponse {
        reason: "successful response without a value".to_string(),
    })?;
    let value: FailureDetectorValue = serde_json::from_value(value)?;

    Ok(CassandraNodeState {
        simple_states: value.simple_states,
        all_endpoint_states: gossip::decode(&value.all_endpoint_states)?,
    })
}

pub struct JolokiaClient {
    url: String,
    client: reqwest::Client,
    jmx_port: u16,
    credentials: SharedCredentials,
}

impl JolokiaClient {
    /// Client for the agent listening on `localhost:<jolokia_port>`
    pub fn new(
        jolokia_port: u16,
        jmx_port: u16,
        timeout: Duration,
        credentials: SharedCredentials,
    ) -> Result<Self> {
        Self::with_url(
            format!("http://localhost:{}/jolokia", jolokia_port),
            jmx_port,
            timeout,
            credentials,
        )
    }

    pub fn with_url(
        url: String,
        jmx_port: u16,
        timeout: Duration,
        credentials: SharedCredentials,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            url,
            client,
            jmx_port,
            credentials,
        })
    }
}

#[async_trait]
impl JmxClient for JolokiaClient {
    #[instrument(name = "jmx::jolokia::fetch_node_state", level = "debug", skip(self))]
    async fn fetch_node_state(&self, addr: &str) -> Result<CassandraNodeState> {
        let credentials = self.credentials.current().map_err(|e| Error::Transport {
            reason: e.to_string(),
        })?;
        let body = node_state_request(addr, self.jmx_port, &credentials)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        parse_response(status, &body)
    }
}
