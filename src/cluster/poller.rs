//! Periodic refresh of the failure detector view of every tracked node.
//!
//! Every tick the poller:
//!  1. reads the failure detector state of every known address through the [`JmxClient`]
//!  2. merges the results and the peers discovered in them into a brand new node map
//!  3. swaps it into [`State`] if anything changed
//!
//! A tick never overlaps the previous one: if a cycle takes longer than the
//! polling interval, missed ticks are skipped.
use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{event, instrument, Level};

use crate::jmx::SyncJmxClient;
use crate::server::metrics;

use super::aggregator::merge_poll_results;
use super::error::{Error, Result};
use super::state::State;

#[derive(Debug, PartialEq)]
pub enum PollResult {
    /// the node map didn't change
    Unchanged,
    /// a new node map was swapped in
    Updated,
}

/// Polls forever, once every `interval`.
pub async fn start_poller(state: State, client: SyncJmxClient, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match do_poll(&state, &client).await {
            Ok(result) => {
                event!(Level::DEBUG, "poll cycle finished: {:?}", result);
            }
            Err(Error::NoKnownNodes) => {
                event!(Level::INFO, "0 discovered nodes...");
            }
            Err(err) => {
                event!(Level::WARN, "poll cycle failed: {}", err);
            }
        }
    }
}

#[instrument(name = "cluster::poller::do_poll", level = "debug", skip_all)]
pub(crate) async fn do_poll(state: &State, client: &SyncJmxClient) -> Result<PollResult> {
    let polled = state.addresses()?;
    if polled.is_empty() {
        return Err(Error::NoKnownNodes);
    }

    let responses = join_all(polled.iter().map(|addr| async move {
        let response = client.fetch_node_state(addr).await;
        (addr.clone(), response)
    }))
    .await;

    let mut results = BTreeMap::new();
    for (addr, response) in responses {
        match &response {
            Ok(_) => metrics::record_jmx_fetch(true),
            Err(err) => {
                event!(Level::WARN, "jolokia request for ip {:?} failed: {}", addr, err);
                metrics::record_jmx_fetch(false);
            }
        }
        results.insert(addr, response);
    }

    let previous = state.nodes()?;
    let nodes = merge_poll_results(results, &state.dcs()?, &previous);

    let updated = state.replace_nodes(&polled, nodes)?;
    metrics::set_known_nodes(state.addresses()?.len());

    if updated {
        Ok(PollResult::Updated)
    } else {
        Ok(PollResult::Unchanged)
    }
}
