//! Module that contains the cluster view: node states, readiness aggregation
//! and the poller keeping them fresh
pub mod aggregator;
pub mod error;
pub mod poller;
pub mod state;
