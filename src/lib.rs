pub mod cluster;
pub mod credentials;
pub mod error;
pub mod gossip;
pub mod jmx;
pub mod server;
pub mod telemetry;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
