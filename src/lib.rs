//! Offline-first request interception and caching engine.
//!
//! The engine sits between an application and the network. Every outgoing
//! request is classified into a serving strategy (cache-first,
//! network-first, or stale-while-revalidate) against a versioned partition
//! of a persistent store; a lifecycle layer precaches the app shell on
//! install and garbage-collects prior-generation partitions on
//! activation. A small control protocol lets the host force activation,
//! query the running generation, or wipe the cache.

pub mod config;
pub mod control;
pub mod lifecycle;
pub mod net;
pub mod notify;
pub mod router;
pub mod store;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;
