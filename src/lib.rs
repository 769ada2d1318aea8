//! Payment channel and alias pipeline for a Monero-paid membership service.
//!
//! Users are assigned a dedicated subaddress of a shared wallet (their payment channel). A
//! periodic sync keeps the wallet current, a payment watcher activates users once an incoming
//! transfer on their channel is confirmed, and the DNS reconciler publishes an OpenAlias record
//! for every user with a recorded payout address.

pub mod allocator;
pub mod config;
pub mod dns;
pub mod payments;
pub mod service;
pub mod store;
pub mod sync;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod test_utils;
