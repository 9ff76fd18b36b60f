#![doc = "diversion-sync-core: core logic library for diversion-sync."]

//! This crate holds the transport-free logic for synchronising a build controller with a
//! Diversion repository: the virtual tree over a flat path listing, pipeline script
//! resolution, changelog reconciliation with per-build deduplication, and change detection.
//! The remote API and the host build system are reached only through the traits in
//! [`contract`].
//!
//! # Usage
//! Implement [`contract::RemoteGateway`] (the `diversion-sync` crate ships an HTTP one) and
//! [`contract::HostBuild`], then drive a pass with [`checkout::checkout`] or ask
//! [`polling::poll`] whether a build is due.

pub mod changelog;
pub mod checkout;
pub mod config;
pub mod contract;
pub mod error;
pub mod polling;
pub mod resolver;
pub mod revision;
pub mod session;
pub mod tree;
