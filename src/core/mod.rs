//! Core modules for statute's lifecycle kernel.
//!
//! Leaves first: the record codec, decorations and hash chain; then the
//! store layout, leases and grants; the lifecycle engine and the access gate
//! sit on top.

pub mod config;
pub mod decoration;
pub mod delegation;
pub mod error;
pub mod gatekeeper;
pub mod grants;
pub mod hash_chain;
pub mod journal;
pub mod lease;
pub mod lifecycle;
pub mod lock;
pub mod output;
pub mod record;
pub mod store;
pub mod time;
