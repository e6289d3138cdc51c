//! Surfaces built on the core engine: the verification report and the host
//! hook protocol.

pub mod hooks;
pub mod verify;
