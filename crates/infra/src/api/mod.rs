//! Remote CareSync API
//!
//! Connection metadata mirror and audit delivery. Everything here is
//! best-effort from the sync engine's point of view: the orchestrator logs
//! failures and carries on.

pub mod client;

pub use client::RemoteMirrorClient;
