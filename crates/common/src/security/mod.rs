//! Platform security integrations.

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider};
