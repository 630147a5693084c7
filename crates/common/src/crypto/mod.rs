//! Shared cryptographic primitives used across runtime and platform features.

pub mod encryption;
pub mod mac;

pub use encryption::{EncryptedData, EncryptionService};
pub use mac::MacService;
