//! Change classification and conflict resolution

pub mod resolver;

pub use resolver::{merge_fields, Classification, ConflictResolver, Resolution};
