//! Macro for implementing Display and FromStr for status enums
//!
//! This macro eliminates boilerplate for status enum conversions by providing
//! a single implementation for both Display and FromStr traits. It handles
//! case-insensitive parsing and consistent string representation.
//!
//! # Example
//!
//! ```rust
//! use caresync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum ConnectionStatus {
//!     Active,
//!     Error,
//!     Disabled,
//! }
//!
//! impl_domain_status_conversions!(ConnectionStatus {
//!     Active => "active",
//!     Error => "error",
//!     Disabled => "disabled",
//! });
//! ```

/// Implements Display and FromStr traits for status enums
///
/// This macro generates:
/// - Display trait: converts enum variants to lowercase strings
/// - FromStr trait: parses case-insensitive strings to enum variants
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their string
///   representations
///
/// # Features
///
/// - Case-insensitive parsing (e.g., "PENDING", "pending", "Pending" all work)
/// - Consistent lowercase string output
/// - Descriptive error messages with enum name
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Direction {
        Bidirectional,
        PushOnly,
    }

    impl_domain_status_conversions!(Direction {
        Bidirectional => "bidirectional",
        PushOnly => "push_only",
    });

    #[test]
    fn display_uses_mapped_string() {
        assert_eq!(Direction::PushOnly.to_string(), "push_only");
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(Direction::from_str("PUSH_ONLY").unwrap(), Direction::PushOnly);
        assert_eq!(Direction::from_str("Bidirectional").unwrap(), Direction::Bidirectional);
    }

    #[test]
    fn from_str_reports_enum_name() {
        let err = Direction::from_str("sideways").unwrap_err();
        assert_eq!(err, "Invalid Direction: sideways");
    }

    mod with_result_alias {
        use std::str::FromStr;

        #[allow(unused_imports)]
        use crate::errors::Result;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Outcome {
            Success,
            Failed,
        }

        impl_domain_status_conversions!(Outcome {
            Success => "success",
            Failed => "failed",
        });

        #[test]
        fn expands_next_to_single_argument_result_alias() {
            assert_eq!(Outcome::from_str("failed").unwrap(), Outcome::Failed);
            assert_eq!(Outcome::Success.to_string(), "success");
        }
    }
}
