//! Range checks and text sanitization for event fields crossing the provider
//! boundary.

use caresync_domain::constants::{MAX_DESCRIPTION_CHARS, MAX_LOCATION_CHARS, MAX_TITLE_CHARS};
use caresync_domain::{EventFields, ProviderError};
use chrono::Duration;

/// Reject `end < start` and spans longer than `max_span_days`.
///
/// Out-of-range values are refused, never clamped.
pub fn check_range(fields: &EventFields, max_span_days: i64) -> Result<(), ProviderError> {
    if fields.end < fields.start {
        return Err(ProviderError::InvalidDateRange("end precedes start".to_string()));
    }
    if fields.span() > Duration::days(max_span_days) {
        return Err(ProviderError::InvalidDateRange(format!(
            "span exceeds {max_span_days} days"
        )));
    }
    Ok(())
}

/// Trim, strip control characters other than newline and tab, and truncate
/// free-text fields to their limits.
pub fn sanitize_fields(fields: &mut EventFields) {
    fields.title = sanitize_text(&fields.title, MAX_TITLE_CHARS);
    fields.description = sanitize_optional(fields.description.as_deref(), MAX_DESCRIPTION_CHARS);
    fields.location = sanitize_optional(fields.location.as_deref(), MAX_LOCATION_CHARS);
}

pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

// Blank optional text collapses to None.
fn sanitize_optional(input: Option<&str>, max_chars: usize) -> Option<String> {
    input.map(|s| sanitize_text(s, max_chars)).filter(|s| !s.is_empty())
}
