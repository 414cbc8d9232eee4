//! Bounce classification from free-text delivery errors.
//!
//! Provider errors reach us as prose, not status codes, so classification is
//! a case-insensitive substring match against two curated phrase lists:
//! - Permanent: the address itself is invalid or refused - don't retry
//! - Temporary: transient infrastructure trouble - retry off-peak
//! - Anything else is `Unknown` and gets a moderate retry policy

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phrases meaning the recipient address will never accept the message.
const PERMANENT_PATTERNS: &[&str] = &[
    "invalid email",
    "mailbox not found",
    "user unknown",
    "does not exist",
    "suppressed",
    "blocked",
    "rejected",
];

/// Phrases meaning the failure was on the delivery path and may clear up.
const TEMPORARY_PATTERNS: &[&str] = &[
    "timeout",
    "temporarily unavailable",
    "rate limit",
    "service unavailable",
    "connection refused",
    "queue full",
];

/// Classification of a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    /// The address is invalid or refused; never retried.
    Permanent,
    /// Transient infrastructure failure; retried off-peak.
    Temporary,
    /// No phrase matched; retried on a short backoff.
    Unknown,
    /// Not classified yet.
    #[default]
    None,
}

impl BounceType {
    /// Returns `true` until a failure has been classified.
    #[must_use]
    pub const fn is_unclassified(self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
            Self::Unknown => "unknown",
            Self::None => "none",
        }
    }
}

impl fmt::Display for BounceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a delivery error.
///
/// Permanent phrases win over temporary ones when both appear, since a
/// refused address stays refused however often we retry. Missing or blank
/// text is `Unknown`.
#[must_use]
pub fn classify(error_text: Option<&str>) -> BounceType {
    let Some(text) = error_text.map(str::trim).filter(|text| !text.is_empty()) else {
        return BounceType::Unknown;
    };

    let text = text.to_lowercase();

    if PERMANENT_PATTERNS.iter().any(|p| text.contains(p)) {
        BounceType::Permanent
    } else if TEMPORARY_PATTERNS.iter().any(|p| text.contains(p)) {
        BounceType::Temporary
    } else {
        BounceType::Unknown
    }
}
