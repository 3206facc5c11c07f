//! Labels candidate strings against a membership structure, e.g. to tell
//! whether a new password has been seen before.

use crate::set_membership::SetMembership;
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Empty or not a string.
    Invalid,
    /// Reported present by the filter. May be a false positive.
    AlreadyUsed,
    Unique,
}

impl Classification {
    pub const fn as_str(self) -> &'static str {
        match self {
            Classification::Invalid => "non valid",
            Classification::AlreadyUsed => "already used",
            Classification::Unique => "unique",
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify<S>(filter: &S, candidate: Option<&str>) -> Classification
where
    S: SetMembership<str> + ?Sized,
{
    match candidate {
        None | Some("") => Classification::Invalid,
        Some(candidate) if filter.check(candidate) => Classification::AlreadyUsed,
        Some(_) => Classification::Unique,
    }
}

/// Classifies arbitrary JSON values in order. Strings are keyed by their
/// text, anything else by its JSON rendering.
pub fn classify_values<S>(filter: &S, candidates: &[Value]) -> Vec<(String, Classification)>
where
    S: SetMembership<str> + ?Sized,
{
    candidates
        .iter()
        .map(|value| match value {
            Value::String(s) => (s.clone(), classify(filter, Some(s.as_str()))),
            other => (other.to_string(), classify(filter, None)),
        })
        .collect()
}
