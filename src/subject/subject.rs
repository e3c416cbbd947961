//! Subject names and wildcard matching
//!
//! A subject is a dot-separated list of non-empty segments, for example
//! `sensors.kitchen.temp`. Subscription patterns may use two wildcards,
//! each of which must occupy a whole segment:
//!
//! - `*` matches exactly one segment (`sensors.*.temp`)
//! - `>` matches one or more trailing segments and must come last
//!   (`sensors.>`)
//!
//! Subjects used as publish targets or reply addresses are "concrete" and
//! may not contain wildcards.

use std::borrow::Borrow;
use std::fmt;
use std::str::Split;
use std::sync::Arc;

use crate::utils::error::{Error, Result};

const SEPARATOR: char = '.';
const SINGLE: &str = "*";
const TAIL: &str = ">";

/// A validated subject or pattern. Cloning shares the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(Arc<str>);

impl Subject {
    /// Parse a subscription pattern. Wildcard segments are allowed.
    pub fn pattern(raw: &str) -> Result<Self> {
        validate(raw, true)?;
        Ok(Self(Arc::from(raw)))
    }

    /// Parse a concrete subject. Wildcard segments are rejected.
    pub fn concrete(raw: &str) -> Result<Self> {
        validate(raw, false)?;
        Ok(Self(Arc::from(raw)))
    }

    /// The subject as written, e.g. `sensors.*.temp`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Dot-separated segments, left to right. Never yields an empty one.
    pub fn segments(&self) -> Split<'_, char> {
        self.0.split(SEPARATOR)
    }

    /// True if any segment is `*` or `>`.
    pub fn is_wildcard(&self) -> bool {
        self.segments().any(|s| s == SINGLE || s == TAIL)
    }

    /// Treat `self` as a pattern and test it against a concrete subject.
    pub fn matches(&self, subject: &str) -> bool {
        matches(self.as_str(), subject)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Subject {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str, allow_wildcards: bool) -> Result<()> {
    if raw.is_empty() {
        return Err(Error::invalid_subject(raw, "subject is empty"));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(Error::invalid_subject(raw, "subject contains whitespace"));
    }

    let mut segments = raw.split(SEPARATOR).peekable();
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            return Err(Error::invalid_subject(raw, "subject has an empty segment"));
        }
        if !segment.contains(['*', '>']) {
            continue;
        }
        if !allow_wildcards {
            return Err(Error::invalid_subject(raw, "wildcards are not allowed here"));
        }
        if segment != SINGLE && segment != TAIL {
            return Err(Error::invalid_subject(
                raw,
                "wildcard must be a whole segment",
            ));
        }
        if segment == TAIL && segments.peek().is_some() {
            return Err(Error::invalid_subject(raw, "'>' must be the last segment"));
        }
    }
    Ok(())
}

/// Segment-wise match of a concrete `subject` against `pattern`.
///
/// `>` only matches in the final pattern position, and only when at least
/// one subject segment is left for it.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_segments = pattern.split(SEPARATOR).peekable();
    let mut subject_segments = subject.split(SEPARATOR);

    while let Some(p) = pattern_segments.next() {
        match p {
            TAIL => {
                return pattern_segments.peek().is_none() && subject_segments.next().is_some();
            }
            SINGLE => {
                if subject_segments.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_segments.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    subject_segments.next().is_none()
}
