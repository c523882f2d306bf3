//! Collected mock failures.
//!
//! Configuration, stubbing and verification errors do not abort the test
//! where they happen. They are recorded against the owning scope and
//! surfaced by `MockScope::verify` or when the scope is dropped.

use crate::result::{MockError, MockErrorKind, MockResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

/// A single reported failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFailure {
    /// Error message
    pub message: String,
    /// Error category
    pub kind: MockErrorKind,
    /// Caller location (<file:line>)
    pub location: Option<String>,
    /// Order in which the failure was reported
    pub index: usize,
}

impl MockFailure {
    /// Create a failure from an error
    #[must_use]
    pub fn new(error: &MockError, index: usize) -> Self {
        Self {
            message: error.to_string(),
            kind: error.kind(),
            location: None,
            index,
        }
    }

    /// Set the caller location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for MockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} (at {location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Every failure reported by a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFailures {
    failures: Vec<MockFailure>,
}

impl MockFailures {
    /// The failures, in reporting order
    #[must_use]
    pub fn failures(&self) -> &[MockFailure] {
        &self.failures
    }

    /// Number of failures
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether there are no failures
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> MockResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for MockFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} mock failure(s):", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "  {}. {failure}", failure.index + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for MockFailures {}

/// Shared sink the scope, its mocks and its stubs report into
#[derive(Debug, Default)]
pub(crate) struct FailureCollector {
    failures: Mutex<Vec<MockFailure>>,
}

impl FailureCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `error` at the given caller location
    pub(crate) fn report(&self, error: &MockError, location: &Location<'_>) {
        tracing::warn!(
            target: "interpose::failure",
            kind = ?error.kind(),
            location = %location,
            "{error}"
        );
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let failure = MockFailure::new(error, failures.len()).with_location(location.to_string());
        failures.push(failure);
    }

    pub(crate) fn snapshot(&self) -> Vec<MockFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn take(&self) -> MockFailures {
        let failures =
            std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner));
        MockFailures { failures }
    }
}
