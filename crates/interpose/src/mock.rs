//! Mock handles returned by `MockScope`.

use crate::failure::FailureCollector;
use crate::matcher::Arg;
use crate::result::{MockError, MockResult};
use crate::session::{CallRecord, MockSession};
use crate::stub::Stub;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Handle on one mock session.
///
/// A mock whose creation failed is inert: every operation is a silent no-op
/// and the failure has already been reported to the scope.
///
/// ## Example
///
/// ```ignore
/// let scope = MockScope::new();
/// let mock = scope.mock_function(&base_target());
/// mock.with(args!["a"]).returns(values!["A"]);
/// assert_eq!(base("a"), "A");
/// mock.verify(args!["a"]);
/// ```
#[derive(Clone)]
pub struct Mock {
    session: Option<Arc<MockSession>>,
    failures: Arc<FailureCollector>,
}

impl Mock {
    pub(crate) const fn new(
        session: Option<Arc<MockSession>>,
        failures: Arc<FailureCollector>,
    ) -> Self {
        Self { session, failures }
    }

    /// Start a stub for calls matching `pattern`
    #[track_caller]
    pub fn with(&self, pattern: Vec<Arg>) -> Stub {
        Stub::new(self.session.clone(), pattern, Arc::clone(&self.failures))
    }

    /// Report a failure unless some recorded call matches `expected`
    #[track_caller]
    pub fn verify(&self, expected: Vec<Arg>) {
        if self.session.is_none() {
            return;
        }
        if let Err(err) = self.try_verify(expected) {
            self.failures.report(&err, Location::caller());
        }
    }

    /// Check that some recorded call matches `expected`
    ///
    /// # Errors
    ///
    /// Arity or type mismatch in `expected`, no matching call, or an inert
    /// mock.
    pub fn try_verify(&self, expected: Vec<Arg>) -> MockResult<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| MockError::configuration("the mock was never created"))?;
        let expected = session.prepare_pattern(expected)?;
        session.verify(&expected)
    }

    /// Resume interception
    pub fn enable(&self) {
        if let Some(session) = &self.session {
            session.enable();
        }
    }

    /// Pause interception; calls reach the real implementation unrecorded
    pub fn disable(&self) {
        if let Some(session) = &self.session {
            session.disable();
        }
    }

    /// Whether interception is active
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.is_enabled())
    }

    /// Recorded calls, in invocation order
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.session
            .as_ref()
            .map(|session| session.calls())
            .unwrap_or_default()
    }

    /// Number of recorded calls
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.call_count())
    }

    /// Whether creation failed
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.session.is_none()
    }
}

impl fmt::Debug for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => f
                .debug_struct("Mock")
                .field("target", &session.target().id())
                .field("key", &session.key())
                .field("calls", &session.call_count())
                .finish(),
            None => f.write_str("Mock(inert)"),
        }
    }
}
