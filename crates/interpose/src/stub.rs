//! Stub builder.
//!
//! `mock.with(args)` starts a [`Stub`]; exactly one of [`Stub::returns`],
//! [`Stub::returns_defaults`] or [`Stub::call_real_method`] completes it.
//! Errors are reported to the owning scope rather than returned.

use crate::failure::FailureCollector;
use crate::matcher::Arg;
use crate::result::{MockError, MockResult};
use crate::session::{MockSession, Outcome, StubRule};
use crate::value::Value;
use std::panic::Location;
use std::sync::Arc;

#[derive(Debug)]
enum StubState {
    Pending(Vec<Arg>),
    Completed,
}

/// A pending stub rule for one argument pattern
#[derive(Debug)]
#[must_use = "a stub does nothing until returns, returns_defaults or call_real_method is called"]
pub struct Stub {
    session: Option<Arc<MockSession>>,
    state: StubState,
    failures: Arc<FailureCollector>,
}

impl Stub {
    /// Verify `pattern` and start a stub; failures leave the stub inert
    #[track_caller]
    pub(crate) fn new(
        session: Option<Arc<MockSession>>,
        pattern: Vec<Arg>,
        failures: Arc<FailureCollector>,
    ) -> Self {
        let (session, pattern) = match session {
            Some(session) => match session.prepare_pattern(pattern) {
                Ok(pattern) => (Some(session), pattern),
                Err(err) => {
                    failures.report(&err, Location::caller());
                    (None, Vec::new())
                }
            },
            None => (None, Vec::new()),
        };
        Self {
            session,
            state: StubState::Pending(pattern),
            failures,
        }
    }

    /// Whether this stub is bound to nothing because of an earlier failure
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.session.is_none()
    }

    /// Whether the stub has been completed
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.state, StubState::Completed)
    }

    /// Return `outputs` for matching calls
    #[track_caller]
    pub fn returns(&mut self, outputs: Vec<Value>) -> &mut Self {
        let location = Location::caller();
        self.complete(location, |session| {
            session.prepare_outputs(outputs).map(Outcome::ReturnValues)
        });
        self
    }

    /// Return the zero values of the return types for matching calls
    #[track_caller]
    pub fn returns_defaults(&mut self) -> &mut Self {
        let location = Location::caller();
        self.complete(location, |session| {
            Ok(Outcome::ReturnValues(session.default_output()))
        });
        self
    }

    /// Run the real implementation for matching calls
    #[track_caller]
    pub fn call_real_method(&mut self) -> &mut Self {
        let location = Location::caller();
        self.complete(location, |_| Ok(Outcome::Passthrough));
        self
    }

    fn complete(
        &mut self,
        location: &Location<'_>,
        outcome: impl FnOnce(&MockSession) -> MockResult<Outcome>,
    ) {
        let Some(session) = &self.session else {
            return;
        };
        let pattern = match &mut self.state {
            StubState::Completed => {
                self.failures.report(&MockError::AlreadyCompleted, location);
                return;
            }
            StubState::Pending(pattern) => pattern,
        };
        match outcome(&**session) {
            Ok(outcome) => {
                session.add_rule(StubRule {
                    pattern: std::mem::take(pattern),
                    outcome,
                });
                self.state = StubState::Completed;
            }
            Err(err) => self.failures.report(&err, location),
        }
    }
}

impl Drop for Stub {
    fn drop(&mut self) {
        if self.session.is_some()
            && matches!(self.state, StubState::Pending(_))
            && !std::thread::panicking()
        {
            let target = self
                .session
                .as_ref()
                .map_or("", |session| session.target().name());
            tracing::warn!(
                target: "interpose::stub",
                target_name = target,
                "stub dropped without returns, returns_defaults or call_real_method"
            );
        }
    }
}
