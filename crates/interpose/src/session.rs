//! Mock sessions: stub rules and call history for one target.
//!
//! A session is keyed by the target plus, for methods, the receiver
//! instance (or all instances). Sessions only hold verified patterns and
//! outputs; verification happens in [`MockSession::prepare_pattern`] and
//! [`MockSession::prepare_outputs`] before a rule is added.

use crate::call_matcher::{calls_match, find_call};
use crate::config::{DuplicateStubPolicy, MockConfig};
use crate::format::print_call;
use crate::matcher::Arg;
use crate::result::{MockError, MockResult};
use crate::signature::TargetDescriptor;
use crate::value::Value;
use crate::verifier::{verify_arguments, verify_outputs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identity of a receiver instance, taken from its address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl InstanceId {
    /// Identity of the value behind `receiver`
    #[must_use]
    pub fn of<T: ?Sized>(receiver: &T) -> Self {
        Self((receiver as *const T).cast::<()>() as usize)
    }

    /// Raw address
    #[must_use]
    pub const fn addr(&self) -> usize {
        self.0
    }
}

/// Which calls a session applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// A free function
    Function,
    /// One receiver instance
    Instance(InstanceId),
    /// Every receiver without its own session
    AllInstances,
}

/// What a matching stub rule does
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Return these values
    ReturnValues(Vec<Value>),
    /// Call the real implementation
    Passthrough,
}

/// A verified pattern and its outcome
#[derive(Debug, Clone)]
pub struct StubRule {
    /// Verified argument pattern
    pub pattern: Vec<Arg>,
    /// What to do on a match
    pub outcome: Outcome,
}

/// One intercepted call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Actual arguments, in order
    pub args: Vec<Value>,
}

/// Decision for one intercepted call
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A rule matched and supplied outputs
    Stubbed(Vec<Value>),
    /// No rule matched; zero values
    Default(Vec<Value>),
    /// Run the real implementation
    Real,
}

#[derive(Debug)]
struct SessionState {
    rules: Vec<StubRule>,
    history: Vec<CallRecord>,
    enabled: bool,
}

/// Stub rules and call history for one target and key
#[derive(Debug)]
pub struct MockSession {
    target: Arc<TargetDescriptor>,
    key: SessionKey,
    default_output: Arc<[Value]>,
    duplicate_stubs: DuplicateStubPolicy,
    log_calls: bool,
    state: Mutex<SessionState>,
}

impl MockSession {
    /// Create an enabled session with no rules and no history
    #[must_use]
    pub fn new(
        target: Arc<TargetDescriptor>,
        key: SessionKey,
        default_output: Arc<[Value]>,
        config: &MockConfig,
    ) -> Self {
        Self {
            target,
            key,
            default_output,
            duplicate_stubs: config.duplicate_stubs,
            log_calls: config.log_calls,
            state: Mutex::new(SessionState {
                rules: Vec::new(),
                history: Vec::new(),
                enabled: true,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The mocked target
    #[must_use]
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// The session key
    #[must_use]
    pub const fn key(&self) -> SessionKey {
        self.key
    }

    /// Whether `config` matches the settings this session was created with
    #[must_use]
    pub fn follows(&self, config: &MockConfig) -> bool {
        self.duplicate_stubs == config.duplicate_stubs && self.log_calls == config.log_calls
    }

    /// Record the call and decide what it does.
    ///
    /// A disabled session records nothing and resolves to [`Resolution::Real`].
    /// Otherwise the first matching rule wins. Matchers run without any lock
    /// held, against a snapshot of the rules.
    pub fn intercept(&self, args: &[Value]) -> Resolution {
        let rules = {
            let mut state = self.state();
            if !state.enabled {
                return Resolution::Real;
            }
            state.history.push(CallRecord {
                args: args.to_vec(),
            });
            state.rules.clone()
        };

        let resolution = match find_call(&rules, |rule| calls_match(&rule.pattern, args, true)) {
            Some(index) => match &rules[index].outcome {
                Outcome::ReturnValues(outputs) => Resolution::Stubbed(outputs.clone()),
                Outcome::Passthrough => Resolution::Real,
            },
            None => Resolution::Default(self.default_output.to_vec()),
        };

        if self.log_calls {
            tracing::trace!(
                target: "interpose::session",
                call = %print_call(self.target.name(), args),
                ?resolution,
                "intercepted call"
            );
        }
        resolution
    }

    /// Check a pattern against the parameter types
    ///
    /// # Errors
    ///
    /// Arity or type mismatch.
    pub fn prepare_pattern(&self, pattern: Vec<Arg>) -> MockResult<Vec<Arg>> {
        verify_arguments(self.target.params(), pattern)
    }

    /// Check stub outputs against the return types
    ///
    /// # Errors
    ///
    /// Arity or type mismatch.
    pub fn prepare_outputs(&self, outputs: Vec<Value>) -> MockResult<Vec<Value>> {
        verify_outputs(self.target.returns(), outputs)
    }

    /// Zero values for the return types
    #[must_use]
    pub fn default_output(&self) -> Vec<Value> {
        self.default_output.to_vec()
    }

    /// Add a verified rule, honouring the duplicate stub policy
    pub fn add_rule(&self, rule: StubRule) {
        let mut state = self.state();
        if self.duplicate_stubs == DuplicateStubPolicy::Replace {
            let existing = state.rules.iter_mut().find(|existing| {
                existing.pattern.len() == rule.pattern.len()
                    && existing
                        .pattern
                        .iter()
                        .zip(&rule.pattern)
                        .all(|(left, right)| left.same_as(right))
            });
            if let Some(existing) = existing {
                existing.outcome = rule.outcome;
                return;
            }
        }
        state.rules.push(rule);
    }

    /// Whether some recorded call matches `expected`.
    ///
    /// `expected` must already be verified.
    ///
    /// # Errors
    ///
    /// [`MockError::UnmatchedCall`] listing every recorded call.
    pub fn verify(&self, expected: &[Arg]) -> MockResult<()> {
        let history = self.state().history.clone();
        if find_call(&history, |record| calls_match(expected, &record.args, true)).is_some() {
            return Ok(());
        }
        let name = self.target.name();
        Err(MockError::UnmatchedCall {
            expected: print_call(name, expected),
            recorded: history
                .iter()
                .map(|record| print_call(name, &record.args))
                .collect(),
        })
    }

    /// Resume interception
    pub fn enable(&self) {
        self.state().enabled = true;
    }

    /// Pause interception; calls go to the real implementation unrecorded
    pub fn disable(&self) {
        self.state().enabled = false;
    }

    /// Whether interception is active
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Recorded calls, in invocation order
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state().history.clone()
    }

    /// Number of recorded calls
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state().history.len()
    }

    /// Number of stub rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.state().rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{any, Captor};
    use crate::signature::TargetId;
    use crate::value::absent;
    use crate::verifier::default_output;
    use crate::{args, values};

    fn session_with(config: &MockConfig) -> MockSession {
        let target = Arc::new(
            TargetDescriptor::new(TargetId::from_static("app::text::base"))
                .with_param::<String>()
                .with_return::<String>(),
        );
        let defaults: Arc<[Value]> = default_output(target.returns()).into();
        MockSession::new(target, SessionKey::Function, defaults, config)
    }

    fn session() -> MockSession {
        session_with(&MockConfig::default())
    }

    fn stub(session: &MockSession, pattern: Vec<Arg>, outcome: Outcome) {
        let pattern = session.prepare_pattern(pattern).unwrap();
        session.add_rule(StubRule { pattern, outcome });
    }

    mod intercept_tests {
        use super::*;

        #[test]
        fn test_unmatched_call_returns_defaults() {
            let session = session();
            assert_eq!(
                session.intercept(&values!["x"]),
                Resolution::Default(values![String::new()])
            );
            assert_eq!(session.call_count(), 1);
        }

        #[test]
        fn test_first_matching_rule_wins() {
            let session = session();
            stub(&session, args!["a"], Outcome::ReturnValues(values!["A"]));
            stub(&session, args![any()], Outcome::ReturnValues(values!["*"]));
            stub(&session, args!["a"], Outcome::ReturnValues(values!["A2"]));

            assert_eq!(
                session.intercept(&values!["a"]),
                Resolution::Stubbed(values!["A"])
            );
            assert_eq!(
                session.intercept(&values!["b"]),
                Resolution::Stubbed(values!["*"])
            );
            assert_eq!(session.rule_count(), 3);
        }

        #[test]
        fn test_passthrough_rule_resolves_real() {
            let session = session();
            stub(&session, args!["r"], Outcome::Passthrough);
            assert_eq!(session.intercept(&values!["r"]), Resolution::Real);
            assert_eq!(session.call_count(), 1);
        }

        #[test]
        fn test_disabled_session_does_not_record() {
            let session = session();
            session.disable();
            assert!(!session.is_enabled());
            assert_eq!(session.intercept(&values!["a"]), Resolution::Real);
            assert_eq!(session.call_count(), 0);

            session.enable();
            assert!(matches!(session.intercept(&values!["a"]), Resolution::Default(_)));
            assert_eq!(session.call_count(), 1);
        }

        #[test]
        fn test_captor_in_rule_sees_call() {
            let session = session();
            let captor = Captor::<String>::new();
            stub(&session, args![captor.clone()], Outcome::ReturnValues(values!["c"]));
            session.intercept(&values!["seen"]);
            assert_eq!(captor.value().as_deref(), Some("seen"));
        }
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn test_replace_overwrites_same_pattern() {
            let config = MockConfig::builder()
                .duplicate_stubs(DuplicateStubPolicy::Replace)
                .build();
            let session = session_with(&config);
            stub(&session, args!["a"], Outcome::ReturnValues(values!["A"]));
            stub(&session, args!["a"], Outcome::ReturnValues(values!["A2"]));
            stub(&session, args![any()], Outcome::ReturnValues(values!["*"]));
            stub(&session, args![any()], Outcome::Passthrough);

            assert_eq!(session.rule_count(), 2);
            assert_eq!(
                session.intercept(&values!["a"]),
                Resolution::Stubbed(values!["A2"])
            );
            assert_eq!(session.intercept(&values!["b"]), Resolution::Real);
        }

        #[test]
        fn test_follows_compares_session_settings() {
            let session = session_with(&MockConfig::default());
            assert!(session.follows(&MockConfig::builder().fail_on_drop(false).build()));
            assert!(!session.follows(&MockConfig::builder().log_calls(false).build()));
            assert!(!session.follows(
                &MockConfig::builder()
                    .duplicate_stubs(DuplicateStubPolicy::Replace)
                    .build()
            ));
        }
    }

    mod verify_tests {
        use super::*;

        #[test]
        fn test_verify_finds_any_matching_call() {
            let session = session();
            session.intercept(&values!["a"]);
            session.intercept(&values!["z"]);

            let expected = session.prepare_pattern(args!["z"]).unwrap();
            assert!(session.verify(&expected).is_ok());
            let any_call = session.prepare_pattern(args![any()]).unwrap();
            assert!(session.verify(&any_call).is_ok());
        }

        #[test]
        fn test_verify_reports_history() {
            let session = session();
            session.intercept(&values!["a"]);
            session.intercept(&values!["z"]);

            let expected = session.prepare_pattern(args!["q"]).unwrap();
            let err = session.verify(&expected).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Expected call: base(\"q\"); but it recorded the following instead: base(\"a\"), base(\"z\")"
            );
        }

        #[test]
        fn test_verify_without_calls() {
            let err = session().verify(&args!["q"]).unwrap_err();
            assert!(err.to_string().ends_with("but no call was recorded"));
        }

        #[test]
        fn test_prepare_rejects_bad_outputs() {
            let session = session();
            assert!(session.prepare_outputs(values!["ok"]).is_ok());
            assert!(matches!(
                session.prepare_outputs(values![absent()]),
                Err(MockError::IllegalAbsent { index: 0, .. })
            ));
            assert!(matches!(
                session.prepare_outputs(values!["a", "b"]),
                Err(MockError::Arity { .. })
            ));
        }
    }

    #[test]
    fn test_instance_id_by_address() {
        let a = String::from("x");
        let b = String::from("x");
        assert_eq!(InstanceId::of(&a), InstanceId::of(&a));
        assert_ne!(InstanceId::of(&a), InstanceId::of(&b));
    }
}
