//! Interception guards.
//!
//! One guard exists per installed target. It owns the interceptor handle and
//! the target's sessions, picks the session for each intercepted call and
//! delegates to the real implementation when asked to.

use crate::interceptor::{InterceptorHandle, RawCall, Substitute};
use crate::result::MockError;
use crate::scope::ScopeId;
use crate::session::{InstanceId, MockSession, Resolution, SessionKey};
use crate::signature::{Invocable, TargetDescriptor};
use crate::value::Value;
use crate::verifier::default_output;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

/// How a guarded target reaches its real implementation
#[derive(Clone)]
pub enum GuardKind {
    /// Free function with a callable real implementation
    Function {
        /// The real implementation
        real: Arc<dyn Invocable>,
    },
    /// Method; the call site supplies the bound real implementation
    Method,
}

impl fmt::Debug for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function { .. } => f.write_str("Function"),
            Self::Method => f.write_str("Method"),
        }
    }
}

struct SessionEntry {
    session: Arc<MockSession>,
    scopes: HashSet<ScopeId>,
}

/// Per-target owner of the interceptor handle and its sessions
pub struct InterceptionGuard {
    target: Arc<TargetDescriptor>,
    kind: GuardKind,
    default_output: Arc<[Value]>,
    handle: OnceLock<Box<dyn InterceptorHandle>>,
    sessions: Mutex<HashMap<SessionKey, SessionEntry>>,
}

impl InterceptionGuard {
    /// Create a guard; the handle is attached after installation
    #[must_use]
    pub fn new(target: TargetDescriptor, kind: GuardKind) -> Self {
        let default_output: Arc<[Value]> = default_output(target.returns()).into();
        Self {
            target: Arc::new(target),
            kind,
            default_output,
            handle: OnceLock::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Substitute that forwards calls to `guard` while it is alive
    pub(crate) fn substitute(guard: &Arc<Self>) -> Substitute {
        let weak: Weak<Self> = Arc::downgrade(guard);
        let id = guard.target.id().clone();
        Arc::new(move |call: RawCall<'_>| match weak.upgrade() {
            Some(guard) => guard.handle_call(call),
            None => run_real(id.as_str(), call, None),
        })
    }

    pub(crate) fn attach(&self, handle: Box<dyn InterceptorHandle>) {
        if self.handle.set(handle).is_err() {
            tracing::warn!(
                target: "interpose::guard",
                target_id = %self.target.id(),
                "interceptor handle attached twice"
            );
        }
    }

    pub(crate) fn uninstall(&self) {
        if let Some(handle) = self.handle.get() {
            handle.uninstall();
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The guarded target
    #[must_use]
    pub fn target(&self) -> &Arc<TargetDescriptor> {
        &self.target
    }

    /// How the real implementation is reached
    #[must_use]
    pub const fn kind(&self) -> &GuardKind {
        &self.kind
    }

    /// Cached zero values of the return types
    #[must_use]
    pub fn default_output(&self) -> Arc<[Value]> {
        Arc::clone(&self.default_output)
    }

    /// The session for `key`, created with `create` on first request.
    ///
    /// `scope` becomes one of the session's users either way; the flag is
    /// true when the session was created by this call.
    pub fn session(
        &self,
        scope: ScopeId,
        key: SessionKey,
        create: impl FnOnce() -> MockSession,
    ) -> (Arc<MockSession>, bool) {
        let mut sessions = self.sessions();
        if let Some(entry) = sessions.get_mut(&key) {
            entry.scopes.insert(scope);
            return (Arc::clone(&entry.session), false);
        }
        let session = Arc::new(create());
        sessions.insert(
            key,
            SessionEntry {
                session: Arc::clone(&session),
                scopes: HashSet::from([scope]),
            },
        );
        tracing::debug!(
            target: "interpose::guard",
            target_id = %self.target.id(),
            ?key,
            "session created"
        );
        (session, true)
    }

    /// Remove `scope` from the users of the session for `key`.
    ///
    /// The last user drops the session, which is then returned.
    pub fn release_session(&self, scope: ScopeId, key: SessionKey) -> Option<Arc<MockSession>> {
        let mut sessions = self.sessions();
        let entry = sessions.get_mut(&key)?;
        entry.scopes.remove(&scope);
        if !entry.scopes.is_empty() {
            return None;
        }
        let removed = sessions.remove(&key).map(|entry| entry.session);
        tracing::debug!(
            target: "interpose::guard",
            target_id = %self.target.id(),
            ?key,
            "session removed"
        );
        removed
    }

    /// Number of live sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    fn resolve_session(&self, receiver: Option<InstanceId>) -> Option<Arc<MockSession>> {
        let sessions = self.sessions();
        let entry = match (&self.kind, receiver) {
            (GuardKind::Function { .. }, _) => sessions.get(&SessionKey::Function),
            (GuardKind::Method, Some(instance)) => sessions
                .get(&SessionKey::Instance(instance))
                .or_else(|| sessions.get(&SessionKey::AllInstances)),
            (GuardKind::Method, None) => sessions.get(&SessionKey::AllInstances),
        };
        entry.map(|entry| Arc::clone(&entry.session))
    }

    /// Serve one intercepted call
    pub fn handle_call(&self, call: RawCall<'_>) -> Vec<Value> {
        let Some(session) = self.resolve_session(call.receiver) else {
            return self.delegate(call);
        };
        match session.intercept(&call.args) {
            Resolution::Stubbed(outputs) | Resolution::Default(outputs) => outputs,
            Resolution::Real => self.delegate(call),
        }
    }

    fn delegate(&self, call: RawCall<'_>) -> Vec<Value> {
        let _suppressed = self
            .handle
            .get()
            .map(|handle| Suppressed::new(handle.as_ref()));
        let real = match &self.kind {
            GuardKind::Function { real } => Some(real.as_ref()),
            GuardKind::Method => None,
        };
        run_real(self.target.id().as_str(), call, real)
    }
}

impl fmt::Debug for InterceptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionGuard")
            .field("target", &self.target.id())
            .field("kind", &self.kind)
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

/// Keeps interception off on this thread until dropped
struct Suppressed<'a> {
    handle: &'a dyn InterceptorHandle,
}

impl<'a> Suppressed<'a> {
    fn new(handle: &'a dyn InterceptorHandle) -> Self {
        handle.disable();
        Self { handle }
    }
}

impl Drop for Suppressed<'_> {
    fn drop(&mut self) {
        self.handle.enable();
    }
}

fn run_real(target: &str, call: RawCall<'_>, fallback: Option<&dyn Invocable>) -> Vec<Value> {
    match (call.real, fallback) {
        (Some(real), _) => real(&call.args),
        (None, Some(invocable)) => invocable.invoke(&call.args),
        (None, None) => {
            let err = MockError::invariant(format!(
                "call to {target} has neither a session nor a real implementation"
            ));
            tracing::error!(target: "interpose::guard", "{err}");
            panic!("{err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::interceptor::{Interceptor, SeamInterceptor};
    use crate::session::{Outcome, StubRule};
    use crate::signature::{FnInvocable, TargetId};
    use crate::{args, values};

    fn function_guard(id: &'static str) -> Arc<InterceptionGuard> {
        let descriptor = TargetDescriptor::new(TargetId::from_static(id))
            .with_param::<i32>()
            .with_return::<i32>();
        let real: Arc<dyn Invocable> = Arc::new(FnInvocable::new(descriptor.clone(), |args| {
            values![args[0].cloned::<i32>().unwrap_or_default() + 100]
        }));
        Arc::new(InterceptionGuard::new(descriptor, GuardKind::Function { real }))
    }

    fn method_guard(id: &'static str) -> Arc<InterceptionGuard> {
        let descriptor = TargetDescriptor::new(TargetId::from_static(id))
            .with_return::<String>()
            .with_receiver::<String>();
        Arc::new(InterceptionGuard::new(descriptor, GuardKind::Method))
    }

    fn open(guard: &InterceptionGuard, key: SessionKey) -> Arc<MockSession> {
        open_for(guard, ScopeId::new(), key)
    }

    fn open_for(guard: &InterceptionGuard, scope: ScopeId, key: SessionKey) -> Arc<MockSession> {
        let target = Arc::clone(guard.target());
        let defaults = guard.default_output();
        guard
            .session(scope, key, || {
                MockSession::new(target, key, defaults, &MockConfig::default())
            })
            .0
    }

    fn call(args: Vec<Value>) -> RawCall<'static> {
        RawCall {
            receiver: None,
            args,
            real: None,
        }
    }

    mod function_tests {
        use super::*;

        #[test]
        fn test_no_session_delegates_without_recording() {
            let guard = function_guard("g::none");
            assert_eq!(guard.handle_call(call(values![1_i32])), values![101_i32]);
            assert_eq!(guard.session_count(), 0);
        }

        #[test]
        fn test_session_defaults_and_records() {
            let guard = function_guard("g::defaults");
            let session = open(&guard, SessionKey::Function);
            assert_eq!(guard.handle_call(call(values![5_i32])), values![0_i32]);
            assert_eq!(session.call_count(), 1);
        }

        #[test]
        fn test_passthrough_uses_invocable() {
            let guard = function_guard("g::pass");
            let session = open(&guard, SessionKey::Function);
            let pattern = session.prepare_pattern(args![2_i32]).unwrap();
            session.add_rule(StubRule {
                pattern,
                outcome: Outcome::Passthrough,
            });
            assert_eq!(guard.handle_call(call(values![2_i32])), values![102_i32]);
        }

        #[test]
        fn test_session_reused_per_key() {
            let guard = function_guard("g::reuse");
            let scope = ScopeId::new();
            let first = open_for(&guard, scope, SessionKey::Function);
            let second = open_for(&guard, scope, SessionKey::Function);
            assert!(Arc::ptr_eq(&first, &second));
            assert!(guard.release_session(scope, SessionKey::Function).is_some());
            assert_eq!(guard.session_count(), 0);
        }

        #[test]
        fn test_session_outlives_all_but_last_user() {
            let guard = function_guard("g::shared");
            let (creator, reuser) = (ScopeId::new(), ScopeId::new());
            let session = open_for(&guard, creator, SessionKey::Function);
            let _ = open_for(&guard, reuser, SessionKey::Function);
            session.add_rule(StubRule {
                pattern: args![1_i32],
                outcome: Outcome::ReturnValues(values![7_i32]),
            });

            assert!(guard.release_session(creator, SessionKey::Function).is_none());
            assert_eq!(guard.session_count(), 1);
            assert_eq!(guard.handle_call(call(values![1_i32])), values![7_i32]);
            assert_eq!(session.call_count(), 1);

            assert!(guard.release_session(reuser, SessionKey::Function).is_some());
            assert_eq!(guard.handle_call(call(values![1_i32])), values![101_i32]);
        }

        #[test]
        fn test_release_by_stranger_keeps_session() {
            let guard = function_guard("g::stranger");
            let _ = open(&guard, SessionKey::Function);
            assert!(guard.release_session(ScopeId::new(), SessionKey::Function).is_none());
            assert_eq!(guard.session_count(), 1);
        }
    }

    mod method_tests {
        use super::*;

        #[test]
        fn test_instance_session_beats_wildcard() {
            let guard = method_guard("g::Greeter::greet");
            let mine = String::from("mine");
            let other = String::from("other");

            let instance = open(&guard, SessionKey::Instance(InstanceId::of(&mine)));
            let wildcard = open(&guard, SessionKey::AllInstances);
            for (session, text) in [(&instance, "instance"), (&wildcard, "wildcard")] {
                session.add_rule(StubRule {
                    pattern: Vec::new(),
                    outcome: Outcome::ReturnValues(values![text]),
                });
            }

            let mut unused = |_: &[Value]| values!["real"];
            let out = guard.handle_call(RawCall {
                receiver: Some(InstanceId::of(&mine)),
                args: Vec::new(),
                real: Some(&mut unused),
            });
            assert_eq!(out, values!["instance"]);

            let out = guard.handle_call(RawCall {
                receiver: Some(InstanceId::of(&other)),
                args: Vec::new(),
                real: Some(&mut unused),
            });
            assert_eq!(out, values!["wildcard"]);
        }

        #[test]
        fn test_unmocked_instance_uses_bound_real() {
            let guard = method_guard("g::Greeter::bound");
            let mut real = |_: &[Value]| values!["real"];
            let out = guard.handle_call(RawCall {
                receiver: Some(InstanceId::of(&0_u8)),
                args: Vec::new(),
                real: Some(&mut real),
            });
            assert_eq!(out, values!["real"]);
        }

        #[test]
        #[should_panic(expected = "neither a session nor a real implementation")]
        fn test_method_without_real_is_fatal() {
            let guard = method_guard("g::Greeter::fatal");
            let _ = guard.handle_call(call(Vec::new()));
        }
    }

    mod suppression_tests {
        use super::*;

        #[test]
        fn test_real_runs_with_interception_suppressed() {
            let seam = SeamInterceptor::new();
            let guard = function_guard("g::recursive");
            let handle = seam
                .install(guard.target(), InterceptionGuard::substitute(&guard))
                .unwrap();
            guard.attach(handle);
            let session = open(&guard, SessionKey::Function);
            session.add_rule(StubRule {
                pattern: session.prepare_pattern(args![crate::any()]).unwrap(),
                outcome: Outcome::Passthrough,
            });

            let inner = seam.clone();
            let mut real = move |args: &[Value]| {
                let nested = inner.dispatch("g::recursive", None, || args.to_vec(), &mut |_| {
                    values![-1_i32]
                });
                values![i32::from(nested.is_none())]
            };
            let out = seam.dispatch("g::recursive", None, || values![3_i32], &mut real);
            assert_eq!(out, Some(values![1_i32]));
            assert_eq!(session.call_count(), 1);

            guard.uninstall();
            assert_eq!(seam.installed(), 0);
        }
    }
}
