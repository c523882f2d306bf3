//! Mock scopes: per-test ownership of mocks, failures and teardown.
//!
//! A [`MockScope`] creates mocks, collects every failure they report and,
//! when dropped, releases its sessions and targets. A session shared with
//! another live scope stays in place until that scope is dropped as well.
//! Drop also runs during unwinding, so a failing test never leaves an interceptor
//! installed.
//!
//! Two scopes that mock the same target and key share one session. The
//! session keeps the [`MockConfig`] of the scope that created it; a later
//! scope with different `duplicate_stubs` or `log_calls` settings gets a
//! warning trace event and the creator's settings.
//!
//! ## Example
//!
//! ```ignore
//! #[test]
//! fn test_base_is_stubbed() {
//!     let scope = MockScope::new();
//!     let mock = scope.mock_function(&base_target());
//!     mock.with(args!["a"]).returns(values!["A"]);
//!     mock.with(args![any()]).returns(values!["default"]);
//!
//!     assert_eq!(base("a"), "A");
//!     assert_eq!(base("z"), "default");
//!     mock.verify(args!["a"]);
//! }
//! ```

use crate::config::MockConfig;
use crate::failure::{FailureCollector, MockFailure, MockFailures};
use crate::guard::{GuardKind, InterceptionGuard};
use crate::mock::Mock;
use crate::registry::MockRegistry;
use crate::result::MockError;
use crate::session::{InstanceId, MockSession, SessionKey};
use crate::signature::{FunctionTarget, MethodTarget, TargetDescriptor, TargetId};
use std::any::TypeId;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Identity of a [`MockScope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Create a fresh identity
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct Owned {
    sessions: Vec<(Arc<InterceptionGuard>, SessionKey)>,
    targets: Vec<TargetId>,
}

/// Owner of the mocks created for one test
pub struct MockScope {
    id: ScopeId,
    registry: Arc<MockRegistry>,
    config: MockConfig,
    failures: Arc<FailureCollector>,
    owned: Mutex<Owned>,
}

impl MockScope {
    /// Scope on the global registry, configured from the environment.
    ///
    /// An invalid environment falls back to the default configuration
    /// with a warning.
    #[must_use]
    pub fn new() -> Self {
        let config = MockConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(target: "interpose::scope", "{err}; using default configuration");
            MockConfig::default()
        });
        Self::builder().config(config).build()
    }

    /// Create a new builder
    #[must_use]
    pub fn builder() -> MockScopeBuilder {
        MockScopeBuilder::default()
    }

    /// Scope identity
    #[must_use]
    pub const fn id(&self) -> ScopeId {
        self.id
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MockConfig {
        &self.config
    }

    /// The registry this scope installs into
    #[must_use]
    pub fn registry(&self) -> &Arc<MockRegistry> {
        &self.registry
    }

    /// Mock a free function
    #[track_caller]
    pub fn mock_function(&self, target: &FunctionTarget) -> Mock {
        let location = Location::caller();
        let descriptor = target.descriptor();
        if descriptor.receiver().is_some() {
            return self.inert(
                &MockError::configuration(format!(
                    "{} is not callable as a function",
                    descriptor.id()
                )),
                location,
            );
        }
        let kind = GuardKind::Function {
            real: Arc::clone(target.real()),
        };
        self.open(descriptor, kind, SessionKey::Function, location)
    }

    /// Mock `method` on `instance` only
    #[track_caller]
    pub fn mock_method<T: 'static>(
        &self,
        instance: Option<&T>,
        method: Option<&MethodTarget>,
    ) -> Mock {
        let location = Location::caller();
        match Self::check_method(instance, method) {
            Ok((instance, method)) => self.open(
                method.descriptor(),
                GuardKind::Method,
                SessionKey::Instance(InstanceId::of(instance)),
                location,
            ),
            Err(err) => self.inert(&err, location),
        }
    }

    /// Mock `method` on every instance of `T` without its own session
    #[track_caller]
    pub fn mock_method_for_all<T: 'static>(
        &self,
        instance: Option<&T>,
        method: Option<&MethodTarget>,
    ) -> Mock {
        let location = Location::caller();
        match Self::check_method(instance, method) {
            Ok((_, method)) => self.open(
                method.descriptor(),
                GuardKind::Method,
                SessionKey::AllInstances,
                location,
            ),
            Err(err) => self.inert(&err, location),
        }
    }

    fn check_method<'a, T: 'static>(
        instance: Option<&'a T>,
        method: Option<&'a MethodTarget>,
    ) -> Result<(&'a T, &'a MethodTarget), MockError> {
        let instance =
            instance.ok_or_else(|| MockError::configuration("mock instance is absent"))?;
        let method =
            method.ok_or_else(|| MockError::configuration("method reference is absent"))?;
        match method.receiver() {
            Some(receiver) if receiver.type_id() == TypeId::of::<T>() => Ok((instance, method)),
            _ => Err(MockError::configuration(format!(
                "{} does not have a method called {}",
                std::any::type_name::<T>(),
                method.descriptor().name()
            ))),
        }
    }

    fn open(
        &self,
        descriptor: &TargetDescriptor,
        kind: GuardKind,
        key: SessionKey,
        location: &Location<'_>,
    ) -> Mock {
        let guard = match self.registry.guard_for(self.id, descriptor, kind) {
            Ok(guard) => guard,
            Err(err) => return self.inert(&err, location),
        };
        let (session, created) = guard.session(self.id, key, || {
            MockSession::new(
                Arc::clone(guard.target()),
                key,
                guard.default_output(),
                &self.config,
            )
        });
        if !created && !session.follows(&self.config) {
            tracing::warn!(
                target: "interpose::scope",
                scope = %self.id,
                target_id = %descriptor.id(),
                ?key,
                "reused session keeps the configuration of the scope that created it"
            );
        }

        let mut owned = self.owned.lock().unwrap_or_else(PoisonError::into_inner);
        if !owned.targets.contains(descriptor.id()) {
            owned.targets.push(descriptor.id().clone());
        }
        if !owned
            .sessions
            .iter()
            .any(|(known, known_key)| Arc::ptr_eq(known, &guard) && *known_key == key)
        {
            owned.sessions.push((guard, key));
        }
        Mock::new(Some(session), Arc::clone(&self.failures))
    }

    fn inert(&self, err: &MockError, location: &Location<'_>) -> Mock {
        self.failures.report(err, location);
        Mock::new(None, Arc::clone(&self.failures))
    }

    /// Failures reported so far
    #[must_use]
    pub fn failures(&self) -> Vec<MockFailure> {
        self.failures.snapshot()
    }

    /// Number of failures reported so far
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Drain the reported failures
    #[must_use]
    pub fn take_failures(&self) -> MockFailures {
        self.failures.take()
    }

    /// Drain the reported failures, returning them as an error if any exist
    ///
    /// # Errors
    ///
    /// Returns every failure reported since the last drain.
    pub fn verify(&self) -> Result<(), MockFailures> {
        let failures = self.failures.take();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }

    fn teardown(&self) {
        let owned = std::mem::take(&mut *self.owned.lock().unwrap_or_else(PoisonError::into_inner));
        for (guard, key) in owned.sessions {
            guard.release_session(self.id, key);
        }
        for target in &owned.targets {
            self.registry.release(self.id, target);
        }
        tracing::debug!(
            target: "interpose::scope",
            scope = %self.id,
            targets = owned.targets.len(),
            "scope torn down"
        );
    }
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockScope")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("failures", &self.failures.len())
            .finish_non_exhaustive()
    }
}

impl Drop for MockScope {
    fn drop(&mut self) {
        self.teardown();
        if !self.config.fail_on_drop || std::thread::panicking() {
            return;
        }
        let failures = self.failures.take();
        if !failures.is_empty() {
            panic!("{failures}");
        }
    }
}

/// Builder for `MockScope`
#[derive(Debug, Default)]
pub struct MockScopeBuilder {
    registry: Option<Arc<MockRegistry>>,
    config: MockConfig,
}

impl MockScopeBuilder {
    /// Install into `registry` instead of the global one
    #[must_use]
    pub fn registry(mut self, registry: Arc<MockRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `config`
    #[must_use]
    pub fn config(mut self, config: MockConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scope
    #[must_use]
    pub fn build(self) -> MockScope {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::clone(MockRegistry::global()));
        MockScope {
            id: ScopeId::new(),
            registry,
            config: self.config,
            failures: Arc::new(FailureCollector::new()),
            owned: Mutex::new(Owned::default()),
        }
    }
}
