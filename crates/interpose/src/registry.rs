//! Mock registry: one interception guard per target.
//!
//! The registry installs a target's interceptor on the first mock request
//! and uninstalls it when the last scope using it releases the target.
//! Lock order is registry table, then interceptor table; call dispatch
//! never takes the registry lock.

use crate::guard::{GuardKind, InterceptionGuard};
use crate::interceptor::{Interceptor, SeamInterceptor};
use crate::result::MockResult;
use crate::scope::ScopeId;
use crate::signature::{TargetDescriptor, TargetId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

struct RegistryEntry {
    guard: Arc<InterceptionGuard>,
    scopes: HashSet<ScopeId>,
}

/// Process-scoped table of installed guards
pub struct MockRegistry {
    interceptor: Arc<dyn Interceptor>,
    entries: Mutex<HashMap<TargetId, RegistryEntry>>,
}

impl MockRegistry {
    /// Create a registry that installs through `interceptor`
    #[must_use]
    pub fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        Self {
            interceptor,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The registry backing `#[mockable]` seams
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<MockRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let interceptor: Arc<dyn Interceptor> = Arc::new(SeamInterceptor::global().clone());
            Arc::new(Self::new(interceptor))
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TargetId, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The guard for `descriptor`, installing it on first request.
    ///
    /// A target that is already installed is never reinstalled; `scope` is
    /// only added to its users.
    ///
    /// # Errors
    ///
    /// Returns an error if the interceptor refuses the installation.
    pub fn guard_for(
        &self,
        scope: ScopeId,
        descriptor: &TargetDescriptor,
        kind: GuardKind,
    ) -> MockResult<Arc<InterceptionGuard>> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(descriptor.id()) {
            entry.scopes.insert(scope);
            return Ok(Arc::clone(&entry.guard));
        }

        let guard = Arc::new(InterceptionGuard::new(descriptor.clone(), kind));
        let handle = self
            .interceptor
            .install(descriptor, InterceptionGuard::substitute(&guard))?;
        guard.attach(handle);
        tracing::debug!(
            target: "interpose::registry",
            target_id = %descriptor.id(),
            %scope,
            "guard installed"
        );
        entries.insert(
            descriptor.id().clone(),
            RegistryEntry {
                guard: Arc::clone(&guard),
                scopes: HashSet::from([scope]),
            },
        );
        Ok(guard)
    }

    /// Remove `scope` from the users of `target`; the last user uninstalls
    pub fn release(&self, scope: ScopeId, target: &TargetId) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(target) else {
            return;
        };
        entry.scopes.remove(&scope);
        if !entry.scopes.is_empty() {
            return;
        }
        if let Some(entry) = entries.remove(target) {
            entry.guard.uninstall();
            tracing::debug!(
                target: "interpose::registry",
                target_id = %target,
                "guard uninstalled"
            );
        }
    }

    /// Whether `target` currently has a guard
    #[must_use]
    pub fn is_installed(&self, target: &str) -> bool {
        self.entries().contains_key(target)
    }

    /// Number of installed guards
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no guard is installed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRegistry")
            .field("installed", &self.len())
            .finish_non_exhaustive()
    }
}
