//! Call interception.
//!
//! An [`Interceptor`] routes calls of an installed target to a substitute.
//! The only implementation shipped is [`SeamInterceptor`]: code generated by
//! `#[mockable]` asks the seam table for a substitute before running its own
//! body, so nothing is patched at runtime.
//!
//! ## Suppression
//!
//! [`InterceptorHandle::disable`] and [`InterceptorHandle::enable`] nest and
//! apply to the calling thread only. A real implementation that calls its
//! own target recursively therefore reaches the real body, while other
//! threads keep being intercepted.

use crate::result::{MockError, MockResult};
use crate::session::InstanceId;
use crate::signature::{TargetDescriptor, TargetId};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// The real implementation of an intercepted call, bound to its receiver
pub type RealCall<'a> = &'a mut dyn FnMut(&[Value]) -> Vec<Value>;

/// One call as seen by a substitute
pub struct RawCall<'a> {
    /// Receiver identity for method calls
    pub receiver: Option<InstanceId>,
    /// Arguments, without the receiver
    pub args: Vec<Value>,
    /// The real implementation, when the call site can provide it
    pub real: Option<RealCall<'a>>,
}

impl fmt::Debug for RawCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCall")
            .field("receiver", &self.receiver)
            .field("args", &self.args)
            .field("real", &self.real.is_some())
            .finish()
    }
}

/// Replacement behaviour for an installed target
pub type Substitute = Arc<dyn Fn(RawCall<'_>) -> Vec<Value> + Send + Sync>;

/// Installs substitutes for targets
pub trait Interceptor: Send + Sync {
    /// Route calls of `target` to `substitute`
    ///
    /// # Errors
    ///
    /// Returns an error if `target` already has a substitute installed.
    fn install(
        &self,
        target: &TargetDescriptor,
        substitute: Substitute,
    ) -> MockResult<Box<dyn InterceptorHandle>>;
}

/// Control over one installed substitute
pub trait InterceptorHandle: Send + Sync {
    /// Let calls on this thread reach the real implementation
    fn disable(&self);
    /// Undo one `disable`
    fn enable(&self);
    /// Remove the substitute; later calls are not intercepted
    fn uninstall(&self);
}

#[derive(Default)]
struct SeamTable {
    routes: RwLock<HashMap<TargetId, Substitute>>,
    installed: AtomicUsize,
}

thread_local! {
    // (table address, target) -> nesting depth
    static SUPPRESSED: RefCell<HashMap<usize, HashMap<TargetId, usize>>> =
        RefCell::new(HashMap::new());
}

/// Interceptor backed by a table that `#[mockable]` seams consult
#[derive(Clone, Default)]
pub struct SeamInterceptor {
    table: Arc<SeamTable>,
}

impl SeamInterceptor {
    /// Create an empty, private seam table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide seam table used by generated code
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<SeamInterceptor> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    fn table_key(&self) -> usize {
        Arc::as_ptr(&self.table) as usize
    }

    /// Number of installed substitutes
    #[must_use]
    pub fn installed(&self) -> usize {
        self.table.installed.load(Ordering::Acquire)
    }

    /// Whether `target` has a substitute installed
    #[must_use]
    pub fn is_installed(&self, target: &str) -> bool {
        self.table
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(target)
    }

    fn is_suppressed(&self, target: &str) -> bool {
        let key = self.table_key();
        SUPPRESSED.with(|suppressed| {
            suppressed
                .borrow()
                .get(&key)
                .is_some_and(|targets| targets.contains_key(target))
        })
    }

    /// Route a call through the installed substitute, if any.
    ///
    /// `args` is only evaluated when a substitute runs. Returns `None` when
    /// the caller should run its own body.
    pub fn dispatch(
        &self,
        target: &str,
        receiver: Option<InstanceId>,
        args: impl FnOnce() -> Vec<Value>,
        real: RealCall<'_>,
    ) -> Option<Vec<Value>> {
        if self.installed() == 0 || self.is_suppressed(target) {
            return None;
        }
        let substitute = self
            .table
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()?;
        Some(substitute(RawCall {
            receiver,
            args: args(),
            real: Some(real),
        }))
    }
}

impl fmt::Debug for SeamInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeamInterceptor")
            .field("installed", &self.installed())
            .finish()
    }
}

impl Interceptor for SeamInterceptor {
    fn install(
        &self,
        target: &TargetDescriptor,
        substitute: Substitute,
    ) -> MockResult<Box<dyn InterceptorHandle>> {
        let mut routes = self
            .table
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(target.id().as_str()) {
            return Err(MockError::configuration(format!(
                "{} already has an interceptor installed",
                target.id()
            )));
        }
        routes.insert(target.id().clone(), substitute);
        self.table.installed.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(target: "interpose::seam", target_id = %target.id(), "installed");

        Ok(Box::new(SeamHandle {
            table: Arc::clone(&self.table),
            target: target.id().clone(),
            live: AtomicBool::new(true),
        }))
    }
}

struct SeamHandle {
    table: Arc<SeamTable>,
    target: TargetId,
    live: AtomicBool,
}

impl SeamHandle {
    fn table_key(&self) -> usize {
        Arc::as_ptr(&self.table) as usize
    }
}

impl InterceptorHandle for SeamHandle {
    fn disable(&self) {
        let key = self.table_key();
        SUPPRESSED.with(|suppressed| {
            *suppressed
                .borrow_mut()
                .entry(key)
                .or_default()
                .entry(self.target.clone())
                .or_insert(0) += 1;
        });
    }

    fn enable(&self) {
        let key = self.table_key();
        SUPPRESSED.with(|suppressed| {
            let mut suppressed = suppressed.borrow_mut();
            let Some(targets) = suppressed.get_mut(&key) else {
                return;
            };
            if let Some(depth) = targets.get_mut(self.target.as_str()) {
                *depth -= 1;
                if *depth == 0 {
                    targets.remove(self.target.as_str());
                }
            }
            if targets.is_empty() {
                suppressed.remove(&key);
            }
        });
    }

    fn uninstall(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let removed = self
            .table
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.target.as_str());
        if removed.is_some() {
            self.table.installed.fetch_sub(1, Ordering::AcqRel);
        }
        tracing::debug!(target: "interpose::seam", target_id = %self.target, "uninstalled");
    }
}

impl Drop for SeamHandle {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Runtime support for code generated by `#[mockable]`.
#[doc(hidden)]
pub mod seam {
    use super::{RealCall, SeamInterceptor};
    use crate::result::MockError;
    use crate::session::InstanceId;
    use crate::value::{Reflect, Value};

    /// Consult the global seam table
    pub fn intercept(
        target: &'static str,
        receiver: Option<InstanceId>,
        args: impl FnOnce() -> Vec<Value>,
        real: RealCall<'_>,
    ) -> Option<Vec<Value>> {
        SeamInterceptor::global().dispatch(target, receiver, args, real)
    }

    /// Path of a function item
    pub fn id_of<F>(_item: &F) -> &'static str {
        std::any::type_name::<F>()
    }

    /// Argument `index` as `T`
    ///
    /// # Panics
    ///
    /// Panics when the argument list does not match the generated signature.
    pub fn arg<T: Reflect>(target: &str, args: &[Value], index: usize) -> T {
        args.get(index)
            .and_then(Value::cloned::<T>)
            .unwrap_or_else(|| {
                mismatch(
                    target,
                    format!(
                        "argument {index} is {:?}, expected {}",
                        args.get(index),
                        std::any::type_name::<T>()
                    ),
                )
            })
    }

    /// Next output as `T`
    ///
    /// # Panics
    ///
    /// Panics when the outputs do not match the generated signature.
    pub fn output<T: Reflect>(target: &str, outputs: &mut std::vec::IntoIter<Value>) -> T {
        let next = outputs.next();
        next.as_ref()
            .and_then(Value::cloned::<T>)
            .unwrap_or_else(|| {
                mismatch(
                    target,
                    format!(
                        "output is {next:?}, expected {}",
                        std::any::type_name::<T>()
                    ),
                )
            })
    }

    fn mismatch(target: &str, detail: String) -> ! {
        let err = MockError::invariant(format!("{target}: {detail}"));
        tracing::error!(target: "interpose::seam", "{err}");
        panic!("{err}")
    }
}
