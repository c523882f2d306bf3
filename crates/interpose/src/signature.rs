//! Mockable targets and their signatures.
//!
//! A target is identified by a [`TargetId`] and described by a
//! [`TargetDescriptor`] listing parameter and return types, plus the receiver
//! type for methods. Free functions additionally carry an [`Invocable`] so the
//! real implementation can be reached when a call is passed through.

use crate::value::{Reflect, TypeDescriptor, Value};
use std::any::TypeId;
use std::borrow::{Borrow, Cow};
use std::fmt;
use std::sync::Arc;

/// Stable identity of an interceptable target
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(Cow<'static, str>);

impl TargetId {
    /// Identity from a static path, as generated by `#[mockable]`
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Identity from an owned name
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Identity of a function item, derived from its type name
    #[must_use]
    pub fn of_fn<F>(_item: &F) -> Self {
        Self::from_static(std::any::type_name::<F>())
    }

    /// The full path
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path segment, used when printing calls
    #[must_use]
    pub fn short_name(&self) -> &str {
        crate::format::method_name(&self.0)
    }
}

impl Borrow<str> for TargetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({})", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type a method is declared on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverType {
    id: TypeId,
    name: &'static str,
}

impl ReceiverType {
    /// Describe receiver type `T`
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type identity
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Signature of an interceptable target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    id: TargetId,
    params: Vec<TypeDescriptor>,
    returns: Vec<TypeDescriptor>,
    receiver: Option<ReceiverType>,
}

impl TargetDescriptor {
    /// Describe a target with no parameters and no returns
    #[must_use]
    pub const fn new(id: TargetId) -> Self {
        Self {
            id,
            params: Vec::new(),
            returns: Vec::new(),
            receiver: None,
        }
    }

    /// Append a parameter of type `T`
    #[must_use]
    pub fn with_param<T: Reflect>(mut self) -> Self {
        self.params.push(TypeDescriptor::of::<T>());
        self
    }

    /// Append a return value of type `T`
    #[must_use]
    pub fn with_return<T: Reflect>(mut self) -> Self {
        self.returns.push(TypeDescriptor::of::<T>());
        self
    }

    /// Mark this target as a method of `T`
    #[must_use]
    pub fn with_receiver<T: ?Sized + 'static>(mut self) -> Self {
        self.receiver = Some(ReceiverType::of::<T>());
        self
    }

    /// Target identity
    #[must_use]
    pub const fn id(&self) -> &TargetId {
        &self.id
    }

    /// Printable name: the last path segment
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.short_name()
    }

    /// Parameter types, in declaration order
    #[must_use]
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    /// Return types, in declaration order
    #[must_use]
    pub fn returns(&self) -> &[TypeDescriptor] {
        &self.returns
    }

    /// Receiver type for methods
    #[must_use]
    pub const fn receiver(&self) -> Option<&ReceiverType> {
        self.receiver.as_ref()
    }
}

/// A callable target with a declared signature
pub trait Invocable: Send + Sync {
    /// The signature
    fn descriptor(&self) -> &TargetDescriptor;

    /// Call the real implementation with already verified arguments
    fn invoke(&self, args: &[Value]) -> Vec<Value>;

    /// Parameter types, in declaration order
    fn parameter_types(&self) -> &[TypeDescriptor] {
        self.descriptor().params()
    }

    /// Return types, in declaration order
    fn return_types(&self) -> &[TypeDescriptor] {
        self.descriptor().returns()
    }
}

type InvokeFn = dyn Fn(&[Value]) -> Vec<Value> + Send + Sync;

/// [`Invocable`] backed by a closure
pub struct FnInvocable {
    descriptor: TargetDescriptor,
    call: Box<InvokeFn>,
}

impl FnInvocable {
    /// Pair a signature with the closure that implements it
    pub fn new<F>(descriptor: TargetDescriptor, call: F) -> Self
    where
        F: Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            call: Box::new(call),
        }
    }
}

impl fmt::Debug for FnInvocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInvocable")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Invocable for FnInvocable {
    fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    fn invoke(&self, args: &[Value]) -> Vec<Value> {
        (self.call)(args)
    }
}

/// A free function that can be mocked with `MockScope::mock_function`
#[derive(Clone)]
pub struct FunctionTarget {
    real: Arc<dyn Invocable>,
}

impl FunctionTarget {
    /// Wrap a callable
    ///
    /// A descriptor that declares a receiver is rejected when the target is
    /// mocked, not here.
    #[must_use]
    pub fn new(real: Arc<dyn Invocable>) -> Self {
        Self { real }
    }

    /// Wrap a closure implementing `descriptor`
    pub fn from_fn<F>(descriptor: TargetDescriptor, call: F) -> Self
    where
        F: Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::new(Arc::new(FnInvocable::new(descriptor, call)))
    }

    /// The signature
    #[must_use]
    pub fn descriptor(&self) -> &TargetDescriptor {
        self.real.descriptor()
    }

    /// The real implementation
    #[must_use]
    pub fn real(&self) -> &Arc<dyn Invocable> {
        &self.real
    }
}

impl fmt::Debug for FunctionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FunctionTarget")
            .field(self.descriptor())
            .finish()
    }
}

/// A method that can be mocked with `MockScope::mock_method`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTarget {
    descriptor: Arc<TargetDescriptor>,
}

impl MethodTarget {
    /// Wrap a method signature
    #[must_use]
    pub fn new(descriptor: TargetDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
        }
    }

    /// The signature
    #[must_use]
    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    /// Type the method is declared on
    #[must_use]
    pub fn receiver(&self) -> Option<&ReceiverType> {
        self.descriptor.receiver()
    }
}
