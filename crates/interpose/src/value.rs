//! Dynamic values and type descriptors.
//!
//! Rust has no runtime reflection, so every type that can flow through a
//! mocked signature implements [`Reflect`]: it names its [`TypeKind`] and
//! knows how to build its zero value. A [`Value`] erases the concrete type
//! but keeps equality, cloning and debug printing, which is all the
//! matching engine needs.
//!
//! ## Absent values
//!
//! [`Value::absent()`] is the untyped "nothing" literal. It is only accepted
//! at positions whose [`TypeKind`] is nilable, where it is replaced by that
//! type's zero value (`None`, an empty collection).

use downcast::downcast;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Broad category of a type, used for absent-value checks and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// `bool`
    Bool,
    /// Signed integers
    Int,
    /// Unsigned integers
    Uint,
    /// `f32`, `f64`
    Float,
    /// `char`
    Char,
    /// `String`
    String,
    /// `()`
    Unit,
    /// `Option<T>`
    Option,
    /// `Box<T>`, `Arc<T>`
    Pointer,
    /// `Vec<T>`
    Slice,
    /// Fixed-size arrays
    Array,
    /// `HashMap`, `BTreeMap`
    Map,
    /// `HashSet`, `BTreeSet`
    Set,
    /// `Result<T, E>`
    Result,
    /// Tuples
    Tuple,
    /// User structs
    Struct,
    /// User enums
    Enum,
}

impl TypeKind {
    /// Whether an absent value may stand at a position of this kind
    #[must_use]
    pub const fn is_nilable(self) -> bool {
        matches!(self, Self::Option | Self::Slice | Self::Map | Self::Set)
    }
}

/// Runtime type information for values that cross a mocked signature.
///
/// Implemented for primitives, `String`, the standard containers, and via
/// `#[derive(Reflect)]` for user types (which requires `Default`).
pub trait Reflect: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Kind of this type
    const KIND: TypeKind;

    /// The zero value returned when a mock has no matching stub
    fn zero() -> Self;
}

macro_rules! impl_reflect {
    ($kind:ident => $zero:expr; $($ty:ty),+ $(,)?) => {
        $(
            impl Reflect for $ty {
                const KIND: TypeKind = TypeKind::$kind;

                fn zero() -> Self {
                    $zero
                }
            }
        )+
    };
}

impl_reflect!(Bool => false; bool);
impl_reflect!(Int => 0; i8, i16, i32, i64, i128, isize);
impl_reflect!(Uint => 0; u8, u16, u32, u64, u128, usize);
impl_reflect!(Float => 0.0; f32, f64);
impl_reflect!(Char => '\0'; char);
impl_reflect!(String => String::new(); String);
impl_reflect!(Unit => (); ());
impl_reflect!(Struct => PathBuf::new(); PathBuf);
impl_reflect!(Struct => Duration::ZERO; Duration);

impl<T: Reflect> Reflect for Option<T> {
    const KIND: TypeKind = TypeKind::Option;

    fn zero() -> Self {
        None
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    const KIND: TypeKind = TypeKind::Slice;

    fn zero() -> Self {
        Vec::new()
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    const KIND: TypeKind = TypeKind::Array;

    fn zero() -> Self {
        std::array::from_fn(|_| T::zero())
    }
}

impl<T: Reflect> Reflect for Box<T> {
    const KIND: TypeKind = TypeKind::Pointer;

    fn zero() -> Self {
        Box::new(T::zero())
    }
}

impl<T: Reflect> Reflect for Arc<T> {
    const KIND: TypeKind = TypeKind::Pointer;

    fn zero() -> Self {
        Arc::new(T::zero())
    }
}

impl<K: Reflect + Eq + Hash, V: Reflect> Reflect for HashMap<K, V> {
    const KIND: TypeKind = TypeKind::Map;

    fn zero() -> Self {
        Self::new()
    }
}

impl<K: Reflect + Ord, V: Reflect> Reflect for BTreeMap<K, V> {
    const KIND: TypeKind = TypeKind::Map;

    fn zero() -> Self {
        Self::new()
    }
}

impl<T: Reflect + Eq + Hash> Reflect for HashSet<T> {
    const KIND: TypeKind = TypeKind::Set;

    fn zero() -> Self {
        Self::new()
    }
}

impl<T: Reflect + Ord> Reflect for BTreeSet<T> {
    const KIND: TypeKind = TypeKind::Set;

    fn zero() -> Self {
        Self::new()
    }
}

/// `Ok` of the success type's zero value, the closest analogue of
/// "zero result, no error".
impl<T: Reflect, E: Reflect> Reflect for Result<T, E> {
    const KIND: TypeKind = TypeKind::Result;

    fn zero() -> Self {
        Ok(T::zero())
    }
}

macro_rules! impl_reflect_tuple {
    ($($name:ident),+) => {
        impl<$($name: Reflect),+> Reflect for ($($name,)+) {
            const KIND: TypeKind = TypeKind::Tuple;

            fn zero() -> Self {
                ($($name::zero(),)+)
            }
        }
    };
}

impl_reflect_tuple!(A, B);
impl_reflect_tuple!(A, B, C);
impl_reflect_tuple!(A, B, C, D);

/// Descriptor of a parameter or return type
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    kind: TypeKind,
    zero: fn() -> Value,
}

impl TypeDescriptor {
    /// Describe `T`
    #[must_use]
    pub fn of<T: Reflect>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: T::KIND,
            zero: zero_value::<T>,
        }
    }

    /// Type identity
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Kind of the type
    #[must_use]
    pub const fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Whether an absent value is acceptable for this type
    #[must_use]
    pub const fn is_nilable(&self) -> bool {
        self.kind.is_nilable()
    }

    /// Build the zero value of this type
    #[must_use]
    pub fn zero(&self) -> Value {
        (self.zero)()
    }

    /// Whether `value` can stand where this type is declared
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        value
            .type_descriptor()
            .is_some_and(|actual| actual.id == self.id)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn zero_value<T: Reflect>() -> Value {
    Value::of(T::zero())
}

/// Object-safe view of a `Reflect` value
trait DynValue: downcast::Any + fmt::Debug + Send + Sync {
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
    fn descriptor(&self) -> TypeDescriptor;
}

downcast!(dyn DynValue);

impl<T: Reflect> DynValue for T {
    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other
            .downcast_ref::<T>()
            .is_ok_and(|other| self == other)
    }

    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<T>()
    }
}

/// A type-erased argument or return value
#[derive(Clone)]
pub struct Value {
    inner: Option<Arc<dyn DynValue>>,
}

impl Value {
    /// Wrap a concrete value
    #[must_use]
    pub fn of<T: Reflect>(value: T) -> Self {
        Self {
            inner: Some(Arc::new(value)),
        }
    }

    /// The absent literal
    #[must_use]
    pub const fn absent() -> Self {
        Self { inner: None }
    }

    /// Whether this is the absent literal
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        self.inner.is_none()
    }

    /// Descriptor of the wrapped type, `None` when absent
    #[must_use]
    pub fn type_descriptor(&self) -> Option<TypeDescriptor> {
        self.inner.as_ref().map(|inner| inner.descriptor())
    }

    /// Name of the wrapped type, `"absent"` when absent
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_descriptor()
            .map_or("absent", |descriptor| descriptor.name())
    }

    /// Whether the wrapped value is a `T`
    #[must_use]
    pub fn is<T: Reflect>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Borrow the wrapped value as `T`
    #[must_use]
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.inner
            .as_deref()
            .and_then(|inner| inner.downcast_ref::<T>().ok())
    }

    /// Clone the wrapped value out as `T`
    #[must_use]
    pub fn cloned<T: Reflect>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

/// The absent literal, for use inside `args!`/`values!`
#[must_use]
pub const fn absent() -> Value {
    Value::absent()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(left), Some(right)) => left.dyn_eq(&**right),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => fmt::Debug::fmt(&**inner, f),
            None => f.write_str("absent"),
        }
    }
}

/// Conversion into a return [`Value`]
pub trait IntoValue {
    /// Perform the conversion
    fn into_value(self) -> Value;
}

impl<T: Reflect> IntoValue for T {
    fn into_value(self) -> Value {
        Value::of(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::of(self.to_string())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

/// Build a `Vec<Value>` from heterogeneous return values
///
/// ```ignore
/// mock.with(args!["a"]).returns(values!["A", absent()]);
/// ```
#[macro_export]
macro_rules! values {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::IntoValue::into_value($value)),+]
    };
}
