//! Argument matchers and argument specs.
//!
//! A stub pattern or a verification expectation is a list of [`Arg`]s. Each
//! position is either a literal [`Value`], compared by deep equality, or an
//! [`ArgumentMatcher`], a predicate over the actual value.
//!
//! ## Example
//!
//! ```ignore
//! use interpose::{any, args, values, Captor};
//!
//! let captor = Captor::<String>::new();
//! mock.with(args!["a", any()]).returns(values!["A"]);
//! mock.with(args![captor.clone(), 3_i32]).returns_defaults();
//! ```

use crate::value::{Reflect, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// Predicate over a single argument.
///
/// Evaluating a matcher may only change the matcher's own state.
pub trait ArgumentMatcher: fmt::Debug + Send + Sync {
    /// Whether `actual` satisfies this matcher
    fn matches(&self, actual: &Value) -> bool;

    /// Key identifying stateless matchers when comparing stub patterns.
    ///
    /// Two matchers with the same `Some` key are the same pattern element;
    /// `None` means the matcher is only identical to itself.
    fn pattern_key(&self) -> Option<String> {
        None
    }
}

/// Matcher accepting every value, including absent ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Any;

/// Matcher accepting every value
#[must_use]
pub const fn any() -> Any {
    Any
}

impl ArgumentMatcher for Any {
    fn matches(&self, _actual: &Value) -> bool {
        true
    }

    fn pattern_key(&self) -> Option<String> {
        Some("any".to_string())
    }
}

/// Matcher that stores every value it is asked about and always matches.
///
/// Clones share storage, so keep one handle and pass a clone into the
/// pattern. The last evaluated value wins.
pub struct Captor<T> {
    slot: Arc<Mutex<Option<Value>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> Captor<T> {
    /// Create an empty captor
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            _marker: PhantomData,
        }
    }

    /// The last captured value, if it was a `T`
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.raw().and_then(|value| value.cloned::<T>())
    }

    /// The last captured value, untyped
    #[must_use]
    pub fn raw(&self) -> Option<Value> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether anything has been captured yet
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.raw().is_some()
    }
}

impl<T: Reflect> Default for Captor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Captor<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Captor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "captor::<{}>()", std::any::type_name::<T>())
    }
}

impl<T: Reflect> ArgumentMatcher for Captor<T> {
    fn matches(&self, actual: &Value) -> bool {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(actual.clone());
        true
    }
}

/// Matcher built from an arbitrary predicate over the untyped value
pub struct Matching<F> {
    predicate: F,
    description: &'static str,
}

/// Match with an untyped predicate
///
/// ```ignore
/// mock.with(args![matching("non-empty", |v| !v.is_absent())]).returns(values![1]);
/// ```
pub fn matching<F>(description: &'static str, predicate: F) -> Matching<F>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Matching {
        predicate,
        description,
    }
}

impl<F> fmt::Debug for Matching<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "matching({})", self.description)
    }
}

impl<F> ArgumentMatcher for Matching<F>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    fn matches(&self, actual: &Value) -> bool {
        (self.predicate)(actual)
    }
}

/// Matcher built from a typed predicate; values of other types never match
pub struct That<T, F> {
    predicate: F,
    description: &'static str,
    _marker: PhantomData<fn(&T)>,
}

/// Match with a predicate over `T`
///
/// ```ignore
/// mock.with(args![that("long path", |p: &String| p.len() > 10)]).returns(values![true]);
/// ```
pub fn that<T, F>(description: &'static str, predicate: F) -> That<T, F>
where
    T: Reflect,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    That {
        predicate,
        description,
        _marker: PhantomData,
    }
}

impl<T, F> fmt::Debug for That<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "that::<{}>({})", std::any::type_name::<T>(), self.description)
    }
}

impl<T, F> ArgumentMatcher for That<T, F>
where
    T: Reflect,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn matches(&self, actual: &Value) -> bool {
        actual.downcast_ref::<T>().is_some_and(&self.predicate)
    }
}

/// One position of a stub pattern or verification expectation
#[derive(Clone)]
pub enum Arg {
    /// Literal compared by deep equality
    Value(Value),
    /// Predicate over the actual value
    Matcher(Arc<dyn ArgumentMatcher>),
}

impl Arg {
    /// Wrap a matcher
    pub fn matcher(matcher: impl ArgumentMatcher + 'static) -> Self {
        Self::Matcher(Arc::new(matcher))
    }

    /// Whether this position is matcher-typed
    #[must_use]
    pub const fn is_matcher(&self) -> bool {
        matches!(self, Self::Matcher(_))
    }

    /// The literal, if this position holds one
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Matcher(_) => None,
        }
    }

    /// Whether two pattern elements are interchangeable
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(left), Self::Value(right)) => left == right,
            (Self::Matcher(left), Self::Matcher(right)) => {
                Arc::ptr_eq(left, right)
                    || matches!(
                        (left.pattern_key(), right.pattern_key()),
                        (Some(l), Some(r)) if l == r
                    )
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => fmt::Debug::fmt(value, f),
            Self::Matcher(matcher) => fmt::Debug::fmt(matcher, f),
        }
    }
}

/// Conversion into an [`Arg`]
pub trait IntoArg {
    /// Perform the conversion
    fn into_arg(self) -> Arg;
}

impl<T: Reflect> IntoArg for T {
    fn into_arg(self) -> Arg {
        Arg::Value(Value::of(self))
    }
}

impl IntoArg for &str {
    fn into_arg(self) -> Arg {
        Arg::Value(Value::of(self.to_string()))
    }
}

impl IntoArg for Value {
    fn into_arg(self) -> Arg {
        Arg::Value(self)
    }
}

impl IntoArg for Arg {
    fn into_arg(self) -> Arg {
        self
    }
}

impl IntoArg for Any {
    fn into_arg(self) -> Arg {
        Arg::matcher(self)
    }
}

impl<T: Reflect> IntoArg for Captor<T> {
    fn into_arg(self) -> Arg {
        Arg::matcher(self)
    }
}

impl<F> IntoArg for Matching<F>
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    fn into_arg(self) -> Arg {
        Arg::matcher(self)
    }
}

impl<T, F> IntoArg for That<T, F>
where
    T: Reflect,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn into_arg(self) -> Arg {
        Arg::matcher(self)
    }
}

impl IntoArg for Arc<dyn ArgumentMatcher> {
    fn into_arg(self) -> Arg {
        Arg::Matcher(self)
    }
}

/// Build a `Vec<Arg>` mixing literals and matchers positionally
///
/// ```ignore
/// mock.with(args!["x", any()]).returns(values![absent()]);
/// mock.verify(args!["x", absent()]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::IntoArg::into_arg($arg)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::absent;

    mod any_tests {
        use super::*;

        #[test]
        fn test_any_matches_everything() {
            let candidates = [
                Value::of("some string".to_string()),
                Value::of(123_456_i32),
                Value::of(0.123_456_f64),
                Value::of(None::<u8>),
                Value::of(vec![1_u8, 2, 3]),
                Value::absent(),
            ];
            for candidate in &candidates {
                assert!(any().matches(candidate), "any() rejected {candidate:?}");
            }
        }

        #[test]
        fn test_any_pattern_key() {
            assert_eq!(Any.pattern_key().as_deref(), Some("any"));
        }
    }

    mod captor_tests {
        use super::*;

        #[test]
        fn test_captor_stores_last_value() {
            let captor = Captor::<String>::new();
            assert!(!captor.has_value());

            assert!(captor.matches(&Value::of("first".to_string())));
            assert!(captor.matches(&Value::of("second".to_string())));

            assert_eq!(captor.value().as_deref(), Some("second"));
        }

        #[test]
        fn test_captor_clones_share_storage() {
            let captor = Captor::<i32>::new();
            let handle = captor.clone();
            assert!(handle.matches(&Value::of(7_i32)));
            assert_eq!(captor.value(), Some(7));
        }

        #[test]
        fn test_captor_keeps_foreign_types_untyped() {
            let captor = Captor::<i32>::new();
            assert!(captor.matches(&Value::of("text".to_string())));
            assert_eq!(captor.value(), None);
            assert_eq!(captor.raw(), Some(Value::of("text".to_string())));
        }

        #[test]
        fn test_captor_has_no_pattern_key() {
            assert!(Captor::<u8>::new().pattern_key().is_none());
        }
    }

    mod predicate_tests {
        use super::*;

        #[test]
        fn test_matching_uses_predicate() {
            let matcher = matching("absent", |value: &Value| value.is_absent());
            assert!(matcher.matches(&Value::absent()));
            assert!(!matcher.matches(&Value::of(1_u8)));
            assert_eq!(format!("{matcher:?}"), "matching(absent)");
        }

        #[test]
        fn test_that_is_typed() {
            let matcher = that("even", |n: &i32| n % 2 == 0);
            assert!(matcher.matches(&Value::of(4_i32)));
            assert!(!matcher.matches(&Value::of(3_i32)));
            assert!(!matcher.matches(&Value::of(4_i64)));
            assert!(!matcher.matches(&Value::absent()));
        }
    }

    mod arg_tests {
        use super::*;

        #[test]
        fn test_args_macro_mixes_literals_and_matchers() {
            let pattern = args!["a", any(), 3_u32, absent()];
            assert_eq!(pattern.len(), 4);
            assert_eq!(pattern[0].as_value(), Some(&Value::of("a".to_string())));
            assert!(pattern[1].is_matcher());
            assert_eq!(pattern[2].as_value(), Some(&Value::of(3_u32)));
            assert!(pattern[3].as_value().is_some_and(Value::is_absent));
            assert!(args![].is_empty());
        }

        #[test]
        fn test_same_as() {
            assert!(Arg::Value(Value::of(1_i32)).same_as(&Arg::Value(Value::of(1_i32))));
            assert!(!Arg::Value(Value::of(1_i32)).same_as(&Arg::Value(Value::of(2_i32))));
            assert!(any().into_arg().same_as(&any().into_arg()));

            let captor = Captor::<i32>::new().into_arg();
            assert!(captor.same_as(&captor.clone()));
            assert!(!captor.same_as(&Captor::<i32>::new().into_arg()));
            assert!(!captor.same_as(&Arg::Value(Value::of(1_i32))));
        }

        #[test]
        fn test_debug_rendering() {
            assert_eq!(format!("{:?}", "a".into_arg()), "\"a\"");
            assert_eq!(format!("{:?}", any().into_arg()), "Any");
            assert_eq!(
                format!("{:?}", Captor::<u8>::new().into_arg()),
                "captor::<u8>()"
            );
        }
    }
}
