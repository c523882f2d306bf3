//! Positional comparison of argument specs against recorded calls.

use crate::matcher::Arg;
use crate::value::Value;

/// Whether one expected position accepts one actual argument.
///
/// Literals compare by deep equality. Matchers only apply when
/// `enable_matchers` is set; otherwise a matcher position never matches.
#[must_use]
pub fn arguments_match(expected: &Arg, actual: &Value, enable_matchers: bool) -> bool {
    match expected {
        Arg::Value(value) => value == actual,
        Arg::Matcher(matcher) => enable_matchers && matcher.matches(actual),
    }
}

/// Whether every expected position accepts the argument at the same index.
///
/// Different lengths never match. Evaluation stops at the first mismatch.
#[must_use]
pub fn calls_match(expected: &[Arg], actual: &[Value], enable_matchers: bool) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(expected, actual)| arguments_match(expected, actual, enable_matchers))
}

/// Index of the first candidate satisfying `predicate`
pub fn find_call<T>(candidates: &[T], mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
    candidates.iter().position(|candidate| predicate(candidate))
}
