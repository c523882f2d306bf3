//! Arity and type checks for arguments and outputs.
//!
//! Every stub pattern, stub output and verification expectation passes
//! through here before it reaches a session. Absent values at nilable
//! positions are normalised to the declared type's zero value so that later
//! equality checks compare like with like.

use crate::matcher::Arg;
use crate::result::{MockError, MockResult};
use crate::value::{TypeDescriptor, Value};

/// Check a pattern or expectation against declared parameter types.
///
/// Matcher-typed positions skip the type check.
///
/// # Errors
///
/// Arity mismatch, absent value at a non-nilable position, or a literal of
/// the wrong type.
pub fn verify_arguments(types: &[TypeDescriptor], args: Vec<Arg>) -> MockResult<Vec<Arg>> {
    check_arity(types.len(), args.len())?;
    types
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (declared, arg))| match arg {
            Arg::Matcher(_) => Ok(arg),
            Arg::Value(value) => verify_value(index, declared, value).map(Arg::Value),
        })
        .collect()
}

/// Check stub outputs against declared return types.
///
/// # Errors
///
/// Arity mismatch, absent value at a non-nilable position, or a value of the
/// wrong type.
pub fn verify_outputs(types: &[TypeDescriptor], outputs: Vec<Value>) -> MockResult<Vec<Value>> {
    check_arity(types.len(), outputs.len())?;
    types
        .iter()
        .zip(outputs)
        .enumerate()
        .map(|(index, (declared, value))| verify_value(index, declared, value))
        .collect()
}

/// Zero value of each declared return type
#[must_use]
pub fn default_output(returns: &[TypeDescriptor]) -> Vec<Value> {
    returns.iter().map(TypeDescriptor::zero).collect()
}

const fn check_arity(expected: usize, actual: usize) -> MockResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MockError::Arity { expected, actual })
    }
}

fn verify_value(index: usize, declared: &TypeDescriptor, value: Value) -> MockResult<Value> {
    if value.is_absent() {
        return if declared.is_nilable() {
            Ok(declared.zero())
        } else {
            Err(MockError::IllegalAbsent {
                index,
                expected: declared.name().to_string(),
            })
        };
    }
    if declared.accepts(&value) {
        Ok(value)
    } else {
        Err(MockError::Type {
            index,
            expected: declared.name().to_string(),
            actual: value.type_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{any, Captor, IntoArg};
    use crate::value::absent;
    use crate::{args, values};

    fn string_and_int() -> Vec<TypeDescriptor> {
        vec![TypeDescriptor::of::<String>(), TypeDescriptor::of::<i32>()]
    }

    mod argument_tests {
        use super::*;

        #[test]
        fn test_accepts_matching_literals() {
            let checked = verify_arguments(&string_and_int(), args!["a", 1_i32]).unwrap();
            assert_eq!(checked.len(), 2);
        }

        #[test]
        fn test_rejects_wrong_arity() {
            let err = verify_arguments(&string_and_int(), args!["a"]).unwrap_err();
            assert!(matches!(
                err,
                MockError::Arity {
                    expected: 2,
                    actual: 1
                }
            ));
        }

        #[test]
        fn test_rejects_wrong_type() {
            let err = verify_arguments(&string_and_int(), args!["a", 1_i64]).unwrap_err();
            match err {
                MockError::Type {
                    index,
                    expected,
                    actual,
                } => {
                    assert_eq!(index, 1);
                    assert_eq!(expected, "i32");
                    assert_eq!(actual, "i64");
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        #[test]
        fn test_matchers_bypass_type_check() {
            let captor = Captor::<u8>::new();
            let checked =
                verify_arguments(&string_and_int(), args![any(), captor.into_arg()]).unwrap();
            assert!(checked.iter().all(Arg::is_matcher));
        }

        #[test]
        fn test_absent_rejected_for_non_nilable() {
            let err = verify_arguments(&string_and_int(), args![absent(), 1_i32]).unwrap_err();
            assert!(matches!(err, MockError::IllegalAbsent { index: 0, .. }));
        }

        #[test]
        fn test_absent_normalised_for_nilable() {
            let types = vec![TypeDescriptor::of::<Option<String>>()];
            let checked = verify_arguments(&types, args![absent()]).unwrap();
            assert_eq!(checked[0].as_value(), Some(&Value::of(None::<String>)));
        }
    }

    mod output_tests {
        use super::*;

        #[test]
        fn test_outputs_checked_and_normalised() {
            let types = vec![TypeDescriptor::of::<String>(), TypeDescriptor::of::<Vec<u8>>()];
            let checked = verify_outputs(&types, values!["x", absent()]).unwrap();
            assert_eq!(checked[1], Value::of(Vec::<u8>::new()));

            assert!(verify_outputs(&types, values!["x"]).is_err());
            assert!(verify_outputs(&types, values![1_i32, absent()]).is_err());
        }

        #[test]
        fn test_default_output() {
            let types = vec![
                TypeDescriptor::of::<String>(),
                TypeDescriptor::of::<Option<i32>>(),
                TypeDescriptor::of::<u64>(),
            ];
            assert_eq!(
                default_output(&types),
                values![String::new(), None::<i32>, 0_u64]
            );
            assert!(default_output(&[]).is_empty());
        }
    }
}
