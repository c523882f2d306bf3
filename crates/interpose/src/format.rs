//! Call rendering for diagnostics.

use std::fmt::Debug;

/// Last path segment of a function or method path.
///
/// `app::Store::get` becomes `get`; closure suffixes are dropped.
#[must_use]
pub fn method_name(full: &str) -> &str {
    let trimmed = full.trim_end_matches("::{{closure}}");
    trimmed.rsplit("::").next().unwrap_or(trimmed)
}

/// Render a call as `name(arg1, arg2)`
#[must_use]
pub fn print_call<A: Debug>(name: &str, args: &[A]) -> String {
    let mut out = String::with_capacity(name.len() + 2 + args.len() * 8);
    out.push_str(name);
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{arg:?}"));
    }
    out.push(')');
    out
}
