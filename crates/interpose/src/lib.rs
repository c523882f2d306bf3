//! Interpose: Call-Interception Mocking for Rust Tests
//!
//! Replace the behaviour of functions and methods for the duration of a
//! test, stub their results per argument pattern, and verify how they were
//! called.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   INTERPOSE Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ MockScope  │    │ Mock       │    │ Intercept  │            │
//! │   │ (per test) │───►│ Registry   │───►│ Guard      │            │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │         │                                   │                   │
//! │         ▼                                   ▼                   │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Mock/Stub  │───►│ Mock       │◄───│ Seam       │◄── #[mockable]
//! │   │ builders   │    │ Session    │    │ Interceptor│            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use interpose::{any, args, mockable, values, MockScope};
//!
//! #[mockable]
//! fn base(path: &str) -> String {
//!     path.rsplit('/').next().unwrap_or_default().to_string()
//! }
//!
//! #[test]
//! fn test_base() {
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

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod call_matcher;
mod config;
mod failure;
mod format;
/// Interception guards (one per installed target)
pub mod guard;
/// Interceptors and the `#[mockable]` seam runtime
pub mod interceptor;
mod matcher;
mod mock;
/// Mock registry
pub mod registry;
mod result;
mod scope;
mod session;
mod signature;
mod stub;
/// Test log output
pub mod tracing_support;
mod value;
mod verifier;

pub use call_matcher::{arguments_match, calls_match, find_call};
pub use config::{
    DuplicateStubPolicy, MockConfig, MockConfigBuilder, ENV_DUPLICATE_STUBS, ENV_FAIL_ON_DROP,
    ENV_LOG_CALLS,
};
pub use failure::{MockFailure, MockFailures};
pub use format::{method_name, print_call};
pub use guard::{GuardKind, InterceptionGuard};
pub use interceptor::{
    Interceptor, InterceptorHandle, RawCall, RealCall, SeamInterceptor, Substitute,
};
pub use matcher::{any, matching, that, Any, Arg, ArgumentMatcher, Captor, IntoArg, Matching, That};
pub use mock::Mock;
pub use registry::MockRegistry;
pub use result::{MockError, MockErrorKind, MockResult};
pub use scope::{MockScope, MockScopeBuilder, ScopeId};
pub use session::{
    CallRecord, InstanceId, MockSession, Outcome, Resolution, SessionKey, StubRule,
};
pub use signature::{
    FnInvocable, FunctionTarget, Invocable, MethodTarget, ReceiverType, TargetDescriptor, TargetId,
};
pub use stub::Stub;
pub use value::{absent, IntoValue, Reflect, TypeDescriptor, TypeKind, Value};
pub use verifier::{default_output, verify_arguments, verify_outputs};

#[cfg(feature = "derive")]
pub use interpose_derive::{mockable, Reflect};

/// Prelude for tests
pub mod prelude {
    pub use crate::{
        absent, any, args, matching, that, values, Captor, FunctionTarget, MethodTarget, Mock,
        MockConfig, MockScope, Reflect, Value,
    };
    #[cfg(feature = "derive")]
    pub use crate::mockable;
}
