//! Function registry for name-addressed dynamic invocation
//!
//! The registry binds string names to host-supplied functions of mixed
//! signatures and exposes one uniform entry point,
//! `invoke(name, args) -> Outcome`. Argument and return adaptation goes
//! through [`FromValue`] / [`IntoValue`], so the registry itself has no
//! knowledge of fixtures, expected values, or validation.
//!
//! Where the original design relied on runtime reflection, registration here
//! is a family of `IntoCallable` adapter impls over `Fn` types: arities 0
//! through 4, returning either a plain value or `Result<T, E>`. The signature
//! rules the source enforced at registration time (at most one failure-bearing
//! return, callable values only) are compile-time guarantees of those bounds.

use crate::error::{Error, Result};
use crate::value::{FromValue, IntoValue};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Result of one dynamic invocation: an adapted return value plus an optional
/// failure produced by the function's error channel.
///
/// A non-empty `failure` means the call itself completed but the function
/// reported an error; the engine decides what that means under the node's
/// error policy. Binding and shape problems never appear here; they surface
/// as [`Error`] from [`Registry::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Adapted return value (Null for zero-result functions)
    pub value: Value,
    /// Failure reported by the function, if any
    pub failure: Option<String>,
}

impl Outcome {
    /// Successful outcome carrying `value`.
    pub fn ok(value: Value) -> Self {
        Outcome {
            value,
            failure: None,
        }
    }

    /// Failed outcome carrying the function's error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Outcome {
            value: Value::Null,
            failure: Some(message.into()),
        }
    }

    /// Whether the function reported a failure.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// A registered function behind a uniform invocation contract.
pub trait Callable: Send + Sync {
    /// Declared parameter count; invocation arity must match exactly.
    fn arity(&self) -> usize;

    /// Invoke with fixture-decoded arguments. `name` is only used to
    /// attribute shape and binding errors.
    fn call(&self, name: &str, args: &[Value]) -> Result<Outcome>;
}

struct FnCallable {
    arity: usize,
    #[allow(clippy::type_complexity)]
    f: Box<dyn Fn(&str, &[Value]) -> Result<Outcome> + Send + Sync>,
}

impl Callable for FnCallable {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Outcome> {
        (self.f)(name, args)
    }
}

/// Marker for adapters over functions returning a plain value.
pub struct Plain<R>(PhantomData<R>);

/// Marker for adapters over functions returning `Result<R, E>`, where `Err`
/// feeds the outcome's failure channel.
pub struct Fallible<R, E>(PhantomData<(R, E)>);

/// Adaptation of a host function into a [`Callable`].
///
/// `Args` and `Ret` are inference markers; callers never name them. They give
/// each supported signature family its own impl so that a single
/// [`Registry::register`] call accepts all of them.
pub trait IntoCallable<Args, Ret> {
    /// Wrap `self` behind the uniform invocation contract.
    fn into_callable(self) -> Box<dyn Callable>;
}

macro_rules! impl_into_callable {
    ($len:expr; $(($arg:ident, $var:ident, $idx:tt)),*) => {
        impl<F, $($arg,)* R> IntoCallable<($($arg,)*), Plain<R>> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            $($arg: FromValue,)*
            R: IntoValue,
        {
            fn into_callable(self) -> Box<dyn Callable> {
                Box::new(FnCallable {
                    arity: $len,
                    f: Box::new(move |name: &str, args: &[Value]| {
                        if args.len() != $len {
                            return Err(Error::CallShape {
                                name: name.to_string(),
                                expected: $len,
                                got: args.len(),
                            });
                        }
                        $(
                            let $var = <$arg as FromValue>::from_value(&args[$idx])
                                .map_err(|message| Error::Binding {
                                    name: name.to_string(),
                                    index: $idx,
                                    message,
                                })?;
                        )*
                        Ok(Outcome::ok((self)($($var),*).into_value()))
                    }),
                })
            }
        }

        impl<F, $($arg,)* R, E> IntoCallable<($($arg,)*), Fallible<R, E>> for F
        where
            F: Fn($($arg),*) -> std::result::Result<R, E> + Send + Sync + 'static,
            $($arg: FromValue,)*
            R: IntoValue,
            E: std::fmt::Display,
        {
            fn into_callable(self) -> Box<dyn Callable> {
                Box::new(FnCallable {
                    arity: $len,
                    f: Box::new(move |name: &str, args: &[Value]| {
                        if args.len() != $len {
                            return Err(Error::CallShape {
                                name: name.to_string(),
                                expected: $len,
                                got: args.len(),
                            });
                        }
                        $(
                            let $var = <$arg as FromValue>::from_value(&args[$idx])
                                .map_err(|message| Error::Binding {
                                    name: name.to_string(),
                                    index: $idx,
                                    message,
                                })?;
                        )*
                        Ok(match (self)($($var),*) {
                            Ok(v) => Outcome::ok(v.into_value()),
                            Err(e) => Outcome::failed(e.to_string()),
                        })
                    }),
                })
            }
        }
    };
}

impl_into_callable!(0;);
impl_into_callable!(1; (A0, a0, 0));
impl_into_callable!(2; (A0, a0, 0), (A1, a1, 1));
impl_into_callable!(3; (A0, a0, 0), (A1, a1, 1), (A2, a2, 2));
impl_into_callable!(4; (A0, a0, 0), (A1, a1, 1), (A2, a2, 2), (A3, a3, 3));

/// Function registry mapping names to callables
pub struct Registry {
    functions: HashMap<String, Box<dyn Callable>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register a function under `name`.
    ///
    /// Fails fast, before any test runs, if the name is empty or already
    /// taken.
    pub fn register<Args, Ret, F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: IntoCallable<Args, Ret>,
    {
        if name.is_empty() {
            return Err(Error::Registration(
                "function name cannot be empty".to_string(),
            ));
        }
        if self.functions.contains_key(name) {
            return Err(Error::Registration(format!(
                "function '{}' is already registered",
                name
            )));
        }
        self.functions.insert(name.to_string(), f.into_callable());
        Ok(())
    }

    /// Invoke `name` with fixture-decoded arguments.
    ///
    /// Returns an error for unknown names, arity mismatches, and argument
    /// binding failures; a failure reported by the function itself comes back
    /// inside the [`Outcome`].
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Outcome> {
        let callable = self
            .functions
            .get(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
        tracing::trace!(function = name, args = args.len(), "invoking");
        callable.call(name, args)
    }

    /// Check if a function is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// List all registered function names, sorted
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry has no functions
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(a: i64, b: i64) -> i64 {
        a + b
    }

    fn parse_int(s: String) -> std::result::Result<i64, String> {
        s.parse::<i64>()
            .map_err(|_| format!("cannot parse {:?} as an integer", s))
    }

    #[test]
    fn test_register_and_invoke() {
        let mut registry = Registry::new();
        registry.register("add", add).unwrap();

        let outcome = registry.invoke("add", &[json!(2), json!(3)]).unwrap();
        assert_eq!(outcome.value, json!(5));
        assert!(!outcome.is_failure());
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut registry = Registry::new();
        registry.register("add", add).unwrap();

        let err = registry.register("add", add).unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_register_empty_name_fails() {
        let mut registry = Registry::new();
        let err = registry.register("", add).unwrap_err();
        assert!(matches!(err, Error::Registration(_)));
    }

    #[test]
    fn test_invoke_unknown_function() {
        let registry = Registry::new();
        let err = registry.invoke("missing", &[]).unwrap_err();
        assert!(matches!(err, Error::UnknownFunction(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut registry = Registry::new();
        registry.register("add", add).unwrap();

        let err = registry.invoke("add", &[json!(1)]).unwrap_err();
        match err {
            Error::CallShape {
                name,
                expected,
                got,
            } => {
                assert_eq!(name, "add");
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected CallShape, got {:?}", other),
        }
    }

    #[test]
    fn test_binding_error_names_argument() {
        let mut registry = Registry::new();
        registry.register("add", add).unwrap();

        let err = registry.invoke("add", &[json!(1), json!("x")]).unwrap_err();
        match err {
            Error::Binding { name, index, .. } => {
                assert_eq!(name, "add");
                assert_eq!(index, 1);
            }
            other => panic!("expected Binding, got {:?}", other),
        }
    }

    #[test]
    fn test_fallible_function_feeds_failure_channel() {
        let mut registry = Registry::new();
        registry.register("parse", parse_int).unwrap();

        let ok = registry.invoke("parse", &[json!("41")]).unwrap();
        assert_eq!(ok.value, json!(41));
        assert!(!ok.is_failure());

        let failed = registry.invoke("parse", &[json!("abc")]).unwrap();
        assert!(failed.is_failure());
        assert!(failed.failure.unwrap().contains("abc"));
    }

    #[test]
    fn test_zero_argument_zero_result_function() {
        let mut registry = Registry::new();
        registry.register("noop", || {}).unwrap();

        let outcome = registry.invoke("noop", &[]).unwrap();
        assert_eq!(outcome.value, Value::Null);
        assert!(!outcome.is_failure());
    }

    #[test]
    fn test_null_argument_uses_zero_value() {
        let mut registry = Registry::new();
        registry.register("add", add).unwrap();

        let outcome = registry.invoke("add", &[Value::Null, json!(3)]).unwrap();
        assert_eq!(outcome.value, json!(3));
    }

    #[test]
    fn test_closure_capture() {
        let mut registry = Registry::new();
        let base = 10i64;
        registry
            .register("offset", move |v: i64| v + base)
            .unwrap();

        let outcome = registry.invoke("offset", &[json!(5)]).unwrap();
        assert_eq!(outcome.value, json!(15));
    }

    #[test]
    fn test_function_names_sorted() {
        let mut registry = Registry::new();
        registry.register("b", || {}).unwrap();
        registry.register("a", || {}).unwrap();
        registry.register("c", || {}).unwrap();

        assert_eq!(registry.function_names(), vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("b"));
        assert!(!registry.contains("d"));
    }

    #[test]
    fn test_four_argument_function() {
        let mut registry = Registry::new();
        registry
            .register("join4", |a: String, b: String, c: String, d: String| {
                format!("{}{}{}{}", a, b, c, d)
            })
            .unwrap();

        let outcome = registry
            .invoke("join4", &[json!("a"), json!("b"), json!("c"), json!("d")])
            .unwrap();
        assert_eq!(outcome.value, json!("abcd"));
    }
}
