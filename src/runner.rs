//! Fixture tree execution engine
//!
//! The runner walks an initialized [`TestNode`] tree depth-first, driving
//! each node through its lifecycle: enter the named scope, apply env
//! overrides, run setup, invoke the call under the effective error policy,
//! recurse into subtests, run teardown, restore the environment. Failures are
//! attributed to the hierarchical node path and reported through the
//! [`Reporter`] collaborator; the walk never aborts unrelated branches.
//!
//! Execution is single-threaded and synchronous. Environment mutation is
//! process-global state handled with strict stack discipline: a guard
//! restores prior values on every exit path.

use crate::fixture::{Call, OnError, TestNode};
use crate::registry::Registry;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Reporting contract of the external test harness.
///
/// The engine surfaces every structural or execution failure through this
/// collaborator instead of unwinding. [`RunReport`] is the built-in
/// implementation; a host harness can supply its own to forward failures to
/// its native pass/fail recording.
pub trait Reporter {
    /// Enter a named scope (a node starts executing).
    fn enter(&mut self, name: &str);
    /// Leave the current scope.
    fn leave(&mut self);
    /// Record a failure attributed to the current scope.
    fn fail(&mut self, message: &str);
}

/// A single recorded failure with its hierarchical attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Hierarchical node path, `root/group/2`
    pub path: String,
    /// What went wrong
    pub message: String,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Collecting reporter: the default way to consume a run's results
#[derive(Debug, Default)]
pub struct RunReport {
    scope: Vec<String>,
    failures: Vec<Failure>,
    executed: usize,
}

impl RunReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no node failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Every recorded failure, in execution order
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Number of nodes executed (entered), including grouping nodes
    pub fn executed(&self) -> usize {
        self.executed
    }
}

impl Reporter for RunReport {
    fn enter(&mut self, name: &str) {
        self.scope.push(name.to_string());
        self.executed += 1;
    }

    fn leave(&mut self) {
        self.scope.pop();
    }

    fn fail(&mut self, message: &str) {
        let path = self.scope.join("/");
        debug!(test = %path, failure = message, "test failed");
        self.failures.push(Failure {
            path,
            message: message.to_string(),
        });
    }
}

/// Custom got/want comparator supplied by the engine's caller.
/// Returns a descriptive message when the values do not match.
pub type ValueValidator = dyn Fn(&Value, &Value) -> std::result::Result<(), String> + Send + Sync;

/// Validator for call failures under policy `validate`: receives the failure
/// message and the node's `want` value.
pub type ErrorValidator = dyn Fn(&str, &Value) -> std::result::Result<(), String> + Send + Sync;

/// Fixture tree runner bound to a function registry
pub struct Runner<'r> {
    registry: &'r Registry,
    validator: Option<Box<ValueValidator>>,
    error_validator: Option<Box<ErrorValidator>>,
}

// Inherited execution state threaded through the recursion; the tree itself
// stays immutable across runs.
struct Scope<'a> {
    on_error: OnError,
    eval: Option<&'a str>,
}

impl<'r> Runner<'r> {
    /// Create a runner over `registry`
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            validator: None,
            error_validator: None,
        }
    }

    /// Replace default deep-equality validation with a custom comparator.
    ///
    /// Takes precedence over any `eval` function named by a node.
    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(f));
        self
    }

    /// Supply the validator used when a node's policy is `validate`.
    pub fn with_error_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.error_validator = Some(Box::new(f));
        self
    }

    /// Execute an initialized tree and collect the results.
    pub fn run(&self, node: &TestNode) -> RunReport {
        let mut report = RunReport::new();
        self.run_with(node, &mut report);
        report
    }

    /// Execute an initialized tree, reporting through `reporter`.
    pub fn run_with(&self, node: &TestNode, reporter: &mut dyn Reporter) {
        let scope = Scope {
            on_error: OnError::Fail,
            eval: None,
        };
        self.run_node(node, &scope, reporter);
    }

    fn run_node(&self, node: &TestNode, inherited: &Scope<'_>, reporter: &mut dyn Reporter) {
        reporter.enter(&node.name);
        debug!(test = %node.name, "running");

        // Guard restores prior values when it drops, on every exit path.
        let _env = EnvGuard::apply(&node.env);

        let scope = Scope {
            on_error: node.on_error.unwrap_or(inherited.on_error),
            eval: node.eval.as_deref().or(inherited.eval),
        };

        let mut setup_ok = true;
        for call in &node.setup {
            if let Err(message) = self.run_plain(call) {
                reporter.fail(&format!("setup {}: {}", call.function, message));
                setup_ok = false;
                break;
            }
        }

        if setup_ok {
            if let Some(call) = &node.call {
                self.run_call(call, node.want.as_ref(), &scope, reporter);
            }
            for subtest in &node.subtests {
                self.run_node(subtest, &scope, reporter);
            }
        }

        // Teardown closes the node's bracket: it runs after the primary call
        // and after all subtests, even when setup or the call failed.
        for call in &node.teardown {
            if let Err(message) = self.run_plain(call) {
                reporter.fail(&format!("teardown {}: {}", call.function, message));
            }
        }

        reporter.leave();
    }

    // Run a setup/teardown call, where both invocation errors and a reported
    // failure are fatal to the node.
    fn run_plain(&self, call: &Call) -> std::result::Result<(), String> {
        match self.registry.invoke(&call.function, &call.args) {
            Err(e) => Err(e.to_string()),
            Ok(outcome) => match outcome.failure {
                Some(failure) => Err(failure),
                None => Ok(()),
            },
        }
    }

    fn run_call(
        &self,
        call: &Call,
        want: Option<&Value>,
        scope: &Scope<'_>,
        reporter: &mut dyn Reporter,
    ) {
        let outcome = match self.registry.invoke(&call.function, &call.args) {
            Ok(outcome) => outcome,
            Err(e) => {
                reporter.fail(&format!("call {}: {}", call.function, e));
                return;
            }
        };

        let want = want.cloned().unwrap_or(Value::Null);
        match scope.on_error {
            OnError::Fail => {
                if let Some(failure) = outcome.failure {
                    reporter.fail(&format!("test function: {}", failure));
                } else if let Err(message) = self.validate(&outcome.value, &want, scope.eval) {
                    reporter.fail(&message);
                }
            }
            OnError::Succeed => {
                if outcome.failure.is_none() {
                    reporter.fail("test function succeeded, expected a failure");
                }
            }
            OnError::Validate => match outcome.failure {
                None => reporter.fail("onError is \"validate\" but the call did not fail"),
                Some(failure) => match &self.error_validator {
                    None => {
                        reporter.fail("onError is \"validate\" but no error validator was supplied")
                    }
                    Some(validate) => {
                        if let Err(message) = validate(&failure, &want) {
                            reporter.fail(&message);
                        }
                    }
                },
            },
        }
    }

    // Validation precedence: caller-supplied comparator, then the node's eval
    // function resolved through the registry, then deep equality.
    fn validate(
        &self,
        got: &Value,
        want: &Value,
        eval: Option<&str>,
    ) -> std::result::Result<(), String> {
        if let Some(validate) = &self.validator {
            return validate(got, want);
        }
        if let Some(eval) = eval {
            return match self.registry.invoke(eval, &[got.clone(), want.clone()]) {
                Err(e) => Err(format!("eval {}: {}", eval, e)),
                Ok(outcome) => match outcome.failure {
                    Some(failure) => Err(failure),
                    None => Ok(()),
                },
            };
        }
        if got == want {
            Ok(())
        } else {
            Err(format!("got {}, want {}", display(got), display(want)))
        }
    }
}

fn display(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

// Scoped environment override: sets the given variables and restores the
// previous state on drop.
struct EnvGuard {
    saved: Vec<(String, Option<std::ffi::OsString>)>,
}

impl EnvGuard {
    fn apply(vars: &BTreeMap<String, String>) -> Self {
        let mut saved = Vec::with_capacity(vars.len());
        for (name, value) in vars {
            saved.push((name.clone(), std::env::var_os(name)));
            std::env::set_var(name, value);
        }
        EnvGuard { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => std::env::set_var(&name, value),
                None => std::env::remove_var(&name),
            }
        }
    }
}

/// Execute an initialized fixture tree against `registry` with default
/// validation, collecting results into a [`RunReport`].
///
/// Shorthand for `Runner::new(registry).run(node)`.
pub fn run(node: &TestNode, registry: &Registry) -> RunReport {
    Runner::new(registry).run(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register("add", |a: i64, b: i64| a + b).unwrap();
        r.register("parse", |s: String| {
            s.parse::<i64>()
                .map_err(|_| format!("cannot parse {:?}", s))
        })
        .unwrap();
        r.register("getenv", |name: String| {
            std::env::var(&name).unwrap_or_default()
        })
        .unwrap();
        r
    }

    fn node(yaml: &str) -> TestNode {
        let mut node: TestNode = serde_yaml::from_str(yaml).unwrap();
        node.init("test").unwrap();
        node
    }

    #[test]
    fn test_passing_call() {
        let r = registry();
        let report = run(
            &node("functions: {add: ''}\ncall: [add, 2, 3]\nwant: 5\n"),
            &r,
        );
        assert!(report.is_success(), "failures: {:?}", report.failures());
    }

    #[test]
    fn test_mismatch_reports_got_and_want() {
        let r = registry();
        let report = run(
            &node("functions: {add: ''}\ncall: [add, 2, 3]\nwant: 6\n"),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        let failure = &report.failures()[0];
        assert_eq!(failure.path, "test");
        assert_eq!(failure.message, "got 5, want 6");
    }

    #[test]
    fn test_mismatch_does_not_stop_siblings() {
        let r = registry();
        let report = run(
            &node(
                r#"
functions: {add: ''}
subtests:
  - call: [add, 1, 1]
    want: 3
  - call: [add, 2, 2]
    want: 4
"#,
            ),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].path, "test/0");
        // Sibling "1" still executed.
        assert_eq!(report.executed(), 3);
    }

    #[test]
    fn test_policy_succeed() {
        let r = registry();
        let report = run(
            &node("functions: {parse: ''}\nonError: succeed\ncall: [parse, abc]\n"),
            &r,
        );
        assert!(report.is_success(), "failures: {:?}", report.failures());

        let report = run(
            &node("functions: {parse: ''}\nonError: succeed\ncall: [parse, '42']\n"),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0]
            .message
            .contains("expected a failure"));
    }

    #[test]
    fn test_policy_fail_reports_function_failure() {
        let r = registry();
        let report = run(&node("functions: {parse: ''}\ncall: [parse, abc]\n"), &r);
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.starts_with("test function:"));
    }

    #[test]
    fn test_policy_validate() {
        let r = registry();
        let runner = Runner::new(&r).with_error_validator(|failure, want| {
            let expected = want.as_str().unwrap_or_default();
            if failure.contains(expected) {
                Ok(())
            } else {
                Err(format!("failure {:?} does not mention {:?}", failure, expected))
            }
        });

        let report = runner.run(&node(
            "functions: {parse: ''}\nonError: validate\ncall: [parse, abc]\nwant: abc\n",
        ));
        assert!(report.is_success(), "failures: {:?}", report.failures());

        let report = runner.run(&node(
            "functions: {parse: ''}\nonError: validate\ncall: [parse, abc]\nwant: xyz\n",
        ));
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.contains("does not mention"));
    }

    #[test]
    fn test_policy_validate_without_validator_is_violation() {
        let r = registry();
        let report = run(
            &node("functions: {parse: ''}\nonError: validate\ncall: [parse, abc]\n"),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0]
            .message
            .contains("no error validator"));
    }

    #[test]
    fn test_policy_validate_requires_call_failure() {
        let r = registry();
        let runner = Runner::new(&r).with_error_validator(|_, _| Ok(()));
        let report = runner.run(&node(
            "functions: {parse: ''}\nonError: validate\ncall: [parse, '42']\n",
        ));
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.contains("did not fail"));
    }

    #[test]
    fn test_policy_inherited_and_overridden() {
        let r = registry();
        let report = run(
            &node(
                r#"
functions: {parse: ''}
onError: succeed
subtests:
  - call: [parse, abc]
  - name: override
    onError: fail
    call: [parse, '7']
    want: 7
  - subtests:
      - call: [parse, zzz]
"#,
            ),
            &r,
        );
        assert!(report.is_success(), "failures: {:?}", report.failures());
    }

    #[test]
    fn test_eval_function_validation() {
        let mut r = registry();
        r.register("within_one", |got: i64, want: i64| {
            if (got - want).abs() <= 1 {
                Ok(())
            } else {
                Err(format!("{} is not within 1 of {}", got, want))
            }
        })
        .unwrap();

        let report = run(
            &node(
                r#"
functions: {add: '', within_one: ''}
eval: within_one
subtests:
  - call: [add, 2, 3]
    want: 6
  - name: too_far
    call: [add, 2, 3]
    want: 9
"#,
            ),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].path, "test/too_far");
        assert!(report.failures()[0].message.contains("not within 1"));
    }

    #[test]
    fn test_caller_validator_takes_precedence_over_eval() {
        let mut r = registry();
        r.register("never_called", |_got: Value, _want: Value| -> std::result::Result<(), String> {
            Err("eval should not run".to_string())
        })
        .unwrap();

        let runner = Runner::new(&r).with_validator(|_, _| Ok(()));
        let report = runner.run(&node(
            "functions: {add: '', never_called: ''}\neval: never_called\ncall: [add, 1, 1]\nwant: 99\n",
        ));
        assert!(report.is_success(), "failures: {:?}", report.failures());
    }

    #[test]
    fn test_binding_error_is_call_failure() {
        let r = registry();
        let report = run(
            &node("functions: {add: ''}\ncall: [add, 1, [2]]\nwant: 3\n"),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.starts_with("call add:"));
        assert!(report.failures()[0].message.contains("argument 1"));
    }

    #[test]
    fn test_setup_failure_skips_call_and_subtests_but_not_teardown() {
        let mut r = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let teardowns = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let t = teardowns.clone();
        r.register("boom", || -> std::result::Result<(), String> {
            Err("setup exploded".to_string())
        })
        .unwrap();
        r.register("count", move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        r.register("cleanup", move || {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let report = run(
            &node(
                r#"
functions: {boom: '', count: '', cleanup: ''}
setup: [[boom]]
teardown: [[cleanup]]
call: [count]
subtests:
  - call: [count]
"#,
            ),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.contains("setup boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "call and subtests must not run");
        assert_eq!(teardowns.load(Ordering::SeqCst), 1, "teardown runs exactly once");
    }

    #[test]
    fn test_teardown_failure_is_reported() {
        let mut r = registry();
        r.register("boom", || -> std::result::Result<(), String> {
            Err("cleanup exploded".to_string())
        })
        .unwrap();

        let report = run(
            &node(
                r#"
functions: {add: '', boom: ''}
teardown: [[boom]]
call: [add, 1, 1]
want: 2
"#,
            ),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert!(report.failures()[0].message.contains("teardown boom"));
    }

    #[test]
    fn test_env_scoped_to_node_and_descendants() {
        let r = registry();
        let report = run(
            &node(
                r#"
functions: {getenv: ''}
env: {FIXTEST_RUNNER_SCOPE: outer}
call: [getenv, FIXTEST_RUNNER_SCOPE]
want: outer
subtests:
  - name: inherits
    call: [getenv, FIXTEST_RUNNER_SCOPE]
    want: outer
  - name: overrides
    env: {FIXTEST_RUNNER_SCOPE: inner}
    call: [getenv, FIXTEST_RUNNER_SCOPE]
    want: inner
  - name: restored_after_sibling
    call: [getenv, FIXTEST_RUNNER_SCOPE]
    want: outer
"#,
            ),
            &r,
        );
        assert!(report.is_success(), "failures: {:?}", report.failures());
        assert!(
            std::env::var("FIXTEST_RUNNER_SCOPE").is_err(),
            "env must be restored after the run"
        );
    }

    #[test]
    fn test_env_restored_after_failure() {
        let r = registry();
        let report = run(
            &node(
                r#"
functions: {parse: ''}
env: {FIXTEST_RUNNER_FAILING: set}
call: [parse, abc]
"#,
            ),
            &r,
        );
        assert!(!report.is_success());
        assert!(std::env::var("FIXTEST_RUNNER_FAILING").is_err());
    }

    #[test]
    fn test_grouping_node_runs_children_in_order() {
        let r = registry();
        let report = run(
            &node(
                r#"
functions: {add: ''}
description: pure grouping node
subtests:
  - call: [add, 1, 1]
    want: 2
  - call: [add, 2, 2]
    want: 4
  - call: [add, 3, 3]
    want: 7
"#,
            ),
            &r,
        );
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].path, "test/2");
        assert_eq!(report.executed(), 4);
    }
}
