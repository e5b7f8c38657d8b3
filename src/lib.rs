//! fixtest - data-driven test engine for declarative fixtures
//!
//! Test inputs, expected outputs, and test metadata live in YAML or JSON
//! fixture files instead of code. This crate turns such a fixture into a
//! recursive tree of named test cases and executes it against functions the
//! calling test program registers by name.
//!
//! # Architecture
//!
//! - [`Registry`] binds string names to host functions of mixed signatures
//!   and exposes one uniform `invoke(name, args)` entry point
//! - [`FromValue`] / [`IntoValue`] adapt decoded fixture values to concrete
//!   argument and return types at the registry boundary
//! - [`TestNode`] is the recursive fixture model; its `init` pass collects
//!   every structural problem in a tree before anything runs
//! - [`Runner`] walks the tree depth-first with setup/teardown, scoped
//!   environment overrides, and inherited error policy
//! - [`read_file`] / [`read_dir`] load fixture files into initialized trees
//!
//! # Example
//!
//! ```
//! use fixtest::{Registry, Runner, TestNode};
//!
//! let mut registry = Registry::new();
//! registry.register("add", |a: i64, b: i64| a + b)?;
//!
//! let mut test: TestNode = serde_yaml::from_str(r#"
//! name: addition
//! functions:
//!   add: adds two integers
//! subtests:
//!   - call: [add, 2, 3]
//!     want: 5
//!   - call: [add, -1, 1]
//!     want: 0
//! "#).unwrap();
//! test.init("")?;
//!
//! let report = Runner::new(&registry).run(&test);
//! assert!(report.is_success());
//! # Ok::<(), fixtest::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod fixture;
mod loader;
mod registry;
mod runner;
mod value;

pub use error::{Error, Result};
pub use fixture::{Call, OnError, TestNode};
pub use loader::{read_dir, read_file};
pub use registry::{Callable, IntoCallable, Outcome, Registry};
pub use runner::{run, ErrorValidator, Failure, Reporter, RunReport, Runner, ValueValidator};
pub use value::{FromValue, IntoValue};

/// Initialize logging for the engine
///
/// This should be called once at startup by binaries that want tracing
/// output; tests and library consumers can skip it or install their own
/// subscriber.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();

    tracing::info!("fixtest initialized");
    Ok(())
}
