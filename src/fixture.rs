//! Fixture tree model: declarative test cases and their structural validation
//!
//! A fixture decodes into a recursive [`TestNode`] tree. Nodes must be
//! initialized through [`TestNode::init`] before execution; the loader does
//! this for trees read from disk. Initialization assigns default names,
//! threads inherited function declarations down the tree, and collects every
//! structural problem it finds instead of stopping at the first one.

use crate::error::{Error, Result};
use crate::value::kind;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A named invocation: function name plus fixture-decoded arguments.
///
/// Encoded in fixtures as a sequence whose first element is the function
/// name: `["add", 2, 3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Name of the registered function to invoke
    pub function: String,
    /// Arguments, still in decoded form
    pub args: Vec<Value>,
}

impl Call {
    /// Build a call in memory.
    pub fn new(function: impl Into<String>, args: Vec<Value>) -> Self {
        Call {
            function: function.into(),
            args,
        }
    }
}

impl<'de> Deserialize<'de> for Call {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<Value>::deserialize(deserializer)?;
        let mut items = items.into_iter();
        match items.next() {
            Some(Value::String(function)) => Ok(Call {
                function,
                args: items.collect(),
            }),
            Some(other) => Err(de::Error::custom(format!(
                "call must start with a function name, got {}",
                kind(&other)
            ))),
            None => Err(de::Error::custom("call cannot be empty")),
        }
    }
}

impl Serialize for Call {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(1 + self.args.len()))?;
        seq.serialize_element(&self.function)?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

/// Error-handling policy for the call under test.
///
/// Inherited from the nearest ancestor that sets it; the tree root defaults
/// to [`OnError::Fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// A call failure fails the node; otherwise the result is validated
    Fail,
    /// The node passes only if the call failed; validation is skipped
    Succeed,
    /// The call must fail and its failure is handed to the error validator
    Validate,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Fail
    }
}

/// One node of a fixture tree
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestNode {
    /// Node identifier, also the subtest label. Assigned from the sibling
    /// index or the source filename when the fixture omits it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Human-readable documentation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Function names this node and its descendants may call, with
    /// descriptions. A non-empty mapping replaces the inherited one for the
    /// whole subtree.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, String>,

    /// Environment variables set for this node and its descendants, restored
    /// when the node's scope ends
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Calls executed before the primary call, in order; a failure is fatal
    /// to the node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<Call>,

    /// Calls executed after the primary call and subtests, unconditionally
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<Call>,

    /// The invocation under test; absent for pure grouping nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<Call>,

    /// Expected result, meaningless without `call`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub want: Option<Value>,

    /// Error-handling policy, inherited when unset
    #[serde(default, rename = "onError", skip_serializing_if = "Option::is_none")]
    pub on_error: Option<OnError>,

    /// Name of a custom comparison function, inherited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<String>,

    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtests: Vec<TestNode>,
}

impl TestNode {
    /// Initialize and validate a tree before execution.
    ///
    /// `default_name` names the root when the fixture left it unnamed (the
    /// loader passes the file stem). Missing subtest names become the
    /// 0-based sibling index. Every structural problem in the whole tree is
    /// collected and returned together as one [`Error::Structural`].
    ///
    /// Only needed for trees constructed in memory; [`crate::read_file`] and
    /// [`crate::read_dir`] call it themselves.
    pub fn init(&mut self, default_name: &str) -> Result<()> {
        if self.name.is_empty() {
            if default_name.is_empty() {
                return Err(Error::Structural(vec![
                    "no name for top-level test".to_string(),
                ]));
            }
            self.name = default_name.to_string();
        }

        let mut issues = Vec::new();
        let inherited = BTreeMap::new();
        self.check("", &inherited, &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Structural(issues))
        }
    }

    fn check(
        &mut self,
        prefix: &str,
        inherited: &BTreeMap<String, String>,
        issues: &mut Vec<String>,
    ) {
        let path = join_path(prefix, &self.name);

        if self.want.is_some() && self.call.is_none() {
            issues.push(format!("{}: test has 'want' but no 'call'", path));
        }
        if self.call.is_none() && self.subtests.is_empty() {
            issues.push(format!("{}: test has no call and no subtests", path));
        }

        // Nearest enclosing declaration set: own mapping if present, else the
        // inherited one.
        let declared = if self.functions.is_empty() {
            inherited
        } else {
            &self.functions
        };

        for (call, role) in self
            .setup
            .iter()
            .map(|c| (c, "setup"))
            .chain(self.call.iter().map(|c| (c, "call")))
            .chain(self.teardown.iter().map(|c| (c, "teardown")))
        {
            if !declared.contains_key(&call.function) {
                issues.push(format!(
                    "{}: {} references undeclared function '{}'",
                    path, role, call.function
                ));
            }
        }
        if let Some(eval) = &self.eval {
            if !declared.contains_key(eval) {
                issues.push(format!(
                    "{}: eval references undeclared function '{}'",
                    path, eval
                ));
            }
        }

        let mut seen = BTreeSet::new();
        for (i, subtest) in self.subtests.iter_mut().enumerate() {
            if subtest.name.is_empty() {
                subtest.name = i.to_string();
            }
            if !seen.insert(subtest.name.clone()) {
                issues.push(format!(
                    "{}: duplicate subtest name '{}'",
                    path, subtest.name
                ));
            }
            subtest.check(&path, declared, issues);
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
