//! Fixture loading from YAML and JSON files
//!
//! `read_file` decodes one fixture into an initialized [`TestNode`];
//! `read_dir` aggregates every fixture file in a directory as subtests of a
//! synthetic root named after the directory. Structural problems are
//! collected per file and surfaced before anything executes.

use crate::error::{Error, Result};
use crate::fixture::TestNode;
use std::fs;
use std::path::Path;
use tracing::debug;

const FIXTURE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Read a fixture tree from a YAML or JSON file.
///
/// If the fixture doesn't name its root, the name defaults to the file stem.
/// The returned tree is initialized and structurally valid.
pub fn read_file(path: impl AsRef<Path>) -> Result<TestNode> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let mut node: TestNode = match extension {
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| parse_error(path, e))?,
        "json" => serde_json::from_str(&text).map_err(|e| parse_error(path, e))?,
        other => {
            return Err(Error::Parse {
                path: path.display().to_string(),
                message: format!("unsupported fixture extension '{}'", other),
            })
        }
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    node.init(stem).map_err(|e| match e {
        Error::Structural(msgs) => Error::Structural(
            msgs.into_iter()
                .map(|m| format!("{}: {}", path.display(), m))
                .collect(),
        ),
        other => other,
    })?;

    debug!(path = %path.display(), test = %node.name, "loaded fixture");
    Ok(node)
}

/// Read every fixture file in a directory (non-recursive), ordered by
/// filename, as subtests of a root named after the directory.
pub fn read_dir(dir: impl AsRef<Path>) -> Result<TestNode> {
    let dir = dir.as_ref();

    let mut paths: Vec<_> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| FIXTURE_EXTENSIONS.contains(&e))
        })
        .collect();
    paths.sort();

    let mut subtests = Vec::with_capacity(paths.len());
    for path in paths {
        subtests.push(read_file(&path)?);
    }

    let name = dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut root = TestNode {
        name: name.to_string(),
        description: format!("test files from {}", dir.display()),
        subtests,
        ..Default::default()
    };
    root.init(name)?;
    Ok(root)
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
