//! Package manifest (`package.json`) model.
//!
//! Only the fields the engine reads or rewrites are typed. Everything else
//! is carried through `extra` untouched so a rewrite does not drop data.
//! A decoded manifest remembers the key order of its file and writes keys
//! back in that order; keys the file did not have go last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TandemError;

/// Name of the script entry used to run a package's tests.
pub const TEST_SCRIPT: &str = "test";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Directory holding the manifest. Never serialized.
    #[serde(skip)]
    pub location: PathBuf,
    /// The decoded file, used only for its key order.
    #[serde(skip)]
    layout: Map<String, Value>,
}

impl Manifest {
    /// Minimal manifest, mostly useful for tests and in-memory workspaces.
    #[must_use]
    pub fn new(name: &str, version: &str, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: BTreeMap::new(),
            scripts: BTreeMap::new(),
            extra: Map::new(),
            location: location.into(),
            layout: Map::new(),
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, name: &str, constraint: &str) -> Self {
        self.dependencies
            .insert(name.to_string(), constraint.to_string());
        self
    }

    #[must_use]
    pub fn with_test_script(mut self, command: &str) -> Self {
        self.scripts
            .insert(TEST_SCRIPT.to_string(), command.to_string());
        self
    }

    /// The command that runs this package's tests, if any.
    #[must_use]
    pub fn test_command(&self) -> Option<&str> {
        self.scripts
            .get(TEST_SCRIPT)
            .map(String::as_str)
            .filter(|cmd| !cmd.trim().is_empty())
    }

    /// Decode a manifest read from `location`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Manifest`] if `raw` is not a valid manifest.
    pub fn from_json(raw: &str, location: &Path) -> Result<Self, TandemError> {
        let invalid = |e: serde_json::Error| TandemError::Manifest {
            path: location.to_path_buf(),
            message: e.to_string(),
        };
        let value: Value = serde_json::from_str(raw).map_err(invalid)?;
        let layout = match &value {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        let mut manifest: Self = serde_json::from_value(value).map_err(invalid)?;
        manifest.location = location.to_path_buf();
        manifest.layout = layout;
        Ok(manifest)
    }

    /// Encode as 4-space indented JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Manifest`] if serialization fails.
    pub fn to_json(&self) -> Result<String, TandemError> {
        let failed = |e: serde_json::Error| TandemError::Manifest {
            path: self.location.clone(),
            message: e.to_string(),
        };
        let value = match serde_json::to_value(self).map_err(failed)? {
            Value::Object(fields) => Value::Object(in_layout_order(&self.layout, fields)),
            other => other,
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser).map_err(failed)?;
        let mut json = String::from_utf8_lossy(&buf).into_owned();
        json.push('\n');
        Ok(json)
    }
}

/// Reorder `fields` to follow `layout`, recursing into nested objects.
fn in_layout_order(layout: &Map<String, Value>, fields: Map<String, Value>) -> Map<String, Value> {
    let mut ordered = Map::new();
    for (key, template) in layout {
        let Some(value) = fields.get(key) else {
            continue;
        };
        let value = match (template, value) {
            (Value::Object(inner_layout), Value::Object(inner)) => {
                Value::Object(in_layout_order(inner_layout, inner.clone()))
            }
            _ => value.clone(),
        };
        ordered.insert(key.clone(), value);
    }
    for (key, value) in fields {
        if !ordered.contains_key(&key) {
            ordered.insert(key, value);
        }
    }
    ordered
}
