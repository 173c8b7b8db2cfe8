//! Persistence of a [`HistogramStore`] as a nested JSON directory tree.
//!
//! Each path segment becomes one object level; the leaf object is the
//! serialized accumulator, recognizable by its string-valued `"kind"` key:
//!
//! ```text
//! { "nominal": { "zmm": { "os": { "LoMT": { "m1Pt": { "kind": "h1", ... } } } } } }
//! ```

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tau_core::{Error, Result};

use crate::histogram::Accumulator;
use crate::store::{HistogramStore, PATH_SEPARATOR};

impl HistogramStore {
    /// Nested JSON representation.
    pub fn to_json(&self) -> Result<Value> {
        let mut root = Map::new();
        for (path, acc) in self.iter() {
            let mut node = &mut root;
            let mut segments = path.split(PATH_SEPARATOR).peekable();
            while let Some(seg) = segments.next() {
                if segments.peek().is_none() {
                    if node.contains_key(seg) {
                        return Err(Error::config(format!(
                            "'{path}': segment '{seg}' is both a directory and a histogram"
                        )));
                    }
                    node.insert(seg.to_string(), serde_json::to_value(acc)?);
                    break;
                }
                let child = node.entry(seg.to_string()).or_insert_with(|| Value::Object(Map::new()));
                node = match child {
                    Value::Object(m) if !is_leaf(m) => m,
                    _ => {
                        return Err(Error::config(format!(
                            "'{path}': segment '{seg}' is both a directory and a histogram"
                        )));
                    }
                };
            }
        }
        Ok(Value::Object(root))
    }

    /// Rebuild a store from its nested JSON representation.
    pub fn from_json(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::config("histogram file root must be an object"))?;
        let mut store = HistogramStore::new();
        walk(root, &mut String::new(), &mut store)?;
        Ok(store)
    }

    /// Persist every booked accumulator to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.to_json()?)?;
        fs::write(path, bytes)?;
        log::info!("wrote {} histograms to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a store written by [`HistogramStore::write_json`].
    pub fn read_json(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Self::from_json(&value)
    }
}

fn is_leaf(map: &Map<String, Value>) -> bool {
    matches!(map.get("kind"), Some(Value::String(_)))
}

fn walk(node: &Map<String, Value>, prefix: &mut String, store: &mut HistogramStore) -> Result<()> {
    for (name, child) in node {
        let len = prefix.len();
        if !prefix.is_empty() {
            prefix.push(PATH_SEPARATOR);
        }
        prefix.push_str(name);
        match child {
            Value::Object(m) if is_leaf(m) => {
                let acc: Accumulator = serde_json::from_value(child.clone())?;
                store.insert(prefix, acc)?;
            }
            Value::Object(m) => walk(m, prefix, store)?,
            _ => return Err(Error::config(format!("unexpected non-object at '{prefix}'"))),
        }
        prefix.truncate(len);
    }
    Ok(())
}
