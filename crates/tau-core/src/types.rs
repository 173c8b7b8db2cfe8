//! Common data types shared by the engine and the aggregation layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Discrete outcome of a predicate.
///
/// Continuous cuts never appear here; they are compiled into window
/// predicates that answer with a `Bool` (or a small `Int` bin index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Pass / fail.
    Bool(bool),
    /// Small discrete value (multiplicity, category index).
    Int(i64),
}

impl Value {
    /// Kind of this value.
    pub fn kind(self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
        }
    }
}

/// Which [`Value`] variant a predicate produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Answers with `Value::Bool`.
    Bool,
    /// Answers with `Value::Int`.
    Int,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Label of a systematic variation.
///
/// The label doubles as the first segment of every region path, so it must
/// be non-empty and free of the path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Systematic(String);

impl Systematic {
    /// Label of the unvaried pass.
    pub const NOMINAL: &'static str = "nominal";
    /// Label of the pass reading uncorrected kinematics.
    pub const RAW: &'static str = "raw";

    /// Validate and wrap a label.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() || label.contains('/') || label.contains('#') {
            return Err(Error::config(format!("invalid systematic label '{label}'")));
        }
        Ok(Self(label))
    }

    /// The nominal label.
    pub fn nominal() -> Self {
        Self(Self::NOMINAL.to_string())
    }

    /// Label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the nominal pass.
    pub fn is_nominal(&self) -> bool {
        self.0 == Self::NOMINAL
    }
}

impl TryFrom<String> for Systematic {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Systematic> for String {
    fn from(s: Systematic) -> Self {
        s.0
    }
}

impl fmt::Display for Systematic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a sample is recorded detector data or simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Collision data: one nominal pass, no MC corrections.
    Data,
    /// Monte-Carlo simulation.
    Mc,
}

impl SampleKind {
    /// Infer the kind from a sample name (`data_*` is data).
    pub fn from_sample_name(name: &str) -> Self {
        if name.starts_with("data_") || name == "data" { SampleKind::Data } else { SampleKind::Mc }
    }

    /// True for collision data.
    pub fn is_data(self) -> bool {
        self == SampleKind::Data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systematic_rejects_path_separators() {
        assert!(Systematic::new("mes_p").is_ok());
        assert!(Systematic::new("").is_err());
        assert!(Systematic::new("a/b").is_err());
        assert!(Systematic::new("a#b").is_err());
        assert!(Systematic::nominal().is_nominal());
    }

    #[test]
    fn systematic_serde_validates() {
        let s: Systematic = serde_json::from_str("\"tes_p\"").unwrap();
        assert_eq!(s.as_str(), "tes_p");
        assert!(serde_json::from_str::<Systematic>("\"x/y\"").is_err());
    }

    #[test]
    fn value_untagged_serde() {
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Value::Int(2)).unwrap(), "2");
        let v: Value = serde_json::from_str("1").unwrap();
        assert_eq!(v, Value::Int(1));
        assert_ne!(Value::Bool(true), Value::Int(1));
    }

    #[test]
    fn sample_kind_from_name() {
        assert_eq!(SampleKind::from_sample_name("data_SingleMu_Run2012A"), SampleKind::Data);
        assert_eq!(SampleKind::from_sample_name("Zjets_M50"), SampleKind::Mc);
    }
}
