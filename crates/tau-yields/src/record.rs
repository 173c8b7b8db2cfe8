//! The per-region yield record exchanged between tabulation and the
//! efficiency computation.
//!
//! On the wire a record is a flat JSON object:
//!
//! ```json
//! {"value": 812.4, "stat": 9.7, "sys_mes_p": 3.1, "sys_tes_p": 12.0}
//! ```
//!
//! `val` is accepted as an alias of `value` on input. Every other key must be
//! `stat` or start with `sys_`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Prefix of shape-systematic keys.
pub const SYS_PREFIX: &str = "sys_";

/// Yield with its statistical error and one absolute shift per shape
/// systematic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct YieldRecord {
    /// Central yield.
    pub value: f64,
    /// Statistical error.
    pub stat: f64,
    /// Systematic name (without prefix) -> absolute shift.
    pub sys: BTreeMap<String, f64>,
}

impl YieldRecord {
    /// Record without systematics.
    pub fn new(value: f64, stat: f64) -> Self {
        Self { value, stat, sys: BTreeMap::new() }
    }

    /// Add a systematic shift.
    pub fn with_sys(mut self, name: impl Into<String>, shift: f64) -> Self {
        self.sys.insert(name.into(), shift);
        self
    }

    /// Quadrature sum of the systematic shifts.
    pub fn sys_total(&self) -> f64 {
        self.sys.values().map(|s| s * s).sum::<f64>().sqrt()
    }
}

impl TryFrom<BTreeMap<String, f64>> for YieldRecord {
    type Error = String;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut value = None;
        let mut stat = None;
        let mut sys = BTreeMap::new();
        for (key, v) in map {
            match key.as_str() {
                "value" | "val" => {
                    if value.replace(v).is_some() {
                        return Err("both 'value' and 'val' given".to_string());
                    }
                }
                "stat" => stat = Some(v),
                k => match k.strip_prefix(SYS_PREFIX) {
                    Some(name) if !name.is_empty() => {
                        sys.insert(name.to_string(), v);
                    }
                    _ => return Err(format!("unknown yield key '{k}'")),
                },
            }
        }
        Ok(Self {
            value: value.ok_or("missing 'value'")?,
            stat: stat.ok_or("missing 'stat'")?,
            sys,
        })
    }
}

impl From<YieldRecord> for BTreeMap<String, f64> {
    fn from(r: YieldRecord) -> Self {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), r.value);
        map.insert("stat".to_string(), r.stat);
        for (name, v) in r.sys {
            map.insert(format!("{SYS_PREFIX}{name}"), v);
        }
        map
    }
}
