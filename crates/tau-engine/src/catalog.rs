//! Region catalog: the flat mapping `region path -> required predicate values`.
//!
//! Regions are generated by crossing orthogonal axes (object ID x sign x
//! kinematic window x extra bins) for every systematic label. Every region
//! path starts with its systematic label, `nominal` included:
//!
//! ```text
//! nominal/LooseIso/os/LoMT/bjets0
//! mes_p/QCD/ss/HiMT/bjets1
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use tau_core::{Error, Result, Systematic, Value};

use crate::predicate::{PredicateId, PredicateRegistry, PredicateValues};

/// Required predicate values for one region.
///
/// `None` is a wildcard: the predicate does not constrain membership. This is
/// distinct from `Some(Value::Bool(false))`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegionSpec(BTreeMap<String, Option<Value>>);

impl RegionSpec {
    /// Empty spec (matches every event).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `predicate == value`.
    pub fn require(mut self, predicate: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(predicate.into(), Some(value.into()));
        self
    }

    /// Mention `predicate` without constraining it.
    pub fn any(mut self, predicate: impl Into<String>) -> Self {
        self.0.insert(predicate.into(), None);
        self
    }

    /// Replace the entry for `predicate`.
    pub fn set(&mut self, predicate: impl Into<String>, value: Option<Value>) {
        self.0.insert(predicate.into(), value);
    }

    /// Entry for `predicate`; the outer `None` means "not mentioned".
    pub fn get(&self, predicate: &str) -> Option<Option<Value>> {
        self.0.get(predicate).copied()
    }

    /// Entries in predicate-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<Value>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of entries, wildcards included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the spec has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add the entries of `other`; a predicate given two different values is
    /// an ambiguous combination and fails.
    fn merge_strict(&mut self, other: &RegionSpec, context: &str) -> Result<()> {
        for (name, value) in &other.0 {
            match self.0.get(name) {
                Some(existing) if existing != value => {
                    return Err(Error::config(format!(
                        "region '{context}': predicate '{name}' set to both {} and {} \
                         (use an override to replace an axis value)",
                        show(*existing),
                        show(*value)
                    )));
                }
                _ => {
                    self.0.insert(name.clone(), *value);
                }
            }
        }
        Ok(())
    }

    /// Resolve predicate names against a registry.
    pub fn compile(&self, registry: &PredicateRegistry, path: &str) -> Result<CompiledSpec> {
        let mut constraints = Vec::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let id = registry.id(name).ok_or_else(|| {
                Error::config(format!("region '{path}': unknown predicate '{name}'"))
            })?;
            check_kind(registry, id, name, *value, path)?;
            // Wildcards never reach the per-event loop.
            if let Some(v) = value {
                constraints.push(Constraint { id, name: name.clone(), value: *v });
            }
        }
        Ok(CompiledSpec { constraints })
    }
}

/// A required value must have the kind its predicate answers with, or the
/// region could never match.
fn check_kind(
    registry: &PredicateRegistry,
    id: PredicateId,
    name: &str,
    value: Option<Value>,
    path: &str,
) -> Result<()> {
    let declared = registry.kind(id);
    match value {
        Some(v) if v.kind() != declared => Err(Error::config(format!(
            "region '{path}': predicate '{name}' answers with {declared}, but {v} is required"
        ))),
        _ => Ok(()),
    }
}

fn show(v: Option<Value>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "any".to_string())
}

#[derive(Debug, Clone)]
struct Constraint {
    id: PredicateId,
    name: String,
    value: Value,
}

/// A [`RegionSpec`] with names resolved to predicate ids and wildcards dropped.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    constraints: Vec<Constraint>,
}

impl CompiledSpec {
    /// True if every constrained predicate has its required value.
    ///
    /// A constrained predicate with no computed value is a configuration
    /// error naming `path`, never a silent non-match.
    pub fn matches(&self, values: &PredicateValues, path: &str) -> Result<bool> {
        for c in &self.constraints {
            match values.get(c.id) {
                Some(v) if v == c.value => {}
                Some(_) => return Ok(false),
                None => {
                    return Err(Error::config(format!(
                        "problem in region '{path}': predicate '{}' was not computed",
                        c.name
                    )));
                }
            }
        }
        Ok(true)
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct Region {
    /// Full path, systematic label first.
    pub path: String,
    /// Systematic pass the region belongs to.
    pub systematic: Systematic,
    /// Membership requirements.
    pub spec: RegionSpec,
}

/// Immutable catalog of regions keyed by path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionCatalog {
    regions: BTreeMap<String, Region>,
}

impl RegionCatalog {
    /// Add a region; a path produced twice is a configuration error.
    pub fn insert(&mut self, systematic: &Systematic, suffix: &str, spec: RegionSpec) -> Result<()> {
        let path = format!("{systematic}/{suffix}");
        if self.regions.contains_key(&path) {
            return Err(Error::config(format!("duplicate region path '{path}'")));
        }
        self.regions.insert(path.clone(), Region { path, systematic: systematic.clone(), spec });
        Ok(())
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region at `path`.
    pub fn get(&self, path: &str) -> Option<&Region> {
        self.regions.get(path)
    }

    /// Regions in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Regions of one systematic pass, in path order.
    pub fn for_systematic<'a>(&'a self, sys: &'a Systematic) -> impl Iterator<Item = &'a Region> {
        self.regions.values().filter(move |r| &r.systematic == sys)
    }

    /// Check that every predicate named by any region is registered and
    /// that every required value has the predicate's kind.
    pub fn validate(&self, registry: &PredicateRegistry) -> Result<()> {
        for r in self.regions.values() {
            for (name, value) in r.spec.iter() {
                let Some(id) = registry.id(name) else {
                    return Err(Error::config(format!(
                        "region '{}': unknown predicate '{name}'",
                        r.path
                    )));
                };
                check_kind(registry, id, name, value, &r.path)?;
            }
        }
        Ok(())
    }
}

/// One bin of an axis: a path label and the requirements it adds.
#[derive(Debug, Clone)]
pub struct AxisBin {
    /// Path segment.
    pub label: String,
    /// Requirements contributed by this bin.
    pub spec: RegionSpec,
}

/// An orthogonal selection axis.
#[derive(Debug, Clone)]
pub struct Axis {
    /// Axis name (diagnostics only).
    pub name: String,
    /// Bins; by construction each event falls in at most one.
    pub bins: Vec<AxisBin>,
}

impl Axis {
    /// Empty axis.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), bins: Vec::new() }
    }

    /// Append a bin.
    pub fn bin(mut self, label: impl Into<String>, spec: RegionSpec) -> Self {
        self.bins.push(AxisBin { label: label.into(), spec });
        self
    }

    /// Boolean axis on `predicate`: `on_true` when it holds, `on_false` otherwise.
    pub fn boolean(predicate: &str, on_true: &str, on_false: &str) -> Self {
        Axis::new(predicate)
            .bin(on_true, RegionSpec::new().require(predicate, true))
            .bin(on_false, RegionSpec::new().require(predicate, false))
    }

    /// Count axis on `predicate`: one bin `<prefix><n>` per value.
    pub fn count(predicate: &str, prefix: &str, values: impl IntoIterator<Item = i64>) -> Self {
        values.into_iter().fold(Axis::new(predicate), |axis, n| {
            axis.bin(format!("{prefix}{n}"), RegionSpec::new().require(predicate, n))
        })
    }
}

#[derive(Debug, Clone)]
struct ControlRegion {
    label: String,
    template: String,
    overrides: RegionSpec,
}

/// Builds a [`RegionCatalog`] from a compact axis description.
///
/// The first axis is the object-identification axis. Control regions clone
/// one of its bins under a new label and then *replace* selected entries of
/// the fully crossed spec, e.g. the QCD sideband flips isolation to its
/// complement while reusing the sign and window axes unchanged.
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    object_ids: Vec<AxisBin>,
    axes: Vec<Axis>,
    controls: Vec<ControlRegion>,
    explicit: Vec<(String, RegionSpec)>,
}

impl CatalogBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Object-ID variant `label` requiring `predicate == true`.
    pub fn object_id(self, label: impl Into<String>, predicate: &str) -> Self {
        self.object_id_spec(label, RegionSpec::new().require(predicate, true))
    }

    /// Object-ID variant with arbitrary requirements.
    pub fn object_id_spec(mut self, label: impl Into<String>, spec: RegionSpec) -> Self {
        self.object_ids.push(AxisBin { label: label.into(), spec });
        self
    }

    /// Cross an additional orthogonal axis.
    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    /// Object-ID variant `label` built from variant `template`, with
    /// `overrides` replacing entries after all axes are crossed.
    pub fn control_region(
        mut self,
        label: impl Into<String>,
        template: impl Into<String>,
        overrides: RegionSpec,
    ) -> Self {
        self.controls.push(ControlRegion {
            label: label.into(),
            template: template.into(),
            overrides,
        });
        self
    }

    /// A region outside the cross product, replicated per systematic.
    pub fn region(mut self, suffix: impl Into<String>, spec: RegionSpec) -> Self {
        self.explicit.push((suffix.into(), spec));
        self
    }

    /// Expand into a catalog covering every label in `systematics`.
    pub fn build(&self, systematics: &[Systematic]) -> Result<RegionCatalog> {
        if systematics.is_empty() {
            return Err(Error::config("region catalog needs at least one systematic"));
        }
        let mut variants: Vec<(AxisBin, Option<&RegionSpec>)> =
            self.object_ids.iter().map(|b| (b.clone(), None)).collect();
        for c in &self.controls {
            let template = self.object_ids.iter().find(|b| b.label == c.template).ok_or_else(|| {
                Error::config(format!(
                    "control region '{}' refers to unknown object ID '{}'",
                    c.label, c.template
                ))
            })?;
            variants.push((
                AxisBin { label: c.label.clone(), spec: template.spec.clone() },
                Some(&c.overrides),
            ));
        }

        let mut suffixes: Vec<(String, RegionSpec)> = Vec::new();
        for (variant, overrides) in &variants {
            let mut partial = vec![(variant.label.clone(), variant.spec.clone())];
            for axis in &self.axes {
                let mut next = Vec::with_capacity(partial.len() * axis.bins.len());
                for (path, spec) in &partial {
                    for bin in &axis.bins {
                        let path = format!("{path}/{}", bin.label);
                        let mut spec = spec.clone();
                        // Overridden predicates may legitimately disagree with an axis.
                        let mut contribution = bin.spec.clone();
                        if let Some(ov) = overrides {
                            contribution.0.retain(|k, _| ov.get(k).is_none());
                        }
                        spec.merge_strict(&contribution, &path)?;
                        next.push((path, spec));
                    }
                }
                partial = next;
            }
            if let Some(ov) = overrides {
                for (_, spec) in partial.iter_mut() {
                    for (name, value) in ov.iter() {
                        spec.set(name, value);
                    }
                }
            }
            suffixes.extend(partial);
        }
        suffixes.extend(self.explicit.iter().cloned());

        let mut catalog = RegionCatalog::default();
        for sys in systematics {
            for (suffix, spec) in &suffixes {
                catalog.insert(sys, suffix, spec.clone())?;
            }
        }
        log::debug!(
            "built region catalog: {} regions over {} systematics",
            catalog.len(),
            systematics.len()
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tau_core::ValueKind;

    fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
            .object_id("LooseIso", "LooseIso")
            .object_id("TightIso", "TightIso")
            .axis(Axis::boolean("os", "os", "ss"))
            .axis(Axis::boolean("mt_low", "LoMT", "HiMT"))
            .axis(Axis::count("bjets", "bjets", 0..3))
    }

    #[test]
    fn cross_product_paths() {
        let cat = builder().build(&[Systematic::nominal()]).unwrap();
        assert_eq!(cat.len(), 2 * 2 * 2 * 3);
        let r = cat.get("nominal/LooseIso/os/LoMT/bjets0").unwrap();
        assert_eq!(r.spec.get("LooseIso"), Some(Some(Value::Bool(true))));
        assert_eq!(r.spec.get("os"), Some(Some(Value::Bool(true))));
        assert_eq!(r.spec.get("mt_low"), Some(Some(Value::Bool(true))));
        assert_eq!(r.spec.get("bjets"), Some(Some(Value::Int(0))));
        assert!(cat.get("nominal/TightIso/ss/HiMT/bjets2").is_some());
    }

    #[test]
    fn systematic_is_first_segment() {
        let systs = [Systematic::nominal(), Systematic::new("mes_p").unwrap()];
        let cat = builder().build(&systs).unwrap();
        assert_eq!(cat.len(), 48);
        assert_eq!(cat.for_systematic(&systs[1]).count(), 24);
        assert!(cat.for_systematic(&systs[1]).all(|r| r.path.starts_with("mes_p/")));
    }

    #[test]
    fn build_is_deterministic() {
        let a = builder().build(&[Systematic::nominal()]).unwrap();
        let b = builder().build(&[Systematic::nominal()]).unwrap();
        let pa: Vec<_> = a.iter().map(|r| (&r.path, &r.spec)).collect();
        let pb: Vec<_> = b.iter().map(|r| (&r.path, &r.spec)).collect();
        assert_eq!(pa, pb);
    }

    #[test]
    fn duplicate_paths_fail_fast() {
        let err = CatalogBuilder::new()
            .object_id("LooseIso", "LooseIso")
            .object_id("LooseIso", "LooseIsoV2")
            .build(&[Systematic::nominal()])
            .unwrap_err();
        assert!(err.to_string().contains("nominal/LooseIso"));

        let err = CatalogBuilder::new()
            .object_id("zmm", "zmm")
            .axis(Axis::new("w").bin("lo", RegionSpec::new()).bin("lo", RegionSpec::new()))
            .build(&[Systematic::nominal()])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate region path 'nominal/zmm/lo'"));
    }

    #[test]
    fn control_region_overrides_replace() {
        let cat = builder()
            .control_region("QCD", "LooseIso", RegionSpec::new().require("LooseIso", false))
            .build(&[Systematic::nominal()])
            .unwrap();
        let qcd = cat.get("nominal/QCD/ss/LoMT/bjets1").unwrap();
        assert_eq!(qcd.spec.get("LooseIso"), Some(Some(Value::Bool(false))));
        assert_eq!(qcd.spec.get("os"), Some(Some(Value::Bool(false))));
        // the template keeps its own value
        let iso = cat.get("nominal/LooseIso/ss/LoMT/bjets1").unwrap();
        assert_eq!(iso.spec.get("LooseIso"), Some(Some(Value::Bool(true))));
    }

    #[test]
    fn override_may_wildcard_an_axis_predicate() {
        let cat = builder()
            .control_region("QCDany", "LooseIso", RegionSpec::new().any("os"))
            .build(&[Systematic::nominal()])
            .unwrap();
        let r = cat.get("nominal/QCDany/ss/LoMT/bjets0").unwrap();
        assert_eq!(r.spec.get("os"), Some(None));
    }

    #[test]
    fn ambiguous_axis_overlap_fails() {
        let err = CatalogBuilder::new()
            .object_id_spec("osOnly", RegionSpec::new().require("os", true))
            .axis(Axis::boolean("os", "os", "ss"))
            .build(&[Systematic::nominal()])
            .unwrap_err();
        assert!(err.to_string().contains("osOnly/ss"));
    }

    #[test]
    fn unknown_control_template() {
        assert!(
            builder()
                .control_region("QCD", "NoSuchIso", RegionSpec::new())
                .build(&[Systematic::nominal()])
                .is_err()
        );
    }

    #[test]
    fn explicit_regions_are_replicated() {
        let cat = CatalogBuilder::new()
            .region("sig", RegionSpec::new().require("os", true))
            .build(&[Systematic::nominal(), Systematic::new("tes_p").unwrap()])
            .unwrap();
        assert!(cat.get("nominal/sig").is_some());
        assert!(cat.get("tes_p/sig").is_some());
    }

    #[test]
    fn validate_reports_unknown_predicates() {
        let cat = builder().build(&[Systematic::nominal()]).unwrap();
        let mut reg = PredicateRegistry::new();
        reg.invariant("LooseIso", ValueKind::Bool, |_| Ok(Value::Bool(true))).unwrap();
        let err = cat.validate(&reg).unwrap_err();
        assert!(err.to_string().contains("unknown predicate"));
    }

    #[test]
    fn wildcard_matches_both_outcomes() {
        let mut reg = PredicateRegistry::new();
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let f = flag.clone();
        reg.invariant("os", ValueKind::Bool, move |_| {
            Ok(f.load(std::sync::atomic::Ordering::SeqCst).into())
        })
        .unwrap();
        let concrete = RegionSpec::new().require("os", true).compile(&reg, "c").unwrap();
        let wildcard = RegionSpec::new().any("os").compile(&reg, "w").unwrap();

        let row_vals: [f64; 0] = [];
        let row = tau_core::Row::new(0, &row_vals);
        let mut v = PredicateValues::default();
        for outcome in [true, false] {
            flag.store(outcome, std::sync::atomic::Ordering::SeqCst);
            reg.evaluate_invariant(&row, &mut v).unwrap();
            assert!(wildcard.matches(&v, "w").unwrap());
            assert_eq!(concrete.matches(&v, "c").unwrap(), outcome);
        }
    }

    #[test]
    fn uncomputed_predicate_is_an_error_naming_the_region() {
        let mut reg = PredicateRegistry::new();
        reg.systematic("mt_low", ValueKind::Bool, |_, _| Ok(Value::Bool(true))).unwrap();
        let spec = RegionSpec::new().require("mt_low", true).compile(&reg, "nominal/r").unwrap();
        let vals: [f64; 0] = [];
        let mut v = PredicateValues::default();
        reg.evaluate_invariant(&tau_core::Row::new(0, &vals), &mut v).unwrap();
        let err = spec.matches(&v, "nominal/r").unwrap_err();
        assert!(err.to_string().contains("nominal/r"));
    }

    #[test]
    fn value_kind_mismatch_fails_validation() {
        let mut reg = PredicateRegistry::new();
        reg.invariant("bjets", ValueKind::Int, |_| Ok(Value::Int(0))).unwrap();
        let cat = CatalogBuilder::new()
            .region("tagged", RegionSpec::new().require("bjets", true))
            .build(&[Systematic::nominal()])
            .unwrap();
        let err = cat.validate(&reg).unwrap_err();
        assert!(err.to_string().contains("nominal/tagged"), "{err}");

        let err = RegionSpec::new().require("bjets", true).compile(&reg, "nominal/tagged").unwrap_err();
        assert!(err.to_string().contains("bjets"));
        assert!(RegionSpec::new().require("bjets", 1i64).compile(&reg, "nominal/tagged").is_ok());
        assert!(RegionSpec::new().any("bjets").compile(&reg, "nominal/tagged").is_ok());
    }
}
