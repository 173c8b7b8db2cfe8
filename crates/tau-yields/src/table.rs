//! Yield tables: one [`YieldRecord`] per process for a single region and
//! variable, built from the histogram stores the engine writes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Result, SampleKind, Systematic};
use tau_hist::HistogramStore;

use crate::measured::Measured;
use crate::record::YieldRecord;

/// Key of the observed-data entry.
pub const DATA: &str = "data";
/// Key of the summed-expectation entry.
pub const BKG_SUM: &str = "bkg_sum";

/// Histograms of one process.
///
/// Several inputs may share a `name` (e.g. the diboson samples); their
/// yields are summed before the systematic shifts are taken.
#[derive(Debug, Clone)]
pub struct SampleHistograms {
    /// Process label used as the table key.
    pub name: String,
    /// Data or simulation.
    pub kind: SampleKind,
    /// The engine output for this sample.
    pub store: HistogramStore,
}

impl SampleHistograms {
    /// Bundle a store under a process label; the kind follows the label.
    pub fn new(name: impl Into<String>, store: HistogramStore) -> Self {
        let name = name.into();
        let kind = SampleKind::from_sample_name(&name);
        Self { name, kind, store }
    }
}

/// `process -> record` for one region and variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YieldTable(BTreeMap<String, YieldRecord>);

impl YieldTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, record: YieldRecord) {
        self.0.insert(name.into(), record);
    }

    /// Entry for `name`.
    pub fn get(&self, name: &str) -> Option<&YieldRecord> {
        self.0.get(name)
    }

    /// Entry for `name`, or a configuration error naming it.
    pub fn require(&self, name: &str) -> Result<&YieldRecord> {
        self.get(name).ok_or_else(|| Error::config(format!("yield table has no entry '{name}'")))
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &YieldRecord)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert `bkg_sum`: the sum of every entry except `data` (and any
    /// previous `bkg_sum`), with stat and per-systematic shifts added in
    /// quadrature.
    pub fn add_background_sum(&mut self) {
        let mut sum = YieldRecord::default();
        let mut stat2 = 0.0;
        let mut sys2: BTreeMap<String, f64> = BTreeMap::new();
        for (name, rec) in self.iter() {
            if name == DATA || name == BKG_SUM {
                continue;
            }
            sum.value += rec.value;
            stat2 += rec.stat * rec.stat;
            for (s, v) in &rec.sys {
                *sys2.entry(s.clone()).or_insert(0.0) += v * v;
            }
        }
        sum.stat = stat2.sqrt();
        sum.sys = sys2.into_iter().map(|(k, v)| (k, v.sqrt())).collect();
        self.insert(BKG_SUM, sum);
    }

    /// Every entry as a [`Measured`], tagged `<channel>/<process>`.
    ///
    /// Tables of different channels are independent measurements, so their
    /// components must never share a tag.
    pub fn measured(&self, channel: &str) -> BTreeMap<String, Measured> {
        self.iter().map(|(k, v)| (k.to_string(), Measured::from_record(&format!("{channel}/{k}"), v))).collect()
    }

    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read a table written by [`YieldTable::write`] (or any producer of
    /// the same JSON contract).
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl FromIterator<(String, YieldRecord)> for YieldTable {
    fn from_iter<I: IntoIterator<Item = (String, YieldRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Integral and its error of `<sys>/<region>/<variable>`.
pub fn integral(store: &HistogramStore, sys: &Systematic, region: &str, variable: &str) -> Result<(f64, f64)> {
    let h = store.h1(&format!("{sys}/{region}/{variable}"))?;
    Ok((h.integral(), h.integral_error()))
}

/// Nominal yield of every sample labelled `name` in `region`, summed, with
/// the statistical error tagged `<name>_<region>_stat`.
pub fn process_yield(samples: &[SampleHistograms], name: &str, region: &str, variable: &str) -> Result<Measured> {
    let nominal = Systematic::nominal();
    let mut value = 0.0;
    let mut stat2 = 0.0;
    let mut found = false;
    for s in samples.iter().filter(|s| s.name == name) {
        let (v, e) = integral(&s.store, &nominal, region, variable)?;
        value += v;
        stat2 += e * e;
        found = true;
    }
    if !found {
        return Err(Error::config(format!("no sample labelled '{name}'")));
    }
    Ok(Measured::new(value, stat2.sqrt(), format!("{name}_{region}_stat")))
}

/// Tabulate `region/variable` over every sample.
///
/// `value` and `stat` come from the nominal histogram. For simulated
/// samples each shape systematic `s` contributes `sys_<s>` =
/// |integral(`s/region/variable`) - value|. Data carries no `sys_*` keys.
pub fn tabulate(
    samples: &[SampleHistograms],
    region: &str,
    variable: &str,
    shape_systematics: &[Systematic],
) -> Result<YieldTable> {
    // name -> (kind, value, stat^2, shifted value per systematic)
    let mut sums: BTreeMap<&str, (SampleKind, f64, f64, Vec<f64>)> = BTreeMap::new();
    let shapes: Vec<&Systematic> = shape_systematics.iter().filter(|s| !s.is_nominal()).collect();
    let nominal = Systematic::nominal();
    for s in samples {
        let (value, stat) = integral(&s.store, &nominal, region, variable)?;
        let shifted = if s.kind.is_data() {
            Vec::new()
        } else {
            shapes
                .iter()
                .map(|sys| integral(&s.store, sys, region, variable).map(|(v, _)| v))
                .collect::<Result<Vec<_>>>()?
        };
        match sums.get_mut(s.name.as_str()) {
            Some((kind, v, stat2, sh)) => {
                if *kind != s.kind {
                    return Err(Error::config(format!("process '{}' mixes data and simulation", s.name)));
                }
                *v += value;
                *stat2 += stat * stat;
                sh.iter_mut().zip(&shifted).for_each(|(a, b)| *a += b);
            }
            None => {
                sums.insert(&s.name, (s.kind, value, stat * stat, shifted));
            }
        }
    }

    let mut table = YieldTable::new();
    for (name, (_, value, stat2, shifted)) in sums {
        let mut record = YieldRecord::new(value, stat2.sqrt());
        for (sys, v) in shapes.iter().zip(&shifted) {
            record.sys.insert(sys.to_string(), (v - value).abs());
        }
        log::debug!("{name}: {region}/{variable} = {value} +- {}", record.stat);
        table.insert(name, record);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tau_hist::{BinSpec, FillValue};

    fn store(fills: &[(&str, f64)]) -> HistogramStore {
        let mut s = HistogramStore::new();
        for sys in ["nominal", "tes_p"] {
            s.book(&format!("{sys}/iso/os/pt"), "pt", BinSpec::uniform(10, 0.0, 100.0)).unwrap();
        }
        for (sys, w) in fills {
            let id = s.id(&format!("{sys}/iso/os/pt")).unwrap();
            s.fill(id, &FillValue::X(45.0), Some(*w)).unwrap();
        }
        s
    }

    #[test]
    fn mc_records_carry_shape_shifts() {
        let samples = vec![
            SampleHistograms::new("Z_jets", store(&[("nominal", 2.0), ("nominal", 2.0), ("tes_p", 3.0)])),
            SampleHistograms::new("data", store(&[("nominal", 1.0)])),
        ];
        let sys = [Systematic::new("tes_p").unwrap()];
        let t = tabulate(&samples, "iso/os", "pt", &sys).unwrap();

        let z = t.require("Z_jets").unwrap();
        assert_relative_eq!(z.value, 4.0);
        assert_relative_eq!(z.stat, 8f64.sqrt());
        assert_relative_eq!(z.sys["tes_p"], 1.0);
        assert!(t.require("data").unwrap().sys.is_empty());
    }

    #[test]
    fn same_name_samples_are_merged() {
        let samples = vec![
            SampleHistograms::new("diboson", store(&[("nominal", 1.0)])),
            SampleHistograms::new("diboson", store(&[("nominal", 2.0)])),
        ];
        let t = tabulate(&samples, "iso/os", "pt", &[]).unwrap();
        assert_eq!(t.len(), 1);
        assert_relative_eq!(t.require("diboson").unwrap().value, 3.0);
    }

    #[test]
    fn missing_histogram_is_an_error() {
        let samples = vec![SampleHistograms::new("Z_jets", store(&[]))];
        assert!(tabulate(&samples, "iso/ss", "pt", &[]).is_err());
        assert!(tabulate(&samples, "iso/os", "pt", &[Systematic::new("jes_p").unwrap()]).is_err());
    }

    #[test]
    fn background_sum_adds_in_quadrature() {
        let mut t = YieldTable::new();
        t.insert("data", YieldRecord::new(100.0, 10.0));
        t.insert("Z_jets", YieldRecord::new(60.0, 3.0).with_sys("tes_p", 6.0));
        t.insert("ttbar", YieldRecord::new(30.0, 4.0).with_sys("tes_p", 8.0).with_sys("jes_p", 1.0));
        t.add_background_sum();
        let b = t.require(BKG_SUM).unwrap();
        assert_relative_eq!(b.value, 90.0);
        assert_relative_eq!(b.stat, 5.0);
        assert_relative_eq!(b.sys["tes_p"], 10.0);
        assert_relative_eq!(b.sys["jes_p"], 1.0);

        // recomputing ignores the previous sum
        t.add_background_sum();
        assert_relative_eq!(t.require(BKG_SUM).unwrap().value, 90.0);
    }
}
