//! Simulation-to-data corrections entering the event weight.
//!
//! Tables are plain binned lookups loaded from the run configuration:
//! pileup reweighting in the true number of interactions, and a muon
//! ID/isolation scale factor in `(pt, |eta|)`. Values outside a table are 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Field, Result, Row, SampleKind, Schema, Systematic};

/// Index of the bin of `edges` containing `x`, `None` outside.
fn lookup(edges: &[f64], x: f64) -> Option<usize> {
    if x.is_nan() || x < edges[0] || x >= edges[edges.len() - 1] {
        return None;
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}

fn check_edges(what: &str, edges: &[f64], n_values: usize) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::config(format!("{what}: need at least two bin edges")));
    }
    if edges.windows(2).any(|w| w[0].partial_cmp(&w[1]) != Some(std::cmp::Ordering::Less)) {
        return Err(Error::config(format!("{what}: bin edges must be strictly increasing")));
    }
    if n_values != edges.len() - 1 {
        return Err(Error::config(format!(
            "{what}: {} edges need {} values, got {n_values}",
            edges.len(),
            edges.len() - 1
        )));
    }
    Ok(())
}

/// Binned weight as a function of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Bin edges, strictly increasing.
    pub edges: Vec<f64>,
    /// One weight per bin.
    pub weights: Vec<f64>,
}

impl WeightTable {
    /// Validate shape and values.
    pub fn validate(&self, what: &str) -> Result<()> {
        check_edges(what, &self.edges, self.weights.len())?;
        if let Some(w) = self.weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::config(format!("{what}: weight {w} is not finite and non-negative")));
        }
        Ok(())
    }

    /// Weight at `x`; 1 outside the table.
    pub fn weight(&self, x: f64) -> f64 {
        lookup(&self.edges, x).map(|b| self.weights[b]).unwrap_or(1.0)
    }
}

/// Pileup reweighting with optional per-systematic replacement tables
/// (e.g. `pu_p`/`pu_m` for shifted minimum-bias cross sections).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PileupConfig {
    /// Table used for `nominal` and every label without its own table.
    #[serde(flatten)]
    pub nominal: WeightTable,
    /// Systematic label -> replacement table.
    #[serde(default)]
    pub variations: BTreeMap<String, WeightTable>,
}

impl PileupConfig {
    /// Table for one systematic pass.
    pub fn table(&self, sys: &Systematic) -> &WeightTable {
        self.variations.get(sys.as_str()).unwrap_or(&self.nominal)
    }
}

/// Muon scale factor binned in `(pt, |eta|)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactorTable {
    /// Edges in muon pt.
    pub pt_edges: Vec<f64>,
    /// Edges in muon |eta|.
    pub eta_edges: Vec<f64>,
    /// Factors, `values[ipt][ieta]`.
    pub values: Vec<Vec<f64>>,
}

impl ScaleFactorTable {
    /// Validate shape.
    pub fn validate(&self) -> Result<()> {
        check_edges("muon scale factors (pt)", &self.pt_edges, self.values.len())?;
        for row in &self.values {
            check_edges("muon scale factors (|eta|)", &self.eta_edges, row.len())?;
        }
        Ok(())
    }

    /// Factor at `(pt, |eta|)`; 1 outside the table.
    pub fn factor(&self, pt: f64, abs_eta: f64) -> f64 {
        match (lookup(&self.pt_edges, pt), lookup(&self.eta_edges, abs_eta)) {
            (Some(i), Some(j)) => self.values[i][j],
            _ => 1.0,
        }
    }
}

/// Configured corrections, before binding to a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McCorrections {
    /// Pileup reweighting; none means weight 1.
    #[serde(default)]
    pub pileup: Option<PileupConfig>,
    /// Muon ID/isolation scale factor; none means 1.
    #[serde(default)]
    pub muon_sf: Option<ScaleFactorTable>,
}

impl McCorrections {
    /// Validate every configured table.
    pub fn validate(&self) -> Result<()> {
        if let Some(pu) = &self.pileup {
            pu.nominal.validate("pileup")?;
            for (label, t) in &pu.variations {
                t.validate(&format!("pileup ({label})"))?;
            }
        }
        if let Some(sf) = &self.muon_sf {
            sf.validate()?;
        }
        Ok(())
    }

    /// True when `sys` only changes the event weight: it names a pileup
    /// variation, so the kinematic columns stay nominal.
    pub fn is_weight_only(&self, sys: &Systematic) -> bool {
        self.pileup.as_ref().is_some_and(|pu| pu.variations.contains_key(sys.as_str()))
    }

    /// Resolve the columns the corrections read for a sample of `kind`
    /// whose muons carry `muon_prefixes`.
    pub fn bind(&self, schema: &Schema, kind: SampleKind, muon_prefixes: &[&str]) -> Result<EventWeight> {
        self.validate()?;
        if kind.is_data() {
            return Ok(EventWeight { kind, pileup: None, muon_sf: None });
        }
        let pileup = match &self.pileup {
            Some(cfg) => Some((schema.field("nTruePU")?, cfg.clone())),
            None => None,
        };
        let muon_sf = match &self.muon_sf {
            Some(table) => {
                let muons = muon_prefixes
                    .iter()
                    .map(|p| {
                        Ok((schema.field(&format!("{p}Pt"))?, schema.field(&format!("{p}AbsEta"))?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some((muons, table.clone()))
            }
            None => None,
        };
        Ok(EventWeight { kind, pileup, muon_sf })
    }
}

/// Corrections bound to one sample's schema.
#[derive(Debug, Clone)]
pub struct EventWeight {
    kind: SampleKind,
    pileup: Option<(Field, PileupConfig)>,
    muon_sf: Option<(Vec<(Field, Field)>, ScaleFactorTable)>,
}

impl EventWeight {
    /// Full event weight under systematic `sys`. Data weighs 1.
    pub fn weight(&self, row: &Row<'_>, sys: &Systematic) -> Result<f64> {
        Ok(self.pileup(row, sys)? * self.without_pileup(row)?)
    }

    /// Pileup factor alone.
    pub fn pileup(&self, row: &Row<'_>, sys: &Systematic) -> Result<f64> {
        match &self.pileup {
            Some((field, cfg)) if !self.kind.is_data() => Ok(cfg.table(sys).weight(row.get(field)?)),
            _ => Ok(1.0),
        }
    }

    /// Event weight with the pileup factor left out.
    pub fn without_pileup(&self, row: &Row<'_>) -> Result<f64> {
        let Some((muons, table)) = &self.muon_sf else {
            return Ok(1.0);
        };
        let mut w = 1.0;
        for (pt, abs_eta) in muons {
            w *= table.factor(row.get(pt)?, row.get(abs_eta)?);
        }
        Ok(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corrections() -> McCorrections {
        let yaml = r#"
pileup:
  edges: [0, 10, 20, 30]
  weights: [0.5, 1.0, 2.0]
  variations:
    pu_p:
      edges: [0, 30]
      weights: [3.0]
muon_sf:
  pt_edges: [20, 50, 1000]
  eta_edges: [0, 1.2, 2.4]
  values: [[0.98, 0.96], [0.99, 0.97]]
"#;
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn lookups_are_flat_outside() {
        let c = corrections();
        let pu = c.pileup.as_ref().unwrap();
        assert_eq!(pu.nominal.weight(5.0), 0.5);
        assert_eq!(pu.nominal.weight(10.0), 1.0);
        assert_eq!(pu.nominal.weight(45.0), 1.0);
        assert_eq!(pu.nominal.weight(-1.0), 1.0);
        let sf = c.muon_sf.as_ref().unwrap();
        assert_eq!(sf.factor(60.0, 1.5), 0.97);
        assert_eq!(sf.factor(10.0, 1.5), 1.0);
    }

    #[test]
    fn bound_weight_follows_systematic() {
        let schema = Schema::new(["nTruePU", "mPt", "mAbsEta"]).unwrap();
        let w = corrections().bind(&schema, SampleKind::Mc, &["m"]).unwrap();
        let vals = [25.0, 30.0, 0.5];
        let row = Row::new(0, &vals);
        assert_relative_eq!(w.weight(&row, &Systematic::nominal()).unwrap(), 2.0 * 0.98);
        assert_relative_eq!(w.weight(&row, &Systematic::new("pu_p").unwrap()).unwrap(), 3.0 * 0.98);
        assert_relative_eq!(w.without_pileup(&row).unwrap(), 0.98);
    }

    #[test]
    fn data_weighs_one_and_needs_no_columns() {
        let schema = Schema::new(["mPt"]).unwrap();
        let w = corrections().bind(&schema, SampleKind::Data, &["m"]).unwrap();
        let vals = [30.0];
        assert_eq!(w.weight(&Row::new(0, &vals), &Systematic::nominal()).unwrap(), 1.0);
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let mut c = corrections();
        c.pileup.as_mut().unwrap().nominal.weights.pop();
        assert!(c.validate().is_err());

        let mut c = corrections();
        c.muon_sf.as_mut().unwrap().pt_edges = vec![50.0, 20.0, 1000.0];
        assert!(c.validate().is_err());
    }
}
