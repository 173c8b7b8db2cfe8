//! Baseline object selections shared by the channels.
//!
//! Each selection resolves its columns against a [`Schema`] once, using the
//! ntuple naming convention `<object prefix><quantity>` (`mPt`, `tAbsEta`,
//! `m2DZ`), and then evaluates rows through the resolved [`Field`] handles.

use tau_core::{Field, Result, Row, Schema};

/// Muon kinematic selection: `pt >= threshold`, `|eta| <= 2.1`, `|dz| <= 0.2`.
#[derive(Debug, Clone)]
pub struct MuonSelection {
    pt: Field,
    abs_eta: Field,
    dz: Field,
    pt_threshold: f64,
}

impl MuonSelection {
    /// Resolve the columns of muon `prefix`.
    pub fn new(schema: &Schema, prefix: &str, pt_threshold: f64) -> Result<Self> {
        Ok(Self {
            pt: schema.field(&format!("{prefix}Pt"))?,
            abs_eta: schema.field(&format!("{prefix}AbsEta"))?,
            dz: schema.field(&format!("{prefix}DZ"))?,
            pt_threshold,
        })
    }

    /// True if the muon passes.
    pub fn passes(&self, row: &Row<'_>) -> Result<bool> {
        Ok(row.get(&self.pt)? >= self.pt_threshold
            && row.get(&self.abs_eta)? <= 2.1
            && row.get(&self.dz)?.abs() <= 0.2)
    }
}

/// Hadronic tau kinematic selection: `pt >= 20`, `|eta| <= 2.3`, `|dz| <= 0.2`.
#[derive(Debug, Clone)]
pub struct TauSelection {
    pt: Field,
    abs_eta: Field,
    dz: Field,
}

impl TauSelection {
    /// Resolve the columns of tau `prefix`.
    pub fn new(schema: &Schema, prefix: &str) -> Result<Self> {
        Ok(Self {
            pt: schema.field(&format!("{prefix}Pt"))?,
            abs_eta: schema.field(&format!("{prefix}AbsEta"))?,
            dz: schema.field(&format!("{prefix}DZ"))?,
        })
    }

    /// True if the tau passes.
    pub fn passes(&self, row: &Row<'_>) -> Result<bool> {
        Ok(row.get(&self.pt)? >= 20.0
            && row.get(&self.abs_eta)? <= 2.3
            && row.get(&self.dz)?.abs() <= 0.2)
    }
}

/// Tight PF muon ID with delta-beta relative isolation below 0.1, relaxed to
/// 0.15 in the barrel (`|eta| < 1.479`).
#[derive(Debug, Clone)]
pub struct MuonId {
    pf_id_tight: Field,
    rel_iso: Field,
    abs_eta: Field,
}

impl MuonId {
    /// Resolve the columns of muon `prefix`.
    pub fn new(schema: &Schema, prefix: &str) -> Result<Self> {
        Ok(Self {
            pf_id_tight: schema.field(&format!("{prefix}PFIDTight"))?,
            rel_iso: schema.field(&format!("{prefix}RelPFIsoDB"))?,
            abs_eta: schema.field(&format!("{prefix}AbsEta"))?,
        })
    }

    /// True if the muon is identified and isolated.
    pub fn passes(&self, row: &Row<'_>) -> Result<bool> {
        if !row.flag(&self.pf_id_tight)? {
            return Ok(false);
        }
        let iso = row.get(&self.rel_iso)?;
        Ok(iso < 0.1 || (iso < 0.15 && row.get(&self.abs_eta)? < 1.479))
    }
}

/// Extra-object vetoes: no additional muon, tau or electron.
///
/// There is no b-jet veto: b-jet multiplicity is a region axis.
#[derive(Debug, Clone)]
pub struct Vetoes {
    flags: Vec<Field>,
}

impl Vetoes {
    /// Columns vetoed on by every channel.
    pub const BASE: [&'static str; 3] = ["muVetoPt5", "tauVetoPt20Loose3HitsVtx", "eVetoCicTightIso"];

    /// Resolve the veto columns.
    pub fn new(schema: &Schema) -> Result<Self> {
        let flags = Self::BASE.iter().map(|n| schema.field(n)).collect::<Result<Vec<_>>>()?;
        Ok(Self { flags })
    }

    /// True if no veto fires.
    pub fn passes(&self, row: &Row<'_>) -> Result<bool> {
        for f in &self.flags {
            if row.flag(f)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
