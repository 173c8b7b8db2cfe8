//! Tau identification efficiency from the mu-tau and mu-mu yield tables.
//!
//! The mu-mu channel normalises the Z production rate, so luminosity and
//! muon efficiencies cancel in
//!
//! ```text
//! eff = ((data_mt - bkg_mt) / (data_mm - bkg_mm)) * (mc_mm / mc_mt)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Result};

use crate::measured::Measured;
use crate::table::{BKG_SUM, DATA, YieldTable};

/// Signal process of the mu-tau tables.
pub const MUTAU_SIGNAL: &str = "Z_tautau";
/// Signal process of the mu-mu table.
pub const MUMU_SIGNAL: &str = "Z_jets";
/// Process whose yield carries the sideband extrapolation uncertainty.
pub const QCD: &str = "QCD";
/// Relative uncertainty on the data-driven QCD yield.
pub const QCD_EXTRAPOLATION: f64 = 0.1;
/// Tag namespace of the mu-mu table.
pub const MUMU_CHANNEL: &str = "mm";

/// Tag namespace of the mu-tau table of `object_id`.
pub fn mutau_channel(object_id: &str) -> String {
    format!("mt/{object_id}")
}

/// The yields of one channel in correlated-error form.
#[derive(Debug, Clone)]
pub struct ChannelYields {
    /// Observed events.
    pub data: Measured,
    /// Simulated signal.
    pub signal: Measured,
    /// Every other expected process.
    pub background: Measured,
    /// Total expectation, as tabulated.
    pub expected: Measured,
}

impl ChannelYields {
    /// Split a table into data, signal and background.
    ///
    /// The background is the sum over every entry except `data`, `bkg_sum`
    /// and the signal. When the table has no `bkg_sum` one is computed.
    /// Error components are tagged under `channel`, which must be unique
    /// per table.
    pub fn from_table(table: &YieldTable, channel: &str, signal: &str) -> Result<Self> {
        let mut table = table.clone();
        if table.get(BKG_SUM).is_none() {
            table.add_background_sum();
        }
        let mut entries = table.measured(channel);
        if let Some(qcd) = entries.remove(QCD) {
            let tag = format!("{channel}/qcd_extrapolation_stat");
            entries.insert(QCD.to_string(), qcd.with_relative(QCD_EXTRAPOLATION, tag));
        }

        let take = |entries: &mut BTreeMap<String, Measured>, key: &str| {
            entries.remove(key).ok_or_else(|| Error::config(format!("yield table has no entry '{key}'")))
        };
        let data = take(&mut entries, DATA)?;
        let expected = take(&mut entries, BKG_SUM)?;
        let signal = take(&mut entries, signal)?;
        let background = entries.into_values().sum();
        Ok(Self { data, signal, background, expected })
    }

    /// Observed over expected events.
    pub fn data_mc_ratio(&self) -> Result<Measured> {
        if self.expected.value() == 0.0 {
            return Err(Error::config("data/MC ratio undefined: no expected events"));
        }
        Ok(&self.data / &self.expected)
    }

    /// Background-subtracted data.
    pub fn signal_in_data(&self) -> Measured {
        &self.data - &self.background
    }
}

/// Efficiency of the tau ID measured in `mutau` relative to `mumu`.
pub fn efficiency(mutau: &ChannelYields, mumu: &ChannelYields) -> Result<Measured> {
    let mm_data = mumu.signal_in_data();
    if mm_data.value() == 0.0 {
        return Err(Error::config("efficiency undefined: no background-subtracted mu-mu events"));
    }
    if mutau.signal.value() == 0.0 {
        return Err(Error::config("efficiency undefined: no simulated mu-tau signal"));
    }
    Ok((mutau.signal_in_data() / mm_data) * (&mumu.signal / &mutau.signal))
}

/// A quantity split into statistical and systematic errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Central value.
    pub value: f64,
    /// Quadrature sum of the `stat`-tagged components.
    pub stat: f64,
    /// Quadrature sum of the `sys`-tagged components.
    pub sys: f64,
}

impl From<&Measured> for Summary {
    fn from(m: &Measured) -> Self {
        Self { value: m.value(), stat: m.error_matching("stat"), sys: m.error_matching("sys") }
    }
}

/// One line of the final table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Observed events.
    pub observed: Summary,
    /// Expected events.
    pub expected: Summary,
    /// Observed over expected.
    pub data_mc_ratio: Summary,
    /// Tau ID efficiency (absent for the normalisation channel).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<Summary>,
}

/// Normalisation row plus one row per object ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    /// The mu-mu normalisation.
    pub zmumu: ReportRow,
    /// `object ID -> row`.
    pub object_ids: BTreeMap<String, ReportRow>,
}

/// Build the full report from the mu-mu table and the per-object-ID mu-tau
/// tables.
pub fn report(mumu: &YieldTable, mutau: &BTreeMap<String, YieldTable>) -> Result<EfficiencyReport> {
    let mm = ChannelYields::from_table(mumu, MUMU_CHANNEL, MUMU_SIGNAL)?;
    let zmumu = ReportRow {
        observed: (&mm.data).into(),
        expected: (&mm.expected).into(),
        data_mc_ratio: (&mm.data_mc_ratio()?).into(),
        efficiency: None,
    };

    let mut object_ids = BTreeMap::new();
    for (id, table) in mutau {
        let mt = ChannelYields::from_table(table, &mutau_channel(id), MUTAU_SIGNAL)
            .map_err(|e| Error::config(format!("mu-tau table '{id}': {e}")))?;
        let eff = efficiency(&mt, &mm)?;
        log::info!("{id}: efficiency {eff}");
        object_ids.insert(
            id.clone(),
            ReportRow {
                observed: (&mt.data).into(),
                expected: (&mt.expected).into(),
                data_mc_ratio: (&mt.data_mc_ratio()?).into(),
                efficiency: Some((&eff).into()),
            },
        );
    }
    Ok(EfficiencyReport { zmumu, object_ids })
}
