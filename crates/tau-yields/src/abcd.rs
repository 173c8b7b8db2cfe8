//! Data-driven QCD and W+jets estimates for the mu-tau channel.
//!
//! The four same-sign regions are
//!
//! | region | object ID     | mT window |
//! |--------|---------------|-----------|
//! | A      | anti-isolated | low       |
//! | B      | anti-isolated | high      |
//! | C      | isolated      | low       |
//! | D      | isolated      | high      |
//!
//! QCD has the same low/high ratio in the isolated regions as in the
//! anti-isolated sideband, W+jets has the low/high ratio predicted by
//! simulation, and data in C and D is the sum of the two. Solving
//!
//! ```text
//! data_lo = qcd_lo + w_lo,   qcd_lo = qcd_ratio * qcd_hi
//! data_hi = qcd_hi + w_hi,   w_lo   = w_ratio   * w_hi
//! ```
//!
//! gives `qcd_hi = (data_hi * w_ratio - data_lo) / (w_ratio - qcd_ratio)`.

use tau_core::{Error, Result};

use crate::measured::Measured;
use crate::table::{SampleHistograms, YieldTable, process_yield};

/// Name of the anti-isolated control object ID.
pub const QCD_CONTROL: &str = "QCD";

/// Where the sideband histograms live inside a store.
#[derive(Debug, Clone)]
pub struct SidebandLayout {
    /// Isolated object ID (`LooseIso`, ...).
    pub object_id: String,
    /// Anti-isolated control object ID.
    pub control: String,
    /// Trailing region segments after the window, e.g. `bjets0`.
    pub suffix: String,
    /// Variable whose integral is the yield.
    pub variable: String,
}

impl SidebandLayout {
    /// Layout with the default `QCD` control region.
    pub fn new(object_id: impl Into<String>, suffix: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            control: QCD_CONTROL.to_string(),
            suffix: suffix.into(),
            variable: variable.into(),
        }
    }

    /// Region path (without systematic) for an object ID, sign and window.
    pub fn region(&self, object_id: &str, sign: &str, window: &str) -> String {
        if self.suffix.is_empty() {
            format!("{object_id}/{sign}/{window}")
        } else {
            format!("{object_id}/{sign}/{window}/{}", self.suffix)
        }
    }
}

/// The six same-sign yields the ABCD solution needs.
#[derive(Debug, Clone)]
pub struct AbcdInputs {
    /// Data, anti-isolated, low window (A).
    pub qcd_lo: Measured,
    /// Data, anti-isolated, high window (B).
    pub qcd_hi: Measured,
    /// Data, isolated, low window (C).
    pub data_lo: Measured,
    /// Data, isolated, high window (D).
    pub data_hi: Measured,
    /// W+jets simulation, isolated, low window.
    pub w_lo: Measured,
    /// W+jets simulation, isolated, high window.
    pub w_hi: Measured,
}

impl AbcdInputs {
    /// Read the inputs from the samples labelled `data` and `wjets`.
    pub fn from_samples(samples: &[SampleHistograms], data: &str, wjets: &str, layout: &SidebandLayout) -> Result<Self> {
        let iso = layout.object_id.as_str();
        let anti = layout.control.as_str();
        let get = |name: &str, object_id: &str, window: &str| {
            process_yield(samples, name, &layout.region(object_id, "ss", window), &layout.variable)
        };
        Ok(Self {
            qcd_lo: get(data, anti, "LoMT")?,
            qcd_hi: get(data, anti, "HiMT")?,
            data_lo: get(data, iso, "LoMT")?,
            data_hi: get(data, iso, "HiMT")?,
            w_lo: get(wjets, iso, "LoMT")?,
            w_hi: get(wjets, iso, "HiMT")?,
        })
    }
}

/// QCD yields in the isolated same-sign windows.
#[derive(Debug, Clone)]
pub struct QcdEstimate {
    /// QCD in the low window.
    pub lo: Measured,
    /// QCD in the high window.
    pub hi: Measured,
    /// Low/high ratio measured in the anti-isolated sideband.
    pub qcd_ratio: Measured,
    /// Low/high ratio of W+jets from simulation.
    pub w_ratio: Measured,
}

impl QcdEstimate {
    /// Yield in `window` (`LoMT` or `HiMT`).
    pub fn in_window(&self, window: &str) -> Result<&Measured> {
        match window {
            "LoMT" => Ok(&self.lo),
            "HiMT" => Ok(&self.hi),
            other => Err(Error::config(format!("unknown mT window '{other}'"))),
        }
    }
}

fn nonzero(m: &Measured, what: &str) -> Result<()> {
    if m.value() == 0.0 || !m.value().is_finite() {
        return Err(Error::config(format!("ABCD estimate undefined: {what} is {}", m.value())));
    }
    Ok(())
}

/// Solve for the QCD yields.
pub fn solve(inputs: &AbcdInputs) -> Result<QcdEstimate> {
    nonzero(&inputs.qcd_hi, "anti-isolated high-window data")?;
    nonzero(&inputs.w_hi, "high-window W+jets simulation")?;
    let qcd_ratio = &inputs.qcd_lo / &inputs.qcd_hi;
    let w_ratio = &inputs.w_lo / &inputs.w_hi;
    let denom = &w_ratio - &qcd_ratio;
    nonzero(&denom, "W+jets minus QCD window ratio")?;

    let hi = (&inputs.data_hi * &w_ratio - &inputs.data_lo) / &denom;
    let lo = &hi * &qcd_ratio;
    log::debug!("ABCD: qcd_ratio={qcd_ratio} w_ratio={w_ratio} -> qcd lo={lo} hi={hi}");
    Ok(QcdEstimate { lo, hi, qcd_ratio, w_ratio })
}

/// W+jets in a low window extrapolated from the high window:
/// `(data - Z - QCD) * w_lo / w_hi`.
pub fn wjets_estimate(
    data_hi: &Measured,
    z_hi: &Measured,
    qcd_hi: &Measured,
    w_lo: &Measured,
    w_hi: &Measured,
) -> Result<Measured> {
    nonzero(w_hi, "high-window W+jets simulation")?;
    Ok((data_hi - z_hi - qcd_hi) * (w_lo / w_hi))
}

/// Process labels the data-driven estimates are built from.
#[derive(Debug, Clone)]
pub struct DataDrivenNames {
    /// Observed data.
    pub data: String,
    /// W+jets simulation; its table entry is replaced by the estimate.
    pub wjets: String,
    /// Z simulations subtracted from data; every label must be present.
    pub zjets: Vec<String>,
}

impl Default for DataDrivenNames {
    fn default() -> Self {
        Self { data: "data".into(), wjets: "WJets".into(), zjets: vec!["Z_tautau".into()] }
    }
}

/// Replace the simulated W+jets yield of `region` with the data-driven
/// estimate and add the ABCD QCD yield as `QCD`.
///
/// `region` is `<object ID>/<sign>/<window>[/<rest>]`. The W+jets estimate
/// subtracts Z and QCD from data in the high window of the same sign and
/// scales by the simulated window ratio.
pub fn replace_with_estimates(
    table: &mut YieldTable,
    samples: &[SampleHistograms],
    region: &str,
    variable: &str,
    names: &DataDrivenNames,
) -> Result<()> {
    let mut parts = region.splitn(4, '/');
    let (Some(object_id), Some(sign), Some(window)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::config(format!(
            "region '{region}' is not of the form <object ID>/<sign>/<window>[/...]"
        )));
    };
    let layout = SidebandLayout::new(object_id, parts.next().unwrap_or(""), variable);
    let qcd = solve(&AbcdInputs::from_samples(samples, &names.data, &names.wjets, &layout)?)?;

    let hi = layout.region(object_id, sign, "HiMT");
    let data_hi = process_yield(samples, &names.data, &hi, variable)?;
    let z_hi = names
        .zjets
        .iter()
        .map(|z| process_yield(samples, z, &hi, variable))
        .sum::<Result<Measured>>()?;
    let w_hi = process_yield(samples, &names.wjets, &hi, variable)?;
    let w_win = process_yield(samples, &names.wjets, region, variable)?;
    let wjets = wjets_estimate(&data_hi, &z_hi, &qcd.hi, &w_win, &w_hi)?;
    let qcd_win = qcd.in_window(window)?;
    log::info!("{region}: data-driven QCD {qcd_win}, W+jets {wjets}");

    table.insert(QCD_CONTROL, qcd_win.to_record());
    table.insert(names.wjets.clone(), wjets.to_record());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exact(lo_hi: [f64; 6]) -> AbcdInputs {
        let [qcd_lo, qcd_hi, data_lo, data_hi, w_lo, w_hi] = lo_hi.map(Measured::exact);
        AbcdInputs { qcd_lo, qcd_hi, data_lo, data_hi, w_lo, w_hi }
    }

    #[test]
    fn recovers_the_injected_mixture() {
        // QCD lo/hi = 2, W lo/hi = 0.25; true QCD hi = 40, W hi = 200
        // data_lo = 80 + 50 = 130, data_hi = 40 + 200 = 240
        let est = solve(&exact([400.0, 200.0, 130.0, 240.0, 25.0, 100.0])).unwrap();
        assert_relative_eq!(est.qcd_ratio.value(), 2.0);
        assert_relative_eq!(est.w_ratio.value(), 0.25);
        assert_relative_eq!(est.hi.value(), 40.0, epsilon = 1e-12);
        assert_relative_eq!(est.lo.value(), 80.0, epsilon = 1e-12);
        assert_relative_eq!(est.in_window("HiMT").unwrap().value(), 40.0, epsilon = 1e-12);
        assert!(est.in_window("MidMT").is_err());
    }

    #[test]
    fn degenerate_ratios_are_rejected() {
        assert!(solve(&exact([1.0, 0.0, 1.0, 1.0, 1.0, 1.0])).is_err());
        assert!(solve(&exact([1.0, 1.0, 1.0, 1.0, 1.0, 0.0])).is_err());
        // equal ratios leave the system singular
        assert!(solve(&exact([2.0, 1.0, 1.0, 1.0, 4.0, 2.0])).is_err());
    }

    #[test]
    fn wjets_subtracts_and_scales() {
        let w = wjets_estimate(
            &Measured::new(1000.0, 30.0, "d"),
            &Measured::exact(300.0),
            &Measured::exact(100.0),
            &Measured::exact(50.0),
            &Measured::exact(200.0),
        )
        .unwrap();
        assert_relative_eq!(w.value(), 150.0);
        assert_relative_eq!(w.error(), 7.5);
    }

    #[test]
    fn stat_errors_propagate_through_the_solution() {
        let mut inputs = exact([400.0, 200.0, 130.0, 240.0, 25.0, 100.0]);
        inputs.data_hi = Measured::new(240.0, 12.0, "data_hi_stat");
        let est = solve(&inputs).unwrap();
        // d(qcd_hi)/d(data_hi) = w_ratio / (w_ratio - qcd_ratio) = 0.25 / -1.75
        assert_relative_eq!(est.hi.error(), 12.0 * 0.25 / 1.75, epsilon = 1e-12);
    }
}
