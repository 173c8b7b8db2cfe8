//! `taueff tabulate` and `taueff efficiency`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tau_core::Systematic;
use tau_hist::HistogramStore;
use tau_yields::abcd::replace_with_estimates;
use tau_yields::{DataDrivenNames, EfficiencyReport, SampleHistograms, YieldTable, efficiency, tabulate};

/// Parse `NAME=PATH`.
pub fn parse_labelled(s: &str) -> Result<(String, PathBuf)> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name.to_string(), PathBuf::from(path))),
        _ => anyhow::bail!("expected NAME=PATH, got '{s}'"),
    }
}

pub struct TabulateArgs<'a> {
    pub inputs: &'a [String],
    pub region: &'a str,
    pub variable: &'a str,
    pub shape_systematics: &'a [String],
    pub data_driven: Option<DataDrivenNames>,
}

pub fn cmd_tabulate(args: &TabulateArgs<'_>) -> Result<YieldTable> {
    let mut samples = Vec::with_capacity(args.inputs.len());
    for spec in args.inputs {
        let (name, path) = parse_labelled(spec)?;
        let store = HistogramStore::read_json(&path)
            .with_context(|| format!("failed to read histograms {}", path.display()))?;
        tracing::info!(process = %name, path = %path.display(), histograms = store.len(), "loaded");
        samples.push(SampleHistograms::new(name, store));
    }
    let shapes = args.shape_systematics.iter().map(Systematic::new).collect::<tau_core::Result<Vec<_>>>()?;

    let mut table = tabulate(&samples, args.region, args.variable, &shapes)
        .with_context(|| format!("tabulating {}/{}", args.region, args.variable))?;
    if let Some(names) = &args.data_driven {
        replace_with_estimates(&mut table, &samples, args.region, args.variable, names)
            .context("data-driven background estimate")?;
    }
    table.add_background_sum();
    Ok(table)
}

pub fn cmd_efficiency(mumu: &Path, mutau: &[String]) -> Result<EfficiencyReport> {
    let mm = YieldTable::read(mumu).with_context(|| format!("failed to read {}", mumu.display()))?;
    let mut tables = BTreeMap::new();
    for spec in mutau {
        let (id, path) = parse_labelled(spec)?;
        let t = YieldTable::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        tables.insert(id, t);
    }
    Ok(efficiency::report(&mm, &tables)?)
}
