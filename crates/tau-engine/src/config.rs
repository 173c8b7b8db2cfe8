//! Run configuration.
//!
//! One document per (sample, channel) job, YAML by default or JSON by file
//! extension. Everything the weight and preselection functions need to know
//! about the sample is carried here; library code reads no process
//! environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Result, SampleKind, Schema, Systematic};

use crate::channel::Channel;
use crate::channels::{self, ChannelKind};
use crate::corrections::McCorrections;
use crate::engine::{DEFAULT_CHUNK_SIZE, EngineOptions, MalformedPolicy, WeightMode};

/// Tau isolation discriminators measured by default.
pub const DEFAULT_TAU_IDS: [&str; 6] =
    ["LooseIso", "MediumIso", "TightIso", "LooseMVAIso", "MediumMVAIso", "TightMVAIso"];

/// Configuration of one processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Dataset identifier, e.g. `data_SingleMu_Run2012A` or `Zjets_M50`.
    pub sample: String,
    /// Final state to analyse.
    pub channel: ChannelKind,
    /// Data or simulation; derived from a `data` sample prefix when absent.
    #[serde(default)]
    pub kind: Option<SampleKind>,
    /// Data-taking period label (`7TeV`, `8TeV`).
    #[serde(default = "default_period")]
    pub period: String,
    /// Object-ID variants of the mu-tau channel.
    #[serde(default = "default_tau_ids")]
    pub tau_ids: Vec<String>,
    /// Systematic passes besides `nominal` (ignored for data).
    #[serde(default)]
    pub systematics: Vec<Systematic>,
    /// Whether the weight is recomputed per systematic pass.
    #[serde(default)]
    pub weight_mode: WeightMode,
    /// Boundary between the `LoMT` and `HiMT` windows, GeV.
    #[serde(default = "default_mt_threshold")]
    pub mt_threshold: f64,
    /// Number of b-jet multiplicity bins (`bjets0` .. `bjets{n-1}`).
    #[serde(default = "default_bjet_bins")]
    pub bjet_bins: u32,
    /// Book the anti-isolated `QCD` sideband (mu-tau only).
    #[serde(default = "default_true")]
    pub qcd_sideband: bool,
    /// Simulation corrections.
    #[serde(default)]
    pub corrections: McCorrections,
    /// Malformed-event policy.
    #[serde(default)]
    pub malformed: MalformedPolicy,
    /// Worker threads (0 = rayon default, 1 = sequential).
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Rows per parallel work unit.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_period() -> String {
    "8TeV".to_string()
}

fn default_tau_ids() -> Vec<String> {
    DEFAULT_TAU_IDS.iter().map(|s| s.to_string()).collect()
}

fn default_mt_threshold() -> f64 {
    20.0
}

fn default_bjet_bins() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_threads() -> usize {
    1
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl RunConfig {
    /// Minimal configuration with every default applied.
    pub fn new(sample: impl Into<String>, channel: ChannelKind) -> Self {
        Self {
            sample: sample.into(),
            channel,
            kind: None,
            period: default_period(),
            tau_ids: default_tau_ids(),
            systematics: Vec::new(),
            weight_mode: WeightMode::default(),
            mt_threshold: default_mt_threshold(),
            bjet_bins: default_bjet_bins(),
            qcd_sideband: true,
            corrections: McCorrections::default(),
            malformed: MalformedPolicy::default(),
            threads: default_threads(),
            chunk_size: default_chunk_size(),
        }
    }

    /// Read a configuration file; `.json` is parsed as JSON, anything else
    /// as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let cfg: RunConfig = if ext == "json" {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)
                .map_err(|e| Error::config(format!("{}: {e}", path.display())))?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: RunConfig =
            serde_yaml_ng::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.sample.is_empty() {
            return Err(Error::config("sample name is empty"));
        }
        if !self.mt_threshold.is_finite() || self.mt_threshold <= 0.0 {
            return Err(Error::config(format!("mt_threshold must be positive, got {}", self.mt_threshold)));
        }
        if self.bjet_bins == 0 {
            return Err(Error::config("bjet_bins must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be at least 1"));
        }
        if self.channel == ChannelKind::Mt {
            if self.tau_ids.is_empty() {
                return Err(Error::config("mt channel needs at least one tau ID"));
            }
            if self.qcd_sideband && !self.tau_ids.iter().any(|t| t == "LooseIso") {
                return Err(Error::config("the QCD sideband is defined by failing LooseIso; add it to tau_ids"));
            }
        }
        self.corrections.validate()
    }

    /// Effective sample kind.
    pub fn sample_kind(&self) -> SampleKind {
        self.kind.unwrap_or_else(|| SampleKind::from_sample_name(&self.sample))
    }

    /// Systematic passes that will actually run, `nominal` first.
    pub fn pass_labels(&self) -> Vec<Systematic> {
        self.engine_options().pass_labels()
    }

    /// Engine options for this job.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            kind: self.sample_kind(),
            systematics: self.systematics.clone(),
            weight_mode: self.weight_mode,
            malformed: self.malformed,
        }
    }

    /// Build the channel against the input schema.
    pub fn channel(&self, schema: &Schema) -> Result<Channel> {
        channels::build(self, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let cfg = RunConfig::from_yaml_str("sample: Zjets_M50\nchannel: mt\n").unwrap();
        assert_eq!(cfg, RunConfig::new("Zjets_M50", ChannelKind::Mt));
        assert_eq!(cfg.sample_kind(), SampleKind::Mc);
        assert_eq!(cfg.mt_threshold, 20.0);
        assert_eq!(cfg.tau_ids.len(), 6);
    }

    #[test]
    fn kind_follows_sample_name_unless_given() {
        let cfg = RunConfig::from_yaml_str("sample: data_SingleMu_Run2012A\nchannel: mm\n").unwrap();
        assert!(cfg.sample_kind().is_data());
        let cfg =
            RunConfig::from_yaml_str("sample: data_SingleMu_Run2012A\nchannel: mm\nkind: mc\n").unwrap();
        assert!(!cfg.sample_kind().is_data());
    }

    #[test]
    fn data_passes_are_nominal_only() {
        let yaml = "sample: data_SingleMu\nchannel: mt\nsystematics: [mes_p, tes_p]\n";
        let cfg = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.pass_labels(), vec![Systematic::nominal()]);

        let yaml = "sample: Zjets_M50\nchannel: mt\nsystematics: [mes_p, nominal, mes_p]\n";
        let cfg = RunConfig::from_yaml_str(yaml).unwrap();
        let labels: Vec<_> = cfg.pass_labels().iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, vec!["nominal", "mes_p"]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(RunConfig::from_yaml_str("sample: x\nchannel: mt\nmt_threshold: -1\n").is_err());
        assert!(RunConfig::from_yaml_str("sample: x\nchannel: mt\ntau_ids: [TightIso]\n").is_err());
        assert!(RunConfig::from_yaml_str("sample: x\nchannel: mt\nsystematics: ['a/b']\n").is_err());
        assert!(RunConfig::from_yaml_str("sample: x\nchannel: et\n").is_err());
        assert!(RunConfig::from_yaml_str("sample: x\nchannel: mt\nbogus: 1\n").is_err());
    }

    #[test]
    fn reads_json_by_extension() {
        let dir = std::env::temp_dir().join(format!("tau_engine_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run.json");
        std::fs::write(&path, r#"{"sample": "WplusJets", "channel": "mt", "weight_mode": "per_systematic"}"#)
            .unwrap();
        let cfg = RunConfig::from_path(&path).unwrap();
        assert_eq!(cfg.weight_mode, WeightMode::PerSystematic);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
