//! Concrete channels of the tau ID efficiency measurement.
//!
//! Both final states share the region layout
//! `<sys>/<object ID>/<os|ss>/<LoMT|HiMT>/bjets<n>`, the event weight, the
//! diagnostic bookings and the compound variables; they differ in the
//! object-ID axis, the preselection and the column prefixes.

mod mumu;
mod mutau;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Field, Result, Schema, Systematic, Value, ValueKind};
use tau_hist::FillValue;

use crate::binding::Booking;
use crate::catalog::Axis;
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::corrections::{EventWeight, McCorrections};
use crate::predicate::PredicateRegistry;

/// Available final states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Z -> tau tau -> mu tau_h, the measurement channel.
    Mt,
    /// Z -> mu mu, the normalisation channel.
    Mm,
}

impl ChannelKind {
    /// Short name used in paths and logs.
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Mt => "mt",
            ChannelKind::Mm => "mm",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the channel selected by `config` against `schema`.
pub fn build(config: &RunConfig, schema: &Schema) -> Result<Channel> {
    match config.channel {
        ChannelKind::Mt => mutau::build(config, schema),
        ChannelKind::Mm => mumu::build(config, schema),
    }
}

/// Name of the transverse-mass column read under systematic `sys`:
/// type-1 corrected MET for `nominal`, uncorrected for `raw`, and the
/// shifted column `<prefix>_<sys>` otherwise.
pub fn mt_column_name(prefix: &str, sys: &Systematic) -> String {
    match sys.as_str() {
        Systematic::NOMINAL => format!("{prefix}_Ty1"),
        Systematic::RAW => prefix.to_string(),
        other => format!("{prefix}_{other}"),
    }
}

/// Transverse-mass column per systematic label, resolved at startup.
///
/// Weight-only labels (pileup variations) read the nominal column; every
/// other label must have its own shifted column.
#[derive(Debug, Clone)]
struct MtColumns(BTreeMap<Systematic, Field>);

impl MtColumns {
    fn resolve(
        schema: &Schema,
        prefix: &str,
        labels: &[Systematic],
        corrections: &McCorrections,
    ) -> Result<Self> {
        let mut columns = BTreeMap::new();
        for sys in labels {
            let name = if corrections.is_weight_only(sys) {
                let nominal = mt_column_name(prefix, &Systematic::nominal());
                log::debug!("systematic '{sys}' is weight-only, reading '{nominal}'");
                nominal
            } else {
                mt_column_name(prefix, sys)
            };
            let field = schema.field(&name).map_err(|_| {
                Error::config(format!("systematic '{sys}' needs transverse-mass column '{name}'"))
            })?;
            columns.insert(sys.clone(), field);
        }
        Ok(Self(columns))
    }
}

/// Register `mt_low`, the systematic-aware window predicate.
fn register_mt_window(
    registry: &mut PredicateRegistry,
    columns: MtColumns,
    threshold: f64,
) -> Result<()> {
    registry.systematic("mt_low", ValueKind::Bool, move |row, sys| {
        let field = columns
            .0
            .get(sys)
            .ok_or_else(|| Error::config(format!("unknown systematic '{sys}'")))?;
        Ok(Value::Bool(row.get(field)? < threshold))
    })?;
    Ok(())
}

/// Register `bjets`, the b-tagged jet multiplicity.
fn register_bjets(registry: &mut PredicateRegistry, schema: &Schema) -> Result<()> {
    let field = schema.field("bjetCSVVeto")?;
    registry.invariant("bjets", ValueKind::Int, move |row| Ok(Value::Int(row.count(&field)?)))?;
    Ok(())
}

/// Register `os` from a same-sign flag column.
fn register_sign(registry: &mut PredicateRegistry, schema: &Schema, ss_column: &str) -> Result<()> {
    let field = schema.field(ss_column)?;
    registry.invariant("os", ValueKind::Bool, move |row| Ok(Value::Bool(!row.flag(&field)?)))?;
    Ok(())
}

/// The axes crossed after the object-ID axis.
fn standard_axes(bjet_bins: u32) -> [Axis; 3] {
    [
        Axis::boolean("os", "os", "ss"),
        Axis::boolean("mt_low", "LoMT", "HiMT"),
        Axis::count("bjets", "bjets", 0..i64::from(bjet_bins)),
    ]
}

/// Bookings shared by both channels.
fn common_bookings(is_data: bool, mt_column: &str) -> Vec<Booking> {
    let mut b = vec![
        Booking::uniform("weight", "Event weight", 100, 0.0, 5.0),
        Booking::uniform("weight_nopu", "Event weight without PU", 100, 0.0, 5.0),
        Booking::uniform("rho", "Fastjet #rho", 100, 0.0, 25.0),
        Booking::uniform("nvtx", "Number of vertices", 31, -0.5, 30.5),
        Booking::uniform("doubleMuPrescale", "HLT prescale", 21, -0.5, 20.5),
        Booking::uniform(mt_column, "M_{T}", 100, 0.0, 200.0),
        Booking::uniform("bjetCSVVeto", "Number of b-jets", 5, -0.5, 4.5),
        Booking::uniform("muVetoPt5", "Number of extra muons", 5, -0.5, 4.5),
        Booking::uniform("tauVetoPt20Loose3HitsVtx", "Number of extra taus", 5, -0.5, 4.5),
        Booking::uniform("eVetoCicTightIso", "Number of extra CiC tight electrons", 5, -0.5, 4.5),
        Booking::tuple("Event_ID", "run, lumi and event number", &["run", "lumi", "evt_hi", "evt_lo"]),
    ];
    if !is_data {
        b.push(Booking::uniform("nTruePU", "Number of true interactions", 60, -0.5, 59.5));
    }
    b
}

/// Weight function, bookings and compound variables shared by both channels.
fn finish_channel(
    channel: Channel,
    config: &RunConfig,
    schema: &Schema,
    weights: EventWeight,
    mt_column: &str,
) -> Result<Channel> {
    let is_data = config.sample_kind().is_data();
    let mut channel = common_bookings(is_data, mt_column)
        .into_iter()
        .fold(channel, |ch, b| ch.book(b));

    // Data is filled with plain counts.
    let w = weights.clone();
    channel = channel.weight(move |row, sys| {
        if is_data { Ok(None) } else { Ok(Some(w.weight(row, sys)?)) }
    });

    channel = channel
        .compound("weight", |_, weight| Ok((FillValue::X(weight.unwrap_or(1.0)), None)))
        .compound("weight_nopu", move |row, _| Ok((FillValue::X(weights.without_pileup(row)?), None)));

    let run = schema.field("run")?;
    let lumi = schema.field("lumi")?;
    let evt = schema.field("evt")?;
    channel = channel.compound("Event_ID", move |row, _| {
        let e = row.count(&evt)?;
        let record = vec![row.get(&run)?, row.get(&lumi)?, (e / 100_000) as f64, (e % 100_000) as f64];
        Ok((FillValue::Record(record), None))
    });

    if !is_data {
        let pu = schema.field("nTruePU")?;
        channel = channel.compound("nTruePU", move |row, _| Ok((FillValue::X(row.get(&pu)?), None)));
    }
    Ok(channel)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic ntuple schemas for channel tests.

    use super::*;

    /// Columns shared by both final states.
    pub const COMMON: [&str; 14] = [
        "run",
        "lumi",
        "evt",
        "nTruePU",
        "rho",
        "nvtx",
        "doubleMuPrescale",
        "bjetCSVVeto",
        "muVetoPt5",
        "tauVetoPt20Loose3HitsVtx",
        "eVetoCicTightIso",
        "mMtToPfMet_Ty1",
        "mMtToPfMet",
        "m1MtToPfMet_Ty1",
    ];

    /// Schema from the common columns plus `extra`.
    pub fn schema(extra: &[&str]) -> Schema {
        Schema::new(COMMON.iter().chain(extra).copied()).unwrap()
    }

    /// Row with every column zero except `set`.
    pub fn row(schema: &Schema, set: &[(&str, f64)]) -> Vec<f64> {
        let mut v = vec![0.0; schema.len()];
        for (name, value) in set {
            v[schema.field(name).unwrap().index()] = *value;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mt_column_per_systematic() {
        let p = "mMtToPfMet";
        assert_eq!(mt_column_name(p, &Systematic::nominal()), "mMtToPfMet_Ty1");
        assert_eq!(mt_column_name(p, &Systematic::new("raw").unwrap()), "mMtToPfMet");
        assert_eq!(mt_column_name(p, &Systematic::new("mes_p").unwrap()), "mMtToPfMet_mes_p");
    }

    #[test]
    fn missing_systematic_column_fails_at_startup() {
        let schema = testing::schema(&[]);
        let labels = [Systematic::new("tes_p").unwrap()];
        let err = MtColumns::resolve(&schema, "mMtToPfMet", &labels, &McCorrections::default()).unwrap_err();
        assert!(err.to_string().contains("mMtToPfMet_tes_p"));
    }

    #[test]
    fn pileup_variations_read_the_nominal_column() {
        use crate::corrections::{PileupConfig, WeightTable};

        let table = WeightTable { edges: vec![0.0, 50.0], weights: vec![1.0] };
        let corrections = McCorrections {
            pileup: Some(PileupConfig {
                nominal: table.clone(),
                variations: [("pu_p".to_string(), table)].into_iter().collect(),
            }),
            muon_sf: None,
        };
        let schema = testing::schema(&[]);
        let pu_p = Systematic::new("pu_p").unwrap();
        let labels = [Systematic::nominal(), pu_p.clone()];
        let cols = MtColumns::resolve(&schema, "mMtToPfMet", &labels, &corrections).unwrap();
        assert_eq!(cols.0[&pu_p], schema.field("mMtToPfMet_Ty1").unwrap());

        // a shape systematic still needs its own column
        let labels = [Systematic::new("tes_p").unwrap()];
        assert!(MtColumns::resolve(&schema, "mMtToPfMet", &labels, &corrections).is_err());
    }

    #[test]
    fn channel_kind_serde() {
        let k: ChannelKind = serde_json::from_str("\"mm\"").unwrap();
        assert_eq!(k, ChannelKind::Mm);
        assert_eq!(ChannelKind::Mt.to_string(), "mt");
    }
}
