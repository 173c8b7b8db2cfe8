//! Z -> mu mu, the normalisation channel.

use tau_core::{Result, Schema, Systematic};

use super::{
    MtColumns, finish_channel, mt_column_name, register_bjets, register_mt_window, register_sign,
    standard_axes,
};
use crate::binding::Booking;
use crate::catalog::{CatalogBuilder, RegionSpec};
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::predicate::PredicateRegistry;
use crate::selections::{MuonId, MuonSelection, Vetoes};

const MT_PREFIX: &str = "m1MtToPfMet";

pub(super) fn build(config: &RunConfig, schema: &Schema) -> Result<Channel> {
    let lead = MuonSelection::new(schema, "m1", 20.0)?;
    let sublead = MuonSelection::new(schema, "m2", 10.0)?;
    let lead_id = MuonId::new(schema, "m1")?;
    let sublead_id = MuonId::new(schema, "m2")?;
    let vetoes = Vetoes::new(schema)?;

    let mut registry = PredicateRegistry::new();
    register_sign(&mut registry, schema, "m1_m2_SS")?;
    register_bjets(&mut registry, schema)?;
    let columns =
        MtColumns::resolve(schema, MT_PREFIX, &config.pass_labels(), &config.corrections)?;
    register_mt_window(&mut registry, columns, config.mt_threshold)?;

    let regions = standard_axes(config.bjet_bins)
        .into_iter()
        .fold(CatalogBuilder::new().object_id_spec("zmm", RegionSpec::new()), |b, axis| {
            b.axis(axis)
        });

    let weights = config.corrections.bind(schema, config.sample_kind(), &["m1", "m2"])?;

    let channel = Channel::new("mm")
        .preselection(move |row| {
            Ok(lead.passes(row)?
                && sublead.passes(row)?
                && lead_id.passes(row)?
                && sublead_id.passes(row)?
                && vetoes.passes(row)?)
        })
        .predicates(registry)
        .regions(regions)
        .book(Booking::uniform("m1Pt", "Muon 1 Pt", 100, 0.0, 100.0))
        .book(Booking::uniform("m2Pt", "Muon 2 Pt", 100, 0.0, 100.0))
        .book(Booking::uniform("m1AbsEta", "Muon 1 |eta|", 100, 0.0, 2.5))
        .book(Booking::uniform("m2AbsEta", "Muon 2 |eta|", 100, 0.0, 2.5))
        .book(Booking::uniform("m1_m2_Mass", "Muon 1-2 Mass", 240, 60.0, 120.0))
        .book(Booking::pair("m1Pt", "m2Pt", "Muon 1 Pt vs Muon 2 Pt", (20, 0.0, 100.0), (20, 0.0, 100.0)));

    finish_channel(channel, config, schema, weights, &mt_column_name(MT_PREFIX, &Systematic::nominal()))
}
