//! Z -> tau tau -> mu tau_h.

use tau_core::{Result, Schema, Systematic, Value, ValueKind};

use super::{
    MtColumns, finish_channel, mt_column_name, register_bjets, register_mt_window, register_sign,
    standard_axes,
};
use crate::binding::Booking;
use crate::catalog::{CatalogBuilder, RegionSpec};
use crate::channel::Channel;
use crate::config::RunConfig;
use crate::predicate::PredicateRegistry;
use crate::selections::{MuonId, MuonSelection, TauSelection, Vetoes};

const MT_PREFIX: &str = "mMtToPfMet";

/// Object-ID variant whose failure defines the anti-isolated sideband.
const QCD_TEMPLATE: &str = "LooseIso";

pub(super) fn build(config: &RunConfig, schema: &Schema) -> Result<Channel> {
    let muon = MuonSelection::new(schema, "m", 20.0)?;
    let muon_id = MuonId::new(schema, "m")?;
    let tau = TauSelection::new(schema, "t")?;
    let vetoes = Vetoes::new(schema)?;
    let anti_e = schema.field("tAntiElectronLoose")?;
    let anti_mu = schema.field("tAntiMuonTight")?;

    let mut registry = PredicateRegistry::new();
    let mut regions = CatalogBuilder::new();
    for id in &config.tau_ids {
        let field = schema.field(&format!("t{id}"))?;
        registry.invariant(id.as_str(), ValueKind::Bool, move |row| {
            Ok(Value::Bool(row.flag(&field)?))
        })?;
        regions = regions.object_id(id.as_str(), id);
    }
    if config.qcd_sideband {
        regions = regions.control_region(
            "QCD",
            QCD_TEMPLATE,
            RegionSpec::new().require(QCD_TEMPLATE, false),
        );
    }
    for axis in standard_axes(config.bjet_bins) {
        regions = regions.axis(axis);
    }
    register_sign(&mut registry, schema, "m_t_SS")?;
    register_bjets(&mut registry, schema)?;
    let columns =
        MtColumns::resolve(schema, MT_PREFIX, &config.pass_labels(), &config.corrections)?;
    register_mt_window(&mut registry, columns, config.mt_threshold)?;

    let weights = config.corrections.bind(schema, config.sample_kind(), &["m"])?;

    let channel = Channel::new("mt")
        .preselection(move |row| {
            Ok(muon.passes(row)?
                && muon_id.passes(row)?
                && tau.passes(row)?
                && vetoes.passes(row)?
                && row.flag(&anti_e)?
                && row.flag(&anti_mu)?)
        })
        .predicates(registry)
        .regions(regions)
        .book(Booking::uniform("mPt", "Muon Pt", 100, 0.0, 100.0))
        .book(Booking::uniform("tPt", "Tau Pt", 100, 0.0, 100.0))
        .book(Booking::uniform("mAbsEta", "Muon |eta|", 100, 0.0, 2.5))
        .book(Booking::uniform("tAbsEta", "Tau |eta|", 100, 0.0, 2.5))
        .book(Booking::uniform("m_t_Mass", "Muon-Tau Mass", 240, 60.0, 120.0))
        .book(Booking::pair("mPt", "tPt", "Muon Pt vs Tau Pt", (20, 0.0, 100.0), (20, 0.0, 100.0)));

    finish_channel(channel, config, schema, weights, &mt_column_name(MT_PREFIX, &Systematic::nominal()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelKind, testing};
    use crate::engine::Engine;
    use tau_core::EventTable;

    const MT_COLUMNS: [&str; 19] = [
        "mPt",
        "mAbsEta",
        "mDZ",
        "mPFIDTight",
        "mRelPFIsoDB",
        "tPt",
        "tAbsEta",
        "tDZ",
        "tAntiElectronLoose",
        "tAntiMuonTight",
        "m_t_SS",
        "m_t_Mass",
        "mMtToPfMet_mes_p",
        "tLooseIso",
        "tMediumIso",
        "tTightIso",
        "tLooseMVAIso",
        "tMediumMVAIso",
        "tTightMVAIso",
    ];

    fn good_event(schema: &Schema, extra: &[(&str, f64)]) -> Vec<f64> {
        let mut set = vec![
            ("mPt", 30.0),
            ("mAbsEta", 1.0),
            ("mPFIDTight", 1.0),
            ("mRelPFIsoDB", 0.05),
            ("tPt", 25.0),
            ("tAbsEta", 1.2),
            ("tAntiElectronLoose", 1.0),
            ("tAntiMuonTight", 1.0),
            ("m_t_Mass", 80.0),
            ("mMtToPfMet_Ty1", 10.0),
            ("mMtToPfMet_mes_p", 35.0),
            ("tLooseIso", 1.0),
            ("nTruePU", 20.0),
            ("evt", 1_234_567.0),
            ("run", 1.0),
            ("lumi", 7.0),
        ];
        set.extend_from_slice(extra);
        testing::row(schema, &set)
    }

    fn config() -> RunConfig {
        let mut cfg = RunConfig::new("Zjets_M50", ChannelKind::Mt);
        cfg.systematics = vec![Systematic::new("mes_p").unwrap()];
        cfg
    }

    #[test]
    fn region_layout() {
        let schema = testing::schema(&MT_COLUMNS);
        let cfg = config();
        let engine = Engine::begin(cfg.channel(&schema).unwrap(), cfg.engine_options(), &schema).unwrap();
        // (6 IDs + QCD) x 2 signs x 2 windows x 3 b-jet bins x 2 passes
        assert_eq!(engine.catalog().len(), 7 * 2 * 2 * 3 * 2);
        let qcd = engine.catalog().get("mes_p/QCD/ss/HiMT/bjets2").unwrap();
        assert_eq!(qcd.spec.get("LooseIso"), Some(Some(Value::Bool(false))));
    }

    #[test]
    fn event_lands_in_expected_regions() {
        let schema = testing::schema(&MT_COLUMNS);
        let cfg = config();
        let engine = Engine::begin(cfg.channel(&schema).unwrap(), cfg.engine_options(), &schema).unwrap();
        let mut table = EventTable::new(schema.clone());
        table.push_row(&good_event(&schema, &[])).unwrap();
        // fails the anti-muon discriminator
        table.push_row(&good_event(&schema, &[("tAntiMuonTight", 0.0)])).unwrap();
        let out = engine.process(table.rows()).unwrap();

        assert_eq!(out.stats.preselected, 1);
        // LooseIso only, opposite sign, one region per pass
        assert_eq!(out.stats.region_matches, 2);
        let nominal = out.store.h1("nominal/LooseIso/os/LoMT/bjets0/mPt").unwrap();
        assert_eq!(nominal.entries, 1);
        let shifted = out.store.h1("mes_p/LooseIso/os/HiMT/bjets0/mPt").unwrap();
        assert_eq!(shifted.entries, 1);
        assert_eq!(out.store.h1("nominal/TightIso/os/LoMT/bjets0/mPt").unwrap().entries, 0);

        match out.store.get("nominal/LooseIso/os/LoMT/bjets0/Event_ID").unwrap() {
            tau_hist::Accumulator::Tuple(t) => assert_eq!(t.rows, vec![vec![1.0, 7.0, 12.0, 34567.0]]),
            other => panic!("expected tuple, got {other:?}"),
        }
    }

    #[test]
    fn anti_isolated_taus_fill_the_sideband() {
        let schema = testing::schema(&MT_COLUMNS);
        let cfg = config();
        let engine = Engine::begin(cfg.channel(&schema).unwrap(), cfg.engine_options(), &schema).unwrap();
        let row = good_event(&schema, &[("tLooseIso", 0.0), ("m_t_SS", 1.0), ("bjetCSVVeto", 1.0)]);
        let mut table = EventTable::new(schema.clone());
        table.push_row(&row).unwrap();
        let out = engine.process(table.rows()).unwrap();
        assert_eq!(out.store.h1("nominal/QCD/ss/LoMT/bjets1/tPt").unwrap().entries, 1);
    }

    #[test]
    fn unknown_systematic_needs_its_column() {
        let schema = testing::schema(&MT_COLUMNS);
        let mut cfg = config();
        cfg.systematics.push(Systematic::new("tes_p").unwrap());
        let err = cfg.channel(&schema).unwrap_err();
        assert!(err.to_string().contains("mMtToPfMet_tes_p"));
    }
}
