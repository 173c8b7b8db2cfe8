use approx::assert_relative_eq;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tau_core::Systematic;
use tau_hist::{BinSpec, FillValue, HistogramStore};
use tau_yields::abcd::replace_with_estimates;
use tau_yields::efficiency::{self, ChannelYields, MUTAU_SIGNAL};
use tau_yields::{BKG_SUM, DataDrivenNames, SampleHistograms, YieldRecord, YieldTable, tabulate};

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("tau_yields_{}_{}_{}", std::process::id(), nanos, name));
    p
}

/// Store with every `<id>/<sign>/<window>/bjets0/mPt` booked and one fill of
/// the given weight per listed region.
fn store(yields: &[(&str, f64)]) -> HistogramStore {
    let mut s = HistogramStore::new();
    for id in ["LooseIso", "QCD"] {
        for sign in ["os", "ss"] {
            for window in ["LoMT", "HiMT"] {
                let path = format!("nominal/{id}/{sign}/{window}/bjets0/mPt");
                s.book(&path, "mPt", BinSpec::uniform(10, 0.0, 100.0)).unwrap();
            }
        }
    }
    for (region, w) in yields {
        let id = s.id(&format!("nominal/{region}/bjets0/mPt")).unwrap();
        s.fill(id, &FillValue::X(35.0), Some(*w)).unwrap();
    }
    s
}

fn mutau_samples() -> Vec<SampleHistograms> {
    vec![
        SampleHistograms::new(
            "data",
            store(&[
                ("QCD/ss/LoMT", 400.0),
                ("QCD/ss/HiMT", 200.0),
                ("LooseIso/ss/LoMT", 130.0),
                ("LooseIso/ss/HiMT", 240.0),
                ("LooseIso/os/LoMT", 1_500.0),
                ("LooseIso/os/HiMT", 1_000.0),
            ]),
        ),
        SampleHistograms::new(
            "WJets",
            store(&[
                ("LooseIso/ss/LoMT", 25.0),
                ("LooseIso/ss/HiMT", 100.0),
                ("LooseIso/os/LoMT", 50.0),
                ("LooseIso/os/HiMT", 200.0),
            ]),
        ),
        SampleHistograms::new("Z_tautau", store(&[("LooseIso/os/LoMT", 1_200.0), ("LooseIso/os/HiMT", 300.0)])),
    ]
}

#[test]
fn data_driven_backgrounds_replace_simulated_wjets() {
    let samples = mutau_samples();
    let region = "LooseIso/os/LoMT/bjets0";
    let mut table = tabulate(&samples, region, "mPt", &[]).unwrap();
    assert_relative_eq!(table.get("WJets").unwrap().value, 50.0);

    replace_with_estimates(&mut table, &samples, region, "mPt", &DataDrivenNames::default()).unwrap();
    // QCD: ss solution gives hi = 40, lo = 80
    assert_relative_eq!(table.get("QCD").unwrap().value, 80.0, epsilon = 1e-9);
    // W: (1000 - 300 - 40) * 50 / 200
    assert_relative_eq!(table.get("WJets").unwrap().value, 165.0, epsilon = 1e-9);
    assert!(table.get("WJets").unwrap().stat > 0.0);

    table.add_background_sum();
    assert_relative_eq!(table.get(BKG_SUM).unwrap().value, 1_200.0 + 165.0 + 80.0, epsilon = 1e-9);
}

#[test]
fn every_z_sample_is_subtracted_from_data() {
    let mut samples = mutau_samples();
    samples.push(SampleHistograms::new("Z_jets", store(&[("LooseIso/os/HiMT", 100.0)])));
    let region = "LooseIso/os/LoMT/bjets0";
    let mut table = tabulate(&samples, region, "mPt", &[]).unwrap();
    let names = DataDrivenNames { zjets: vec!["Z_tautau".into(), "Z_jets".into()], ..Default::default() };
    replace_with_estimates(&mut table, &samples, region, "mPt", &names).unwrap();
    // W: (1000 - 300 - 100 - 40) * 50 / 200
    assert_relative_eq!(table.get("WJets").unwrap().value, 140.0, epsilon = 1e-9);

    let names = DataDrivenNames { zjets: vec!["Z_tautau".into(), "DY".into()], ..Default::default() };
    assert!(replace_with_estimates(&mut table, &samples, region, "mPt", &names).is_err());
}

#[test]
fn malformed_region_is_rejected() {
    let samples = mutau_samples();
    let mut table = YieldTable::new();
    let err = replace_with_estimates(&mut table, &samples, "LooseIso/os", "mPt", &DataDrivenNames::default());
    assert!(err.is_err());
}

#[test]
fn table_file_round_trip_and_efficiency() {
    let dir = tmp_dir("tables");
    let mm_path = dir.join("mm.json");
    std::fs::create_dir_all(&dir).unwrap();
    // hand-written table with the `val` spelling
    std::fs::write(
        &mm_path,
        r#"{"data": {"val": 10500, "stat": 102.5},
            "Z_jets": {"value": 10000, "stat": 50, "sys_tes_p": 100},
            "ttbar": {"value": 500, "stat": 10}}"#,
    )
    .unwrap();
    let mumu = YieldTable::read(&mm_path).unwrap();
    assert_eq!(mumu.get("data").unwrap(), &YieldRecord::new(10_500.0, 102.5));

    let samples = mutau_samples();
    let region = "LooseIso/os/LoMT/bjets0";
    let mut mutau = tabulate(&samples, region, "mPt", &[]).unwrap();
    replace_with_estimates(&mut mutau, &samples, region, "mPt", &DataDrivenNames::default()).unwrap();
    mutau.add_background_sum();
    let mt_path = dir.join("mt").join("LooseIso.json");
    mutau.write(&mt_path).unwrap();
    let mutau = YieldTable::read(&mt_path).unwrap();

    let mt = ChannelYields::from_table(&mutau, &efficiency::mutau_channel("LooseIso"), MUTAU_SIGNAL).unwrap();
    let mm = ChannelYields::from_table(&mumu, efficiency::MUMU_CHANNEL, efficiency::MUMU_SIGNAL).unwrap();
    let eff = efficiency::efficiency(&mt, &mm).unwrap();
    // ((1500 - 245) / (10500 - 500)) * (10000 / 1200)
    assert_relative_eq!(eff.value(), (1_255.0 / 10_000.0) * (10_000.0 / 1_200.0), epsilon = 1e-9);
    assert!(eff.error_matching("sys") > 0.0);
    assert!(eff.error_matching("qcd_extrapolation") > 0.0);

    let mut tables = BTreeMap::new();
    tables.insert("LooseIso".to_string(), mutau);
    let report = efficiency::report(&mumu, &tables).unwrap();
    assert_relative_eq!(report.object_ids["LooseIso"].efficiency.unwrap().value, eff.value(), epsilon = 1e-12);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn shape_systematics_only_shift_simulation() {
    let mut mc = HistogramStore::new();
    let mut data = HistogramStore::new();
    for s in [&mut mc, &mut data] {
        for sys in ["nominal", "mes_p"] {
            s.book(&format!("{sys}/zmm/os/HiMT/bjets0/m1Pt"), "m1Pt", BinSpec::uniform(10, 0.0, 100.0)).unwrap();
        }
    }
    let nom = mc.id("nominal/zmm/os/HiMT/bjets0/m1Pt").unwrap();
    let up = mc.id("mes_p/zmm/os/HiMT/bjets0/m1Pt").unwrap();
    for _ in 0..4 {
        mc.fill(nom, &FillValue::X(40.0), Some(1.5)).unwrap();
    }
    for _ in 0..5 {
        mc.fill(up, &FillValue::X(40.0), Some(1.5)).unwrap();
    }
    let d = data.id("nominal/zmm/os/HiMT/bjets0/m1Pt").unwrap();
    data.fill(d, &FillValue::X(40.0), None).unwrap();

    let samples = vec![SampleHistograms::new("Z_jets", mc), SampleHistograms::new("data_DoubleMu", data)];
    let t = tabulate(&samples, "zmm/os/HiMT/bjets0", "m1Pt", &[Systematic::new("mes_p").unwrap()]).unwrap();
    let z = t.get("Z_jets").unwrap();
    assert_relative_eq!(z.value, 6.0);
    assert_relative_eq!(z.stat, (4.0f64 * 2.25).sqrt());
    assert_relative_eq!(z.sys["mes_p"], 1.5);
    let d = t.get("data_DoubleMu").unwrap();
    assert_relative_eq!(d.value, 1.0);
    assert!(d.sys.is_empty());
}
