//! Histogram booking and the region -> variables binding table.
//!
//! Booking registers `<region>/<variable>` once in the store. Binding walks
//! the booked paths afterwards and splits each at its last separator, so a
//! region path may itself contain any number of separators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tau_core::{Error, Result};
use tau_hist::{BinSpec, HistId, HistogramStore, split_path};

use crate::catalog::RegionCatalog;

/// Separator between the two variables of a 2-D binding (`"eta#phi"`).
pub const PAIR_SEPARATOR: char = '#';

/// Declarative request: book `variable` in every region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Variable name: a row field, a compound variable, or `x#y` for 2-D.
    pub variable: String,
    /// Histogram title.
    pub title: String,
    /// Binning.
    pub bins: BinSpec,
}

impl Booking {
    /// 1-D booking with equal bins.
    pub fn uniform(variable: &str, title: &str, n_bins: usize, lo: f64, hi: f64) -> Self {
        Self { variable: variable.into(), title: title.into(), bins: BinSpec::uniform(n_bins, lo, hi) }
    }

    /// 2-D booking of `x#y`.
    pub fn pair(x: &str, y: &str, title: &str, nx: (usize, f64, f64), ny: (usize, f64, f64)) -> Self {
        Self {
            variable: format!("{x}{PAIR_SEPARATOR}{y}"),
            title: title.into(),
            bins: BinSpec::uniform_2d(nx.0, nx.1, nx.2, ny.0, ny.1, ny.2),
        }
    }

    /// Tuple booking.
    pub fn tuple(variable: &str, title: &str, columns: &[&str]) -> Self {
        Self {
            variable: variable.into(),
            title: title.into(),
            bins: BinSpec::tuple(columns.iter().copied()),
        }
    }
}

/// Register one histogram at `<region_path>/<variable>`.
pub fn book(
    store: &mut HistogramStore,
    region_path: &str,
    variable: &str,
    title: &str,
    bins: BinSpec,
) -> Result<HistId> {
    store.book(&format!("{region_path}/{variable}"), title, bins)
}

/// Book every declared variable in every catalog region.
pub fn book_catalog(
    store: &mut HistogramStore,
    catalog: &RegionCatalog,
    bookings: &[Booking],
) -> Result<()> {
    for region in catalog.iter() {
        for b in bookings {
            book(store, &region.path, &b.variable, &b.title, b.bins.clone())?;
        }
    }
    Ok(())
}

/// A variable bound to its histogram handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundVariable {
    /// Variable name (last path segment).
    pub variable: String,
    /// Histogram handle.
    pub id: HistId,
}

/// Lookup `region path -> [bound variables]`, built once after booking.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    by_region: BTreeMap<String, Vec<BoundVariable>>,
}

impl BindingTable {
    /// Walk every booked path and group variables by region.
    pub fn bind(store: &HistogramStore) -> Result<Self> {
        let mut by_region: BTreeMap<String, Vec<BoundVariable>> = BTreeMap::new();
        for path in store.paths() {
            let (region, variable) = split_path(path)
                .ok_or_else(|| Error::config(format!("cannot split histogram path '{path}'")))?;
            let id = store
                .id(path)
                .ok_or_else(|| Error::config(format!("histogram '{path}' vanished while binding")))?;
            by_region
                .entry(region.to_string())
                .or_default()
                .push(BoundVariable { variable: variable.to_string(), id });
        }
        Ok(Self { by_region })
    }

    /// Variables bound to a region (empty if none were booked).
    pub fn variables(&self, region_path: &str) -> &[BoundVariable] {
        self.by_region.get(region_path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regions that have at least one binding.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }

    /// Number of regions with bindings.
    pub fn len(&self) -> usize {
        self.by_region.len()
    }

    /// True if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.by_region.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, RegionSpec};
    use tau_core::Systematic;

    #[test]
    fn bind_splits_at_last_separator() {
        let mut store = HistogramStore::new();
        book(&mut store, "nominal/LooseIso/os/LoMT", "mPt", "pt", BinSpec::uniform(1, 0.0, 1.0))
            .unwrap();
        book(&mut store, "nominal/LooseIso/os/LoMT", "mPt#tPt", "2d", BinSpec::uniform_2d(1, 0.0, 1.0, 1, 0.0, 1.0))
            .unwrap();
        book(&mut store, "nominal/LooseIso/os", "tPt", "pt", BinSpec::uniform(1, 0.0, 1.0)).unwrap();

        let table = BindingTable::bind(&store).unwrap();
        assert_eq!(table.len(), 2);
        let vars: Vec<_> =
            table.variables("nominal/LooseIso/os/LoMT").iter().map(|b| b.variable.as_str()).collect();
        assert_eq!(vars, vec!["mPt", "mPt#tPt"]);
        assert_eq!(table.variables("nominal/LooseIso/os")[0].variable, "tPt");
        assert!(table.variables("nominal/none").is_empty());
    }

    #[test]
    fn book_catalog_books_each_path_once() {
        let cat = CatalogBuilder::new()
            .region("a", RegionSpec::new())
            .region("b", RegionSpec::new())
            .build(&[Systematic::nominal()])
            .unwrap();
        let mut store = HistogramStore::new();
        let bookings = [Booking::uniform("pt", "pt", 10, 0.0, 100.0)];
        book_catalog(&mut store, &cat, &bookings).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.id("nominal/a/pt").is_some());
        // booking again collides
        assert!(book_catalog(&mut store, &cat, &bookings).is_err());
    }
}
