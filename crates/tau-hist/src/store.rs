//! Path-keyed histogram store.

use std::collections::BTreeMap;

use tau_core::{Error, Result};

use crate::histogram::{Accumulator, BinSpec, FillValue, Hist1D};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Split a full histogram path at its **last** separator into
/// `(region_path, variable)`.
///
/// Region paths contain separators themselves, so only the final segment is
/// the variable name.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let pos = path.rfind(PATH_SEPARATOR)?;
    let (region, variable) = (&path[..pos], &path[pos + 1..]);
    if region.is_empty() || variable.is_empty() { None } else { Some((region, variable)) }
}

/// Handle to a booked accumulator, valid for the store that issued it and
/// for any store cloned from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistId(usize);

/// Histogram store keyed by full path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramStore {
    paths: Vec<String>,
    accumulators: Vec<Accumulator>,
    index: BTreeMap<String, usize>,
}

impl HistogramStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Book one accumulator under `path`. Booking the same path twice is a
    /// configuration error.
    pub fn book(&mut self, path: &str, title: &str, spec: BinSpec) -> Result<HistId> {
        self.insert(path, Accumulator::book(title, &spec)?)
    }

    pub(crate) fn insert(&mut self, path: &str, acc: Accumulator) -> Result<HistId> {
        if split_path(path).is_none() {
            return Err(Error::config(format!("histogram path '{path}' has no region segment")));
        }
        if self.index.contains_key(path) {
            return Err(Error::config(format!("histogram '{path}' booked twice")));
        }
        let id = self.accumulators.len();
        self.paths.push(path.to_string());
        self.accumulators.push(acc);
        self.index.insert(path.to_string(), id);
        Ok(HistId(id))
    }

    /// Number of booked accumulators.
    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    /// True if nothing is booked.
    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    /// Booked paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Handle for a booked path.
    pub fn id(&self, path: &str) -> Option<HistId> {
        self.index.get(path).map(|&i| HistId(i))
    }

    /// Path of a handle.
    pub fn path(&self, id: HistId) -> &str {
        &self.paths[id.0]
    }

    /// Accumulator behind a handle.
    pub fn accumulator(&self, id: HistId) -> &Accumulator {
        &self.accumulators[id.0]
    }

    /// Accumulator at a path.
    pub fn get(&self, path: &str) -> Option<&Accumulator> {
        self.id(path).map(|id| self.accumulator(id))
    }

    /// 1-D histogram at a path; missing or mis-typed paths are errors.
    pub fn h1(&self, path: &str) -> Result<&Hist1D> {
        match self.get(path) {
            Some(Accumulator::H1(h)) => Ok(h),
            Some(other) => Err(Error::config(format!(
                "'{path}' is a {}-D accumulator, not a 1-D histogram",
                other.dimension()
            ))),
            None => Err(Error::config(format!("no histogram booked at '{path}'"))),
        }
    }

    /// Fill through a handle.
    pub fn fill(&mut self, id: HistId, value: &FillValue, weight: Option<f64>) -> Result<()> {
        self.accumulators[id.0]
            .fill(value, weight)
            .map_err(|e| Error::config(format!("filling '{}': {e}", self.paths[id.0])))
    }

    /// Bin-wise sum of a store with the same bookings.
    pub fn merge(&mut self, other: &HistogramStore) -> Result<()> {
        if self.paths != other.paths {
            return Err(Error::config("cannot merge stores with different bookings"));
        }
        for (i, (a, b)) in self.accumulators.iter_mut().zip(&other.accumulators).enumerate() {
            a.merge(b).map_err(|e| Error::config(format!("merging '{}': {e}", self.paths[i])))?;
        }
        Ok(())
    }

    /// Copy of the bookings with every accumulator emptied.
    pub fn cleared(&self) -> Result<HistogramStore> {
        let mut out = HistogramStore::new();
        for (path, acc) in self.paths.iter().zip(&self.accumulators) {
            let empty = match acc {
                Accumulator::H1(h) => {
                    Accumulator::H1(Hist1D::with_edges(h.title.clone(), h.bin_edges.clone())?)
                }
                Accumulator::H2(h) => {
                    let mut e = h.clone();
                    e.bin_content.iter_mut().for_each(|v| *v = 0.0);
                    e.sumw2 = None;
                    e.out_of_range = 0.0;
                    e.entries = 0;
                    Accumulator::H2(e)
                }
                Accumulator::Tuple(t) => {
                    let mut e = t.clone();
                    e.rows.clear();
                    Accumulator::Tuple(e)
                }
            };
            out.insert(path, empty)?;
        }
        Ok(out)
    }

    /// Iterate `(path, accumulator)` in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Accumulator)> {
        self.index.iter().map(|(p, &i)| (p.as_str(), &self.accumulators[i]))
    }
}
