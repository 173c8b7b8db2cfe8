//! # tau-hist
//!
//! Histogram store for the region engine.
//!
//! Histograms are booked once under a slash-delimited path
//! (`<systematic>/<region...>/<variable>`), filled through a [`HistId`]
//! handle, merged bin-wise across workers and persisted as a nested JSON
//! directory tree keyed by path segment.
//!
//! ```
//! use tau_hist::{BinSpec, FillValue, HistogramStore};
//!
//! let mut store = HistogramStore::new();
//! let id = store.book("nominal/zmm/os/LoMT/m1Pt", "Muon 1 Pt", BinSpec::uniform(100, 0.0, 100.0)).unwrap();
//! store.fill(id, &FillValue::X(42.0), Some(1.5)).unwrap();
//! assert_eq!(store.h1("nominal/zmm/os/LoMT/m1Pt").unwrap().integral(), 1.5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod histogram;
pub mod io;
pub mod store;

pub use histogram::{Accumulator, BinSpec, FillValue, Hist1D, Hist2D, Tuple};
pub use store::{HistId, HistogramStore, PATH_SEPARATOR, split_path};
