//! Accumulator types: 1-D and 2-D histograms and a flat tuple.
//!
//! Unweighted fills (`weight = None`) only count entries; the per-bin sum of
//! squared weights is enabled by the first weighted fill and seeded from the
//! unweighted contents at that point. A histogram that never saw a weight
//! therefore reports `sumw2() == None` and Poisson errors from its contents.

use serde::{Deserialize, Serialize};
use tau_core::{Error, Result};

/// Binning requested at booking time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BinSpec {
    /// `n_bins` equal bins on `[lo, hi)`.
    Uniform {
        /// Number of bins.
        n_bins: usize,
        /// Lower edge.
        lo: f64,
        /// Upper edge.
        hi: f64,
    },
    /// Explicit sorted edges (`n_bins + 1` values).
    Edges {
        /// Bin edges.
        edges: Vec<f64>,
    },
    /// Equal bins on both axes.
    Uniform2D {
        /// Bins along x.
        nx: usize,
        /// Lower x edge.
        xlo: f64,
        /// Upper x edge.
        xhi: f64,
        /// Bins along y.
        ny: usize,
        /// Lower y edge.
        ylo: f64,
        /// Upper y edge.
        yhi: f64,
    },
    /// Unbinned record of named columns.
    Tuple {
        /// Column names.
        columns: Vec<String>,
    },
}

impl BinSpec {
    /// Shorthand for [`BinSpec::Uniform`].
    pub fn uniform(n_bins: usize, lo: f64, hi: f64) -> Self {
        BinSpec::Uniform { n_bins, lo, hi }
    }

    /// Shorthand for [`BinSpec::Uniform2D`].
    pub fn uniform_2d(nx: usize, xlo: f64, xhi: f64, ny: usize, ylo: f64, yhi: f64) -> Self {
        BinSpec::Uniform2D { nx, xlo, xhi, ny, ylo, yhi }
    }

    /// Shorthand for [`BinSpec::Tuple`].
    pub fn tuple<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        BinSpec::Tuple { columns: columns.into_iter().map(Into::into).collect() }
    }

    /// Number of axes (0 for tuples).
    pub fn dimension(&self) -> usize {
        match self {
            BinSpec::Uniform { .. } | BinSpec::Edges { .. } => 1,
            BinSpec::Uniform2D { .. } => 2,
            BinSpec::Tuple { .. } => 0,
        }
    }
}

/// Value handed to an accumulator for one fill.
#[derive(Debug, Clone, PartialEq)]
pub enum FillValue {
    /// One coordinate (1-D histograms).
    X(f64),
    /// Two coordinates (2-D histograms).
    XY(f64, f64),
    /// One record (tuples).
    Record(Vec<f64>),
}

/// A 1-D histogram with under/overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    /// Histogram title.
    pub title: String,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (sum of weights per bin).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin, once a weighted fill happened.
    pub sumw2: Option<Vec<f64>>,
    /// Underflow sum of weights.
    pub underflow: f64,
    /// Overflow sum of weights (NaN coordinates land here too).
    pub overflow: f64,
    /// Underflow sum of weights squared.
    pub underflow_sumw2: f64,
    /// Overflow sum of weights squared.
    pub overflow_sumw2: f64,
    /// Number of fills, flows included.
    pub entries: u64,
}

impl Hist1D {
    /// Equal-width binning.
    pub fn uniform(title: impl Into<String>, n_bins: usize, lo: f64, hi: f64) -> Result<Self> {
        if n_bins == 0 || !(lo < hi) {
            return Err(Error::config(format!("invalid uniform binning ({n_bins}, {lo}, {hi})")));
        }
        let width = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..n_bins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::with_edges(title, edges)
    }

    /// Variable-width binning.
    pub fn with_edges(title: impl Into<String>, bin_edges: Vec<f64>) -> Result<Self> {
        if bin_edges.len() < 2 || bin_edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::config(format!("bin edges must be strictly increasing: {bin_edges:?}")));
        }
        let n_bins = bin_edges.len() - 1;
        Ok(Self {
            title: title.into(),
            bin_edges,
            bin_content: vec![0.0; n_bins],
            sumw2: None,
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0,
        })
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Add one entry at `x`. `None` is an unweighted count.
    pub fn fill(&mut self, x: f64, weight: Option<f64>) {
        let (w, w2) = match weight {
            Some(w) => {
                self.enable_sumw2();
                (w, w * w)
            }
            None => (1.0, 1.0),
        };
        self.entries += 1;
        match find_bin(&self.bin_edges, x) {
            Bin::Under => {
                self.underflow += w;
                self.underflow_sumw2 += w2;
            }
            Bin::Over => {
                self.overflow += w;
                self.overflow_sumw2 += w2;
            }
            Bin::In(b) => {
                self.bin_content[b] += w;
                if let Some(s) = self.sumw2.as_mut() {
                    s[b] += w2;
                }
            }
        }
    }

    /// Per-bin sum of squared weights, if a weighted fill happened.
    pub fn sumw2(&self) -> Option<&[f64]> {
        self.sumw2.as_deref()
    }

    /// True once a weighted fill happened.
    pub fn is_weighted(&self) -> bool {
        self.sumw2.is_some()
    }

    /// Statistical error of bin `b`.
    pub fn bin_error(&self, b: usize) -> f64 {
        match &self.sumw2 {
            Some(s) => s[b].sqrt(),
            None => self.bin_content[b].abs().sqrt(),
        }
    }

    /// Sum of in-range contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Statistical error of [`Hist1D::integral`].
    pub fn integral_error(&self) -> f64 {
        match &self.sumw2 {
            Some(s) => s.iter().sum::<f64>().sqrt(),
            None => self.integral().abs().sqrt(),
        }
    }

    /// Bin-wise sum of another histogram with identical binning.
    pub fn merge(&mut self, other: &Hist1D) -> Result<()> {
        if self.bin_edges != other.bin_edges {
            return Err(Error::config(format!(
                "cannot merge '{}': bin edges differ",
                self.title
            )));
        }
        if other.sumw2.is_some() {
            self.enable_sumw2();
        }
        for b in 0..self.n_bins() {
            self.bin_content[b] += other.bin_content[b];
        }
        if let Some(s) = self.sumw2.as_mut() {
            match &other.sumw2 {
                Some(o) => s.iter_mut().zip(o).for_each(|(a, b)| *a += b),
                None => s.iter_mut().zip(&other.bin_content).for_each(|(a, b)| *a += b),
            }
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        self.entries += other.entries;
        Ok(())
    }

    fn enable_sumw2(&mut self) {
        if self.sumw2.is_none() {
            // Each unweighted entry so far contributed 1 = 1^2.
            self.sumw2 = Some(self.bin_content.clone());
        }
    }
}

/// A 2-D histogram with equal-width bins; out-of-range fills are counted
/// but not binned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    /// Histogram title.
    pub title: String,
    /// X-axis bin edges.
    pub x_edges: Vec<f64>,
    /// Y-axis bin edges.
    pub y_edges: Vec<f64>,
    /// Row-major contents, `[ix * ny + iy]`.
    pub bin_content: Vec<f64>,
    /// Sum of weights squared, once a weighted fill happened.
    pub sumw2: Option<Vec<f64>>,
    /// Sum of weights that fell outside either axis.
    pub out_of_range: f64,
    /// Number of fills.
    pub entries: u64,
}

impl Hist2D {
    /// Equal-width binning on both axes.
    pub fn uniform(
        title: impl Into<String>,
        (nx, xlo, xhi): (usize, f64, f64),
        (ny, ylo, yhi): (usize, f64, f64),
    ) -> Result<Self> {
        let x = Hist1D::uniform("", nx, xlo, xhi)?.bin_edges;
        let y = Hist1D::uniform("", ny, ylo, yhi)?.bin_edges;
        Ok(Self {
            title: title.into(),
            x_edges: x,
            y_edges: y,
            bin_content: vec![0.0; nx * ny],
            sumw2: None,
            out_of_range: 0.0,
            entries: 0,
        })
    }

    fn ny(&self) -> usize {
        self.y_edges.len() - 1
    }

    /// Add one entry at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, weight: Option<f64>) {
        let (w, w2) = match weight {
            Some(w) => {
                if self.sumw2.is_none() {
                    self.sumw2 = Some(self.bin_content.clone());
                }
                (w, w * w)
            }
            None => (1.0, 1.0),
        };
        self.entries += 1;
        match (find_bin(&self.x_edges, x), find_bin(&self.y_edges, y)) {
            (Bin::In(ix), Bin::In(iy)) => {
                let k = ix * self.ny() + iy;
                self.bin_content[k] += w;
                if let Some(s) = self.sumw2.as_mut() {
                    s[k] += w2;
                }
            }
            _ => self.out_of_range += w,
        }
    }

    /// Content of bin `(ix, iy)`.
    pub fn bin(&self, ix: usize, iy: usize) -> f64 {
        self.bin_content[ix * self.ny() + iy]
    }

    /// Sum of in-range contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Bin-wise sum of another histogram with identical binning.
    pub fn merge(&mut self, other: &Hist2D) -> Result<()> {
        if self.x_edges != other.x_edges || self.y_edges != other.y_edges {
            return Err(Error::config(format!("cannot merge '{}': bin edges differ", self.title)));
        }
        if other.sumw2.is_some() && self.sumw2.is_none() {
            self.sumw2 = Some(self.bin_content.clone());
        }
        if let Some(s) = self.sumw2.as_mut() {
            let o = other.sumw2.as_ref().unwrap_or(&other.bin_content);
            s.iter_mut().zip(o).for_each(|(a, b)| *a += b);
        }
        self.bin_content.iter_mut().zip(&other.bin_content).for_each(|(a, b)| *a += b);
        self.out_of_range += other.out_of_range;
        self.entries += other.entries;
        Ok(())
    }
}

/// Flat record of named columns, one record per fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Tuple title.
    pub title: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Filled records.
    pub rows: Vec<Vec<f64>>,
}

impl Tuple {
    /// Append one record; its length must match the column count.
    pub fn fill(&mut self, record: &[f64]) -> Result<()> {
        if record.len() != self.columns.len() {
            return Err(Error::config(format!(
                "tuple '{}' expects {} values, got {}",
                self.title,
                self.columns.len(),
                record.len()
            )));
        }
        self.rows.push(record.to_vec());
        Ok(())
    }
}

/// Any booked accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Accumulator {
    /// 1-D histogram.
    H1(Hist1D),
    /// 2-D histogram.
    H2(Hist2D),
    /// Tuple.
    Tuple(Tuple),
}

impl Accumulator {
    /// Create an empty accumulator for a booking request.
    pub fn book(title: &str, spec: &BinSpec) -> Result<Self> {
        Ok(match spec {
            BinSpec::Uniform { n_bins, lo, hi } => {
                Accumulator::H1(Hist1D::uniform(title, *n_bins, *lo, *hi)?)
            }
            BinSpec::Edges { edges } => Accumulator::H1(Hist1D::with_edges(title, edges.clone())?),
            BinSpec::Uniform2D { nx, xlo, xhi, ny, ylo, yhi } => {
                Accumulator::H2(Hist2D::uniform(title, (*nx, *xlo, *xhi), (*ny, *ylo, *yhi))?)
            }
            BinSpec::Tuple { columns } => Accumulator::Tuple(Tuple {
                title: title.to_string(),
                columns: columns.clone(),
                rows: Vec::new(),
            }),
        })
    }

    /// Number of axes (0 for tuples).
    pub fn dimension(&self) -> usize {
        match self {
            Accumulator::H1(_) => 1,
            Accumulator::H2(_) => 2,
            Accumulator::Tuple(_) => 0,
        }
    }

    /// Number of fills so far.
    pub fn entries(&self) -> u64 {
        match self {
            Accumulator::H1(h) => h.entries,
            Accumulator::H2(h) => h.entries,
            Accumulator::Tuple(t) => t.rows.len() as u64,
        }
    }

    /// Dispatch one fill; the value shape must match the accumulator.
    pub fn fill(&mut self, value: &FillValue, weight: Option<f64>) -> Result<()> {
        match (self, value) {
            (Accumulator::H1(h), FillValue::X(x)) => h.fill(*x, weight),
            (Accumulator::H2(h), FillValue::XY(x, y)) => h.fill(*x, *y, weight),
            (Accumulator::Tuple(t), FillValue::Record(r)) => t.fill(r)?,
            (acc, value) => {
                return Err(Error::config(format!(
                    "cannot fill a {}-D accumulator with {value:?}",
                    acc.dimension()
                )));
            }
        }
        Ok(())
    }

    /// Combine with an accumulator of the same kind and binning.
    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        match (self, other) {
            (Accumulator::H1(a), Accumulator::H1(b)) => a.merge(b),
            (Accumulator::H2(a), Accumulator::H2(b)) => a.merge(b),
            (Accumulator::Tuple(a), Accumulator::Tuple(b)) => {
                if a.columns != b.columns {
                    return Err(Error::config(format!("cannot merge tuple '{}'", a.title)));
                }
                a.rows.extend(b.rows.iter().cloned());
                Ok(())
            }
            _ => Err(Error::config("cannot merge accumulators of different kinds")),
        }
    }
}

enum Bin {
    Under,
    In(usize),
    Over,
}

/// Locate `val` in sorted `edges` by binary search.
fn find_bin(edges: &[f64], val: f64) -> Bin {
    if val.is_nan() || val >= edges[edges.len() - 1] {
        return Bin::Over;
    }
    if val < edges[0] {
        return Bin::Under;
    }
    // First edge strictly greater than val, minus one.
    Bin::In(edges.partition_point(|&e| e <= val) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fill_simple() {
        let mut h = Hist1D::with_edges("h", vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        for x in [0.5, 1.5, 2.5, 0.5, -1.0, 3.5] {
            h.fill(x, None);
        }
        assert_eq!(h.bin_content, vec![2.0, 1.0, 1.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 1.0);
        assert_eq!(h.entries, 6);
        assert!(!h.is_weighted());
    }

    #[test]
    fn fill_with_weight() {
        let mut h = Hist1D::with_edges("h", vec![0.0, 1.0, 2.0]).unwrap();
        h.fill(0.5, Some(2.0));
        h.fill(1.5, Some(3.0));
        h.fill(0.5, Some(1.0));
        assert_eq!(h.bin_content, vec![3.0, 3.0]);
        assert_eq!(h.sumw2().unwrap(), &[5.0, 9.0]);
    }

    #[test]
    fn unweighted_and_unit_weight_differ_in_error_tracking() {
        let mut counted = Hist1D::uniform("c", 2, 0.0, 2.0).unwrap();
        let mut weighted = Hist1D::uniform("w", 2, 0.0, 2.0).unwrap();
        counted.fill(0.5, None);
        weighted.fill(0.5, Some(1.0));
        assert_eq!(counted.entries, weighted.entries);
        assert_eq!(counted.integral(), weighted.integral());
        assert!(counted.sumw2().is_none());
        assert_eq!(weighted.sumw2().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn late_weighted_fill_seeds_sumw2_from_counts() {
        let mut h = Hist1D::uniform("h", 1, 0.0, 1.0).unwrap();
        h.fill(0.5, None);
        h.fill(0.5, None);
        h.fill(0.5, Some(3.0));
        assert_eq!(h.bin_content, vec![5.0]);
        assert_eq!(h.sumw2().unwrap(), &[11.0]);
        assert_relative_eq!(h.bin_error(0), 11f64.sqrt());
    }

    #[test]
    fn find_bin_edge_cases() {
        let edges = vec![0.0, 1.0, 2.0, 3.0];
        assert!(matches!(find_bin(&edges, -0.5), Bin::Under));
        assert!(matches!(find_bin(&edges, 3.0), Bin::Over));
        assert!(matches!(find_bin(&edges, f64::NAN), Bin::Over));
        assert!(matches!(find_bin(&edges, 0.0), Bin::In(0)));
        assert!(matches!(find_bin(&edges, 1.0), Bin::In(1)));
        assert!(matches!(find_bin(&edges, 2.99), Bin::In(2)));
    }

    #[test]
    fn invalid_binning_rejected() {
        assert!(Hist1D::uniform("h", 0, 0.0, 1.0).is_err());
        assert!(Hist1D::uniform("h", 3, 1.0, 1.0).is_err());
        assert!(Hist1D::with_edges("h", vec![0.0, 2.0, 1.0]).is_err());
    }

    #[test]
    fn merge_mixed_weighting() {
        let mut a = Hist1D::uniform("h", 2, 0.0, 2.0).unwrap();
        let mut b = a.clone();
        a.fill(0.5, None);
        b.fill(1.5, Some(2.0));
        a.merge(&b).unwrap();
        assert_eq!(a.bin_content, vec![1.0, 2.0]);
        assert_eq!(a.sumw2().unwrap(), &[1.0, 4.0]);
        assert_eq!(a.entries, 2);

        let c = Hist1D::uniform("h", 3, 0.0, 2.0).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn hist2d_fill() {
        let mut h = Hist2D::uniform("h", (2, 0.0, 2.0), (2, 0.0, 2.0)).unwrap();
        h.fill(0.5, 1.5, Some(2.0));
        h.fill(5.0, 0.5, None);
        assert_eq!(h.bin(0, 1), 2.0);
        assert_eq!(h.out_of_range, 1.0);
        assert_eq!(h.entries, 2);
    }

    #[test]
    fn accumulator_rejects_shape_mismatch() {
        let mut acc = Accumulator::book("h", &BinSpec::uniform(2, 0.0, 1.0)).unwrap();
        assert!(acc.fill(&FillValue::XY(0.1, 0.2), None).is_err());
        let mut t = Accumulator::book("t", &BinSpec::tuple(["run", "lumi"])).unwrap();
        t.fill(&FillValue::Record(vec![1.0, 2.0]), None).unwrap();
        assert!(t.fill(&FillValue::Record(vec![1.0]), None).is_err());
        assert_eq!(t.entries(), 1);
    }
}
