//! Values with named, correlated error components.
//!
//! A [`Measured`] carries a central value and a map `tag -> signed absolute
//! error`. Components with the same tag come from the same source and are
//! fully correlated, components with different tags are independent. All
//! arithmetic propagates to first order, so `a - a` has zero error and
//! `a / a` is exactly one with zero error.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::record::{SYS_PREFIX, YieldRecord};

/// Value with per-source error components.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measured {
    value: f64,
    components: BTreeMap<String, f64>,
}

impl Measured {
    /// Exact value (no error components).
    pub fn exact(value: f64) -> Self {
        Self { value, components: BTreeMap::new() }
    }

    /// Value with a single error component.
    pub fn new(value: f64, error: f64, tag: impl Into<String>) -> Self {
        let mut m = Self::exact(value);
        m.add_component(tag.into(), error);
        m
    }

    /// Build from a yield record.
    ///
    /// The statistical error is tagged `<name>_stat`; each systematic shift
    /// `sys_<s>` becomes a component tagged `<name>_sys_<s>`.
    pub fn from_record(name: &str, record: &YieldRecord) -> Self {
        let mut m = Self::new(record.value, record.stat, format!("{name}_stat"));
        for (sys, shift) in &record.sys {
            m.add_component(format!("{name}_{SYS_PREFIX}{sys}"), *shift);
        }
        m
    }

    /// Central value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Iterate over `(tag, signed error)`.
    pub fn components(&self) -> impl Iterator<Item = (&str, f64)> {
        self.components.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Total error: quadrature sum over all components.
    pub fn error(&self) -> f64 {
        quad(self.components.values().copied())
    }

    /// Quadrature sum over the components whose tag contains `pattern`.
    pub fn error_matching(&self, pattern: &str) -> f64 {
        quad(self.components.iter().filter(|(k, _)| k.contains(pattern)).map(|(_, v)| *v))
    }

    /// Multiply by `1 +- rel` with the relative error under `tag`.
    pub fn with_relative(self, rel: f64, tag: impl Into<String>) -> Self {
        self * Measured::new(1.0, rel, tag)
    }

    /// Collapse into a yield record: `stat` collects every component tagged
    /// `stat`, the rest are summed in quadrature into `sys_total`.
    pub fn to_record(&self) -> YieldRecord {
        let stat = self.error_matching("stat");
        let other = quad(self.components.iter().filter(|(k, _)| !k.contains("stat")).map(|(_, v)| *v));
        let record = YieldRecord::new(self.value, stat);
        if other > 0.0 { record.with_sys("total", other) } else { record }
    }

    fn add_component(&mut self, tag: String, error: f64) {
        if error != 0.0 {
            *self.components.entry(tag).or_insert(0.0) += error;
        }
    }

    /// `da * self + db * other` on the components, `value` on the value.
    fn combine(&self, other: &Measured, value: f64, da: f64, db: f64) -> Measured {
        let mut out = Measured::exact(value);
        for (k, v) in &self.components {
            out.add_component(k.clone(), da * v);
        }
        for (k, v) in &other.components {
            out.add_component(k.clone(), db * v);
        }
        out
    }

    fn scaled(&self, factor: f64) -> Measured {
        Measured {
            value: self.value * factor,
            components: self.components.iter().map(|(k, v)| (k.clone(), v * factor)).collect(),
        }
    }
}

fn quad(xs: impl Iterator<Item = f64>) -> f64 {
    xs.map(|x| x * x).sum::<f64>().sqrt()
}

impl fmt::Display for Measured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} +/- {}", self.value, self.error())
    }
}

impl From<f64> for Measured {
    fn from(value: f64) -> Self {
        Measured::exact(value)
    }
}

impl Add<&Measured> for &Measured {
    type Output = Measured;
    fn add(self, rhs: &Measured) -> Measured {
        self.combine(rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl Sub<&Measured> for &Measured {
    type Output = Measured;
    fn sub(self, rhs: &Measured) -> Measured {
        self.combine(rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl Mul<&Measured> for &Measured {
    type Output = Measured;
    fn mul(self, rhs: &Measured) -> Measured {
        self.combine(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl Div<&Measured> for &Measured {
    type Output = Measured;
    fn div(self, rhs: &Measured) -> Measured {
        let q = self.value / rhs.value;
        self.combine(rhs, q, 1.0 / rhs.value, -q / rhs.value)
    }
}

impl Neg for &Measured {
    type Output = Measured;
    fn neg(self) -> Measured {
        self.scaled(-1.0)
    }
}

impl Neg for Measured {
    type Output = Measured;
    fn neg(self) -> Measured {
        self.scaled(-1.0)
    }
}

impl Mul<f64> for &Measured {
    type Output = Measured;
    fn mul(self, rhs: f64) -> Measured {
        self.scaled(rhs)
    }
}

impl Div<f64> for &Measured {
    type Output = Measured;
    fn div(self, rhs: f64) -> Measured {
        self.scaled(1.0 / rhs)
    }
}

macro_rules! forward_owned {
    ($($tr:ident $m:ident),*) => {$(
        impl $tr<Measured> for Measured {
            type Output = Measured;
            fn $m(self, rhs: Measured) -> Measured {
                (&self).$m(&rhs)
            }
        }
        impl $tr<&Measured> for Measured {
            type Output = Measured;
            fn $m(self, rhs: &Measured) -> Measured {
                (&self).$m(rhs)
            }
        }
        impl $tr<Measured> for &Measured {
            type Output = Measured;
            fn $m(self, rhs: Measured) -> Measured {
                self.$m(&rhs)
            }
        }
        impl $tr<f64> for Measured {
            type Output = Measured;
            fn $m(self, rhs: f64) -> Measured {
                (&self).$m(&Measured::exact(rhs))
            }
        }
    )*};
}

forward_owned!(Add add, Sub sub);

impl Add<f64> for &Measured {
    type Output = Measured;
    fn add(self, rhs: f64) -> Measured {
        self + &Measured::exact(rhs)
    }
}

impl Sub<f64> for &Measured {
    type Output = Measured;
    fn sub(self, rhs: f64) -> Measured {
        self - &Measured::exact(rhs)
    }
}

impl Mul<Measured> for Measured {
    type Output = Measured;
    fn mul(self, rhs: Measured) -> Measured {
        &self * &rhs
    }
}

impl Mul<&Measured> for Measured {
    type Output = Measured;
    fn mul(self, rhs: &Measured) -> Measured {
        &self * rhs
    }
}

impl Mul<f64> for Measured {
    type Output = Measured;
    fn mul(self, rhs: f64) -> Measured {
        self.scaled(rhs)
    }
}

impl Div<Measured> for Measured {
    type Output = Measured;
    fn div(self, rhs: Measured) -> Measured {
        &self / &rhs
    }
}

impl Div<&Measured> for Measured {
    type Output = Measured;
    fn div(self, rhs: &Measured) -> Measured {
        &self / rhs
    }
}

impl Div<f64> for Measured {
    type Output = Measured;
    fn div(self, rhs: f64) -> Measured {
        self.scaled(1.0 / rhs)
    }
}

impl Sum for Measured {
    fn sum<I: Iterator<Item = Measured>>(iter: I) -> Measured {
        iter.fold(Measured::exact(0.0), |acc, m| &acc + &m)
    }
}

impl<'a> Sum<&'a Measured> for Measured {
    fn sum<I: Iterator<Item = &'a Measured>>(iter: I) -> Measured {
        iter.fold(Measured::exact(0.0), |acc, m| &acc + m)
    }
}
