//! Channel capability struct: everything that distinguishes one final state
//! from another, handed to the one generic [`Engine`](crate::Engine).

use std::collections::BTreeMap;
use std::fmt;

use tau_core::{Result, Row, Systematic};
use tau_hist::FillValue;

use crate::binding::Booking;
use crate::catalog::CatalogBuilder;
use crate::predicate::PredicateRegistry;

/// Event-level gate, evaluated once per event before any systematic pass.
pub type PreselectionFn = Box<dyn Fn(&Row<'_>) -> Result<bool> + Send + Sync>;

/// Event weight. `None` means "fill unweighted". The systematic argument is
/// the active pass label under [`WeightMode::PerSystematic`](crate::WeightMode)
/// and always `nominal` otherwise.
pub type WeightFn = Box<dyn Fn(&Row<'_>, &Systematic) -> Result<Option<f64>> + Send + Sync>;

/// Custom extraction for a variable: receives the row and the event weight,
/// returns the value to fill and the weight to fill it with (which may
/// differ from the event weight, e.g. `None` for an unweighted count).
pub type CompoundFn =
    Box<dyn Fn(&Row<'_>, Option<f64>) -> Result<(FillValue, Option<f64>)> + Send + Sync>;

/// One analysis channel.
pub struct Channel {
    /// Channel name (`mt`, `mm`, ...).
    pub name: String,
    /// Baseline object-quality / trigger gate.
    pub preselection: PreselectionFn,
    /// Event weight.
    pub weight: WeightFn,
    /// Predicates referenced by the region axes.
    pub predicates: PredicateRegistry,
    /// Region axis description.
    pub regions: CatalogBuilder,
    /// Variables booked in every region.
    pub bookings: Vec<Booking>,
    /// Variables filled through custom extraction instead of a row field.
    pub compounds: BTreeMap<String, CompoundFn>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("predicates", &self.predicates.names())
            .field("bookings", &self.bookings.len())
            .field("compounds", &self.compounds.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Channel {
    /// Channel that accepts every event with unit weight and has no regions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preselection: Box::new(|_| Ok(true)),
            weight: Box::new(|_, _| Ok(Some(1.0))),
            predicates: PredicateRegistry::new(),
            regions: CatalogBuilder::new(),
            bookings: Vec::new(),
            compounds: BTreeMap::new(),
        }
    }

    /// Set the preselection.
    pub fn preselection<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.preselection = Box::new(f);
        self
    }

    /// Set the weight function.
    pub fn weight<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row<'_>, &Systematic) -> Result<Option<f64>> + Send + Sync + 'static,
    {
        self.weight = Box::new(f);
        self
    }

    /// Set the predicate registry.
    pub fn predicates(mut self, registry: PredicateRegistry) -> Self {
        self.predicates = registry;
        self
    }

    /// Set the region axes.
    pub fn regions(mut self, builder: CatalogBuilder) -> Self {
        self.regions = builder;
        self
    }

    /// Add a booking.
    pub fn book(mut self, booking: Booking) -> Self {
        self.bookings.push(booking);
        self
    }

    /// Register a compound variable.
    pub fn compound<F>(mut self, variable: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Row<'_>, Option<f64>) -> Result<(FillValue, Option<f64>)> + Send + Sync + 'static,
    {
        self.compounds.insert(variable.into(), Box::new(f));
        self
    }
}
