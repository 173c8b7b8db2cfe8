//! Predicate registry: named discrete functions of an event.
//!
//! A predicate is either systematic-invariant, `(row) -> Value`, or
//! systematic-aware, `(row, systematic) -> Value`. The active systematic is
//! always an explicit argument; no predicate reads shared mutable state.
//! Every predicate declares the [`ValueKind`] it answers with, so region
//! requirements can be checked before any event is read.

use std::collections::HashMap;
use std::fmt;

use tau_core::{Error, Result, Row, Systematic, Value, ValueKind};

/// Systematic-invariant predicate.
pub type InvariantFn = Box<dyn Fn(&Row<'_>) -> Result<Value> + Send + Sync>;

/// Systematic-aware predicate.
pub type SystematicFn = Box<dyn Fn(&Row<'_>, &Systematic) -> Result<Value> + Send + Sync>;

/// A registered predicate.
pub enum Predicate {
    /// Value never depends on the active systematic; computed once per event.
    Invariant(InvariantFn),
    /// Value is recomputed for every systematic pass.
    Systematic(SystematicFn),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Invariant(_) => f.write_str("Predicate::Invariant"),
            Predicate::Systematic(_) => f.write_str("Predicate::Systematic"),
        }
    }
}

/// Index of a predicate within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredicateId(usize);

/// Per-(event, systematic) predicate outcomes, indexed by [`PredicateId`].
#[derive(Debug, Clone, Default)]
pub struct PredicateValues {
    slots: Vec<Option<Value>>,
}

impl PredicateValues {
    /// Outcome of a predicate, if it was computed for this pass.
    pub fn get(&self, id: PredicateId) -> Option<Value> {
        self.slots.get(id.0).copied().flatten()
    }

    fn reset(&mut self, n: usize) {
        self.slots.clear();
        self.slots.resize(n, None);
    }
}

/// Name-keyed collection of predicates.
#[derive(Debug, Default)]
pub struct PredicateRegistry {
    names: Vec<String>,
    kinds: Vec<ValueKind>,
    predicates: Vec<Predicate>,
    index: HashMap<String, usize>,
}

impl PredicateRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under `name`.
    ///
    /// Closures cannot be compared, so a second registration under the same
    /// name is rejected rather than assumed interchangeable.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        predicate: Predicate,
    ) -> Result<PredicateId> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::config(format!("predicate '{name}' registered twice")));
        }
        let id = self.predicates.len();
        self.index.insert(name.clone(), id);
        self.names.push(name);
        self.kinds.push(kind);
        self.predicates.push(predicate);
        Ok(PredicateId(id))
    }

    /// Register a systematic-invariant predicate.
    pub fn invariant<F>(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        f: F,
    ) -> Result<PredicateId>
    where
        F: Fn(&Row<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, kind, Predicate::Invariant(Box::new(f)))
    }

    /// Register a systematic-aware predicate.
    pub fn systematic<F>(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        f: F,
    ) -> Result<PredicateId>
    where
        F: Fn(&Row<'_>, &Systematic) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, kind, Predicate::Systematic(Box::new(f)))
    }

    /// Number of registered predicates.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Look up a predicate by name.
    pub fn id(&self, name: &str) -> Option<PredicateId> {
        self.index.get(name).map(|&i| PredicateId(i))
    }

    /// Name of a predicate.
    pub fn name(&self, id: PredicateId) -> &str {
        &self.names[id.0]
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Declared value kind of a predicate.
    pub fn kind(&self, id: PredicateId) -> ValueKind {
        self.kinds[id.0]
    }

    /// True if the predicate depends on the active systematic.
    pub fn is_systematic(&self, id: PredicateId) -> bool {
        matches!(self.predicates[id.0], Predicate::Systematic(_))
    }

    /// Start a new event: clear all slots and compute the invariant ones.
    pub fn evaluate_invariant(&self, row: &Row<'_>, values: &mut PredicateValues) -> Result<()> {
        values.reset(self.predicates.len());
        for (i, p) in self.predicates.iter().enumerate() {
            if let Predicate::Invariant(f) = p {
                values.slots[i] = Some(self.checked(i, f(row)?)?);
            }
        }
        Ok(())
    }

    /// Overwrite the systematic-aware slots for one systematic pass; the
    /// invariant slots computed for this event are left untouched.
    pub fn evaluate_systematic(
        &self,
        row: &Row<'_>,
        systematic: &Systematic,
        values: &mut PredicateValues,
    ) -> Result<()> {
        for (i, p) in self.predicates.iter().enumerate() {
            if let Predicate::Systematic(f) = p {
                values.slots[i] = Some(self.checked(i, f(row, systematic)?)?);
            }
        }
        Ok(())
    }

    fn checked(&self, i: usize, value: Value) -> Result<Value> {
        if value.kind() != self.kinds[i] {
            return Err(Error::config(format!(
                "predicate '{}' is declared {} but returned {value}",
                self.names[i], self.kinds[i]
            )));
        }
        Ok(value)
    }
}
