//! Event classifier & filler.
//!
//! Per event: preselection, systematic-invariant predicates, then for each
//! systematic pass the systematic-aware predicates, the event weight, region
//! membership and the fills of every variable bound to a matching region.
//!
//! All fills of one event are staged and committed together, so an event
//! dropped under [`MalformedPolicy::Skip`] leaves no partial trace.

use std::ops::Range;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tau_core::{Error, EventTable, Field, Result, Row, SampleKind, Schema, Systematic};
use tau_hist::{Accumulator, FillValue, HistId, HistogramStore};

use crate::binding::{BindingTable, PAIR_SEPARATOR, book_catalog};
use crate::catalog::{CompiledSpec, RegionCatalog};
use crate::channel::{Channel, CompoundFn, PreselectionFn, WeightFn};
use crate::predicate::{PredicateRegistry, PredicateValues};

/// Default rows per parallel work unit.
pub const DEFAULT_CHUNK_SIZE: usize = 16_384;

/// Whether the event weight is recomputed for every systematic pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    /// Computed once per event with the nominal label.
    #[default]
    PerEvent,
    /// Computed in every pass with that pass's label.
    PerSystematic,
}

/// What to do with an event that raises a data error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Abort the run on the first malformed event.
    #[default]
    Abort,
    /// Drop the event and count it in [`ProcessStats::malformed`].
    Skip,
}

/// Run-level engine options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Data or simulation.
    pub kind: SampleKind,
    /// Requested systematic passes; `nominal` is always run first.
    pub systematics: Vec<Systematic>,
    /// Weight recomputation policy.
    pub weight_mode: WeightMode,
    /// Malformed-event policy.
    pub malformed: MalformedPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            kind: SampleKind::Mc,
            systematics: vec![Systematic::nominal()],
            weight_mode: WeightMode::default(),
            malformed: MalformedPolicy::default(),
        }
    }
}

impl EngineOptions {
    /// Systematic passes to run: data gets `nominal` only, simulation gets
    /// `nominal` followed by the requested labels in order, deduplicated.
    pub fn pass_labels(&self) -> Vec<Systematic> {
        let mut out = vec![Systematic::nominal()];
        if self.kind.is_data() {
            return out;
        }
        for s in &self.systematics {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
        out
    }
}

/// Event counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Events read.
    pub events: u64,
    /// Events passing preselection.
    pub preselected: u64,
    /// Events dropped as malformed.
    pub malformed: u64,
    /// (event, region) memberships across all passes.
    pub region_matches: u64,
    /// Individual histogram fills.
    pub fills: u64,
}

impl ProcessStats {
    fn merge(&mut self, other: &ProcessStats) {
        self.events += other.events;
        self.preselected += other.preselected;
        self.malformed += other.malformed;
        self.region_matches += other.region_matches;
        self.fills += other.fills;
    }
}

/// Mutable per-worker state: the private store, counters and scratch space.
#[derive(Debug, Clone)]
pub struct FillState {
    /// Histograms filled so far.
    pub store: HistogramStore,
    /// Counters so far.
    pub stats: ProcessStats,
    values: PredicateValues,
    pending: Vec<(HistId, FillValue, Option<f64>)>,
    region_matches: u64,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Filled histograms.
    pub store: HistogramStore,
    /// Counters.
    pub stats: ProcessStats,
}

#[derive(Debug, Clone)]
enum FillSource {
    Field(Field),
    Pair(Field, Field),
    Compound(usize),
}

#[derive(Debug, Clone)]
struct Fill {
    id: HistId,
    source: FillSource,
}

#[derive(Debug)]
struct CompiledRegion {
    path: String,
    spec: CompiledSpec,
    fills: Vec<Fill>,
}

#[derive(Debug)]
struct Pass {
    systematic: Systematic,
    regions: Vec<CompiledRegion>,
}

/// The region engine for one channel and one sample.
pub struct Engine {
    channel: String,
    preselection: PreselectionFn,
    weight: WeightFn,
    registry: PredicateRegistry,
    catalog: RegionCatalog,
    compounds: Vec<(String, CompoundFn)>,
    passes: Vec<Pass>,
    template: HistogramStore,
    options: EngineOptions,
    nominal: Systematic,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("channel", &self.channel)
            .field("regions", &self.catalog.len())
            .field("histograms", &self.template.len())
            .field("passes", &self.passes.len())
            .finish()
    }
}

impl Engine {
    /// Build the catalog, book and bind histograms and resolve every fill
    /// source against `schema`. All configuration errors surface here,
    /// before any event is read.
    pub fn begin(channel: Channel, options: EngineOptions, schema: &Schema) -> Result<Self> {
        let systematics = options.pass_labels();
        let skipped = options.systematics.iter().filter(|s| !s.is_nominal()).count();
        if options.kind.is_data() && skipped > 0 {
            log::info!("data sample: skipping {skipped} systematic passes");
        }

        let Channel { name, preselection, weight, predicates, regions, bookings, compounds } =
            channel;

        let catalog = regions.build(&systematics)?;
        catalog.validate(&predicates)?;

        let mut template = HistogramStore::new();
        book_catalog(&mut template, &catalog, &bookings)?;
        let bindings = BindingTable::bind(&template)?;
        for region in bindings.regions() {
            if catalog.get(region).is_none() {
                return Err(Error::config(format!("histograms bound to unknown region '{region}'")));
            }
        }

        let compounds: Vec<(String, CompoundFn)> = compounds.into_iter().collect();
        let mut used = vec![false; compounds.len()];

        let mut passes = Vec::with_capacity(systematics.len());
        for sys in &systematics {
            let mut compiled = Vec::new();
            for region in catalog.for_systematic(sys) {
                let spec = region.spec.compile(&predicates, &region.path)?;
                let mut fills = Vec::new();
                for bound in bindings.variables(&region.path) {
                    let acc = template.accumulator(bound.id);
                    let source = resolve_source(&bound.variable, acc, &compounds, schema)
                        .map_err(|e| {
                            Error::config(format!("region '{}': {e}", region.path))
                        })?;
                    if let FillSource::Compound(i) = source {
                        used[i] = true;
                    }
                    fills.push(Fill { id: bound.id, source });
                }
                compiled.push(CompiledRegion { path: region.path.clone(), spec, fills });
            }
            passes.push(Pass { systematic: sys.clone(), regions: compiled });
        }
        if let Some(i) = used.iter().position(|u| !u) {
            return Err(Error::config(format!(
                "compound variable '{}' is never booked",
                compounds[i].0
            )));
        }

        log::info!(
            "channel '{name}': {} regions, {} histograms, {} systematic passes",
            catalog.len(),
            template.len(),
            passes.len()
        );

        Ok(Self {
            channel: name,
            preselection,
            weight,
            registry: predicates,
            catalog,
            compounds,
            passes,
            template,
            options,
            nominal: Systematic::nominal(),
        })
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The region catalog.
    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// The predicate registry.
    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    /// Systematic passes in execution order.
    pub fn systematics(&self) -> impl Iterator<Item = &Systematic> {
        self.passes.iter().map(|p| &p.systematic)
    }

    /// Fresh per-worker state with every histogram booked and empty.
    pub fn new_state(&self) -> FillState {
        FillState {
            store: self.template.clone(),
            stats: ProcessStats::default(),
            values: PredicateValues::default(),
            pending: Vec::new(),
            region_matches: 0,
        }
    }

    /// Classify one event and fill its histograms into `state`.
    pub fn process_row(&self, row: &Row<'_>, state: &mut FillState) -> Result<()> {
        state.stats.events += 1;
        state.pending.clear();
        state.region_matches = 0;
        match self.classify(row, state) {
            Ok(false) => Ok(()),
            Ok(true) => {
                state.stats.preselected += 1;
                state.stats.region_matches += state.region_matches;
                state.stats.fills += state.pending.len() as u64;
                for (id, value, weight) in state.pending.drain(..) {
                    state.store.fill(id, &value, weight)?;
                }
                Ok(())
            }
            Err(e) if e.is_data() && self.options.malformed == MalformedPolicy::Skip => {
                state.stats.malformed += 1;
                log::warn!("dropping malformed event: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stage the fills of one event; `Ok(false)` if preselection rejected it.
    fn classify(&self, row: &Row<'_>, state: &mut FillState) -> Result<bool> {
        if !(self.preselection)(row)? {
            return Ok(false);
        }
        self.registry.evaluate_invariant(row, &mut state.values)?;

        let event_weight = match self.options.weight_mode {
            WeightMode::PerEvent => Some(self.event_weight(row, &self.nominal)?),
            WeightMode::PerSystematic => None,
        };

        for pass in &self.passes {
            self.registry.evaluate_systematic(row, &pass.systematic, &mut state.values)?;
            let weight = match event_weight {
                Some(w) => w,
                None => self.event_weight(row, &pass.systematic)?,
            };
            for region in &pass.regions {
                if !region.spec.matches(&state.values, &region.path)? {
                    continue;
                }
                state.region_matches += 1;
                for fill in &region.fills {
                    let (value, w) = self.extract(&fill.source, row, weight)?;
                    state.pending.push((fill.id, value, w));
                }
            }
        }
        Ok(true)
    }

    fn event_weight(&self, row: &Row<'_>, sys: &Systematic) -> Result<Option<f64>> {
        match (self.weight)(row, sys)? {
            Some(w) if !w.is_finite() || w < 0.0 => Err(Error::Data {
                entry: row.entry(),
                field: format!("event weight ({sys})"),
                value: w,
            }),
            w => Ok(w),
        }
    }

    fn extract(
        &self,
        source: &FillSource,
        row: &Row<'_>,
        weight: Option<f64>,
    ) -> Result<(FillValue, Option<f64>)> {
        Ok(match source {
            FillSource::Field(f) => (FillValue::X(row.get(f)?), weight),
            FillSource::Pair(x, y) => (FillValue::XY(row.get(x)?, row.get(y)?), weight),
            FillSource::Compound(i) => (self.compounds[*i].1)(row, weight)?,
        })
    }

    /// Process rows sequentially in source order.
    pub fn process<'a, I>(&self, rows: I) -> Result<RunOutput>
    where
        I: IntoIterator<Item = Row<'a>>,
    {
        let mut state = self.new_state();
        for row in rows {
            self.process_row(&row, &mut state)?;
        }
        Ok(RunOutput { store: state.store, stats: state.stats })
    }

    /// Process a table in fixed-size chunks on the rayon pool.
    ///
    /// Each chunk fills a private store; stores are merged in chunk order,
    /// so the result depends on `chunk_size` but not on scheduling.
    pub fn process_parallel(&self, table: &EventTable, chunk_size: usize) -> Result<RunOutput> {
        let chunk_size = chunk_size.max(1);
        let ranges: Vec<Range<usize>> = (0..table.len())
            .step_by(chunk_size)
            .map(|start| start..(start + chunk_size).min(table.len()))
            .collect();

        let states: Vec<FillState> = ranges
            .into_par_iter()
            .map(|range| -> Result<FillState> {
                let mut state = self.new_state();
                for row in table.rows_in(range) {
                    self.process_row(&row, &mut state)?;
                }
                Ok(state)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut out = RunOutput { store: self.template.clone(), stats: ProcessStats::default() };
        for state in &states {
            out.store.merge(&state.store)?;
            out.stats.merge(&state.stats);
        }
        Ok(out)
    }

    /// Persist the filled histograms and log the run counters.
    pub fn finish(&self, output: &RunOutput, path: &Path) -> Result<()> {
        let s = &output.stats;
        log::info!(
            "channel '{}': {} events, {} preselected, {} region matches, {} fills",
            self.channel,
            s.events,
            s.preselected,
            s.region_matches,
            s.fills
        );
        if s.malformed > 0 {
            log::warn!("channel '{}': dropped {} malformed events", self.channel, s.malformed);
        }
        output.store.write_json(path)
    }
}

fn resolve_source(
    variable: &str,
    acc: &Accumulator,
    compounds: &[(String, CompoundFn)],
    schema: &Schema,
) -> Result<FillSource> {
    if let Some(i) = compounds.iter().position(|(name, _)| name == variable) {
        return Ok(FillSource::Compound(i));
    }
    let field = |name: &str| {
        schema.field(name).map_err(|_| {
            Error::config(format!("variable '{variable}' reads missing row field '{name}'"))
        })
    };
    match acc {
        Accumulator::H1(_) => Ok(FillSource::Field(field(variable)?)),
        Accumulator::H2(_) => {
            let (x, y) = variable.split_once(PAIR_SEPARATOR).ok_or_else(|| {
                Error::config(format!("2-D variable '{variable}' lacks '{PAIR_SEPARATOR}'"))
            })?;
            Ok(FillSource::Pair(field(x)?, field(y)?))
        }
        Accumulator::Tuple(_) => Err(Error::config(format!(
            "tuple variable '{variable}' needs a compound extractor"
        ))),
    }
}
