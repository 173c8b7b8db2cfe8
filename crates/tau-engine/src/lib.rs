//! # tau-engine
//!
//! Region classification and histogram filling for tau identification
//! efficiency measurements.
//!
//! A [`Channel`] bundles everything specific to one final state: the
//! preselection, the event weight, the named predicates, the region axes and
//! the histogram bookings. [`Engine::begin`] expands the axes into a flat
//! [`RegionCatalog`], books every `<region>/<variable>` histogram, binds
//! variables to row fields and rejects any inconsistency before the first
//! event. [`Engine::process`] then classifies each event into every matching
//! region, once per systematic pass, and fills the bound histograms.
//!
//! ```
//! use tau_core::{EventTable, Schema, Value, ValueKind};
//! use tau_engine::{Axis, Booking, CatalogBuilder, Channel, Engine, EngineOptions, PredicateRegistry};
//!
//! let schema = Schema::new(["pt", "ss"]).unwrap();
//! let ss = schema.field("ss").unwrap();
//! let mut predicates = PredicateRegistry::new();
//! predicates
//!     .invariant("os", ValueKind::Bool, move |row| Ok(Value::Bool(!row.flag(&ss)?)))
//!     .unwrap();
//!
//! let channel = Channel::new("demo")
//!     .predicates(predicates)
//!     .regions(CatalogBuilder::new().object_id_spec("all", Default::default()).axis(Axis::boolean("os", "os", "ss")))
//!     .book(Booking::uniform("pt", "pt", 10, 0.0, 100.0));
//! let engine = Engine::begin(channel, EngineOptions::default(), &schema).unwrap();
//!
//! let table = EventTable::from_columns(schema, &[vec![25.0, 55.0], vec![0.0, 1.0]]).unwrap();
//! let out = engine.process(table.rows()).unwrap();
//! assert_eq!(out.store.h1("nominal/all/os/pt").unwrap().entries, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod catalog;
pub mod channel;
pub mod channels;
pub mod config;
pub mod corrections;
pub mod engine;
pub mod predicate;
pub mod selections;

pub use binding::{BindingTable, Booking, PAIR_SEPARATOR};
pub use catalog::{Axis, CatalogBuilder, Region, RegionCatalog, RegionSpec};
pub use channel::Channel;
pub use channels::ChannelKind;
pub use config::RunConfig;
pub use corrections::{McCorrections, PileupConfig, ScaleFactorTable, WeightTable};
pub use engine::{
    DEFAULT_CHUNK_SIZE, Engine, EngineOptions, FillState, MalformedPolicy, ProcessStats, RunOutput,
    WeightMode,
};
pub use predicate::{PredicateId, PredicateRegistry, PredicateValues};
