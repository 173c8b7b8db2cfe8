//! # tau-core
//!
//! Shared types for the tau identification efficiency pipeline.
//!
//! This crate carries the pieces every other crate agrees on: the error
//! taxonomy, the discrete [`Value`] a predicate produces, the [`Systematic`]
//! label, and the row [`Schema`] through which event fields are resolved once
//! at startup and read by index afterwards.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod schema;
pub mod types;

pub use error::{Error, Result};
pub use schema::{EventTable, Field, Row, Schema};
pub use types::{SampleKind, Systematic, Value, ValueKind};
