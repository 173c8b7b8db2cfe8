//! Error types for the tau efficiency pipeline.

use thiserror::Error;

/// Pipeline error type.
///
/// Every variant except [`Error::Data`] indicates a setup bug and is fatal
/// for the run. `Data` is raised per event; whether it aborts the run is
/// decided by the caller's malformed-event policy.
#[derive(Error, Debug)]
pub enum Error {
    /// Inconsistent setup: duplicate region path, predicate referenced but
    /// never computed, unknown systematic, booking/schema drift.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A row is missing a field the configuration needs.
    #[error("schema error: missing field '{field}'")]
    Schema {
        /// Name of the missing field.
        field: String,
    },

    /// A single event carries a malformed value.
    #[error("data error: entry {entry}: '{field}' is not usable ({value})")]
    Data {
        /// Entry number of the event in its source.
        entry: u64,
        /// Field (or derived quantity) that was malformed.
        field: String,
        /// Offending value.
        value: f64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// True for per-event data errors (the only recoverable kind).
    pub fn is_data(&self) -> bool {
        matches!(self, Error::Data { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let e = Error::Schema { field: "mPt".into() };
        assert!(e.to_string().contains("mPt"));

        let e = Error::Data { entry: 7, field: "tPt".into(), value: f64::NAN };
        assert!(e.is_data());
        assert!(e.to_string().contains("entry 7"));
        assert!(e.to_string().contains("tPt"));

        assert!(!Error::config("duplicate region").is_data());
    }
}
