//! # tau-yields
//!
//! The aggregation layer: turns per-sample histogram stores into yield
//! tables, estimates the data-driven backgrounds with the ABCD method and
//! computes the tau identification efficiency with correlated errors.
//!
//! Nothing here touches events. The only input is the JSON the engine
//! writes, and the only contract with the engine is the histogram path
//! `<systematic>/<region>/<variable>`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abcd;
pub mod efficiency;
pub mod measured;
pub mod record;
pub mod table;

pub use abcd::{AbcdInputs, DataDrivenNames, QcdEstimate, SidebandLayout};
pub use efficiency::{ChannelYields, EfficiencyReport, ReportRow, Summary};
pub use measured::Measured;
pub use record::YieldRecord;
pub use table::{BKG_SUM, DATA, SampleHistograms, YieldTable, tabulate};
