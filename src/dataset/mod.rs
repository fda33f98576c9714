//! Dataset input and output.
//!
//! - [`input`] - reading the input CSV and selecting prompt columns
//! - [`output`] - the GOOD and ISSUES CSVs
//! - [`run_log`] - the per-row text log

pub mod input;
pub mod output;
pub mod run_log;

pub use input::InputTable;
pub use output::{Destination, OutputDatasets, ISSUE_COLUMNS};
pub use run_log::{RunLog, LOG_HEADER};
