//! Progress and reporting module
//!
//! Live progress display for a run and the single end-of-run report.

mod reporter;
mod summary;

pub use reporter::*;
pub use summary::*;
