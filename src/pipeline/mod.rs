//! Pipeline module - evaluation runs and reporting.

mod eval;
mod report;

pub use eval::*;
pub use report::*;
