//! Pool module - sample generation and final-answer decisions.

mod judge;
mod worker;

pub use judge::*;
pub use worker::*;
