//! Clients for the external capabilities: text generation and code execution.

mod executor;
mod llm_client;

pub use executor::*;
pub use llm_client::*;

#[cfg(test)]
pub mod testing;
