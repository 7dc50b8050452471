//! concord - Answer extraction and ensemble voting for quantitative problems.
//!
//! ## Architecture
//!
//! Several solving methods sample an OpenAI-compatible completion engine for
//! each problem. Every sample is reduced to a canonical answer:
//! - **Zero-shot / CoT**: the number after the last "The answer is "
//! - **Declarative**: tagged equations extracted and solved symbolically
//! - **PAL**: a generated `solution()` program executed with a timeout
//!
//! The canonical answers of a problem are then decided by a seeded voter
//! (mode with tie sampling, or frequency sampling) or by the engine itself.
//!
//! ## Modules
//!
//! - `answer`: canonicalizer, equation extractor, symbolic solver, voter
//! - `client`: engine and program-executor capabilities
//! - `methods`: prompts and per-method answer derivation
//! - `pool`: sampling and decisions
//! - `pipeline`: evaluation runs, JSONL records and text report

pub mod answer;
pub mod client;
pub mod methods;
pub mod models;
pub mod pipeline;
pub mod pool;

// Re-exports for convenience
pub use answer::{CanonicalAnswer, FailureTag, Voter, canonicalize, extract_equations, solve};
pub use client::{CodeExecutor, Generator, LlmClient, PythonExecutor};
pub use models::{Config, ConcordError, Problem, ProblemRecord, Result, RunStats};
pub use pipeline::EvalPipeline;
pub use pool::{Decider, SamplePool};
