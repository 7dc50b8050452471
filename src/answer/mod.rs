//! Answer extraction and voting.
//!
//! Everything here is synchronous and free of I/O: raw sample text goes in,
//! canonical answers and a voting decision come out.

pub mod canonical;
pub mod declarative;
pub mod symbolic;
pub mod vote;

pub use canonical::{BUG, CanonicalAnswer, canonicalize};
pub use declarative::extract_equations;
pub use symbolic::{FailureTag, solve};
pub use vote::{
    DecisionMethod, FrequencyTable, VoteError, Voter, VotingDecision, VotingStrategy,
};
