//! Voting over the canonical answers of one problem.

use super::canonical::CanonicalAnswer;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("no valid candidate answers to vote on")]
    NoCandidates,
}

/// Canonical answer counts for one problem, in first-seen order.
///
/// The order fixes the layout of the weighted pool, so a seeded draw over
/// the same samples always picks the same answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<(CanonicalAnswer, usize)>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw canonical answers, skipping the `"bug"` sentinel.
    pub fn from_answers<'a>(answers: impl IntoIterator<Item = &'a CanonicalAnswer>) -> Self {
        let mut table = Self::new();
        for answer in answers {
            if !answer.is_bug() {
                table.record(answer.clone());
            }
        }
        table
    }

    /// Count one occurrence and return the new count.
    pub fn record(&mut self, answer: CanonicalAnswer) -> usize {
        match self.entries.iter_mut().find(|(a, _)| *a == answer) {
            Some((_, count)) => {
                *count += 1;
                *count
            }
            None => {
                self.entries.push((answer, 1));
                1
            }
        }
    }

    pub fn get(&self, answer: &CanonicalAnswer) -> usize {
        self.entries
            .iter()
            .find(|(a, _)| a == answer)
            .map_or(0, |(_, count)| *count)
    }

    pub fn max_frequency(&self) -> usize {
        self.entries.iter().map(|(_, c)| *c).max().unwrap_or(0)
    }

    /// Number of distinct answers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalAnswer, usize)> {
        self.entries.iter().map(|(a, c)| (a, *c))
    }
}

/// How the final answer is picked from the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    /// Unique most frequent answer; ties broken by weighted draw.
    #[default]
    Mode,
    /// Always a weighted draw over all answers.
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMethod {
    Mode,
    Sampling,
}

impl DecisionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionMethod::Mode => "mode",
            DecisionMethod::Sampling => "sampling",
        }
    }
}

impl fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingDecision {
    pub answer: CanonicalAnswer,
    pub method: DecisionMethod,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Voter {
    strategy: VotingStrategy,
}

impl Voter {
    /// Create a new voter with the given strategy.
    pub fn new(strategy: VotingStrategy) -> Self {
        Self { strategy }
    }

    /// Pick the final answer from `table`.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        table: &FrequencyTable,
        rng: &mut R,
    ) -> Result<VotingDecision, VoteError> {
        if table.is_empty() {
            return Err(VoteError::NoCandidates);
        }

        match self.strategy {
            VotingStrategy::Mode => {
                let max = table.max_frequency();
                let tied: Vec<(&CanonicalAnswer, usize)> =
                    table.iter().filter(|(_, c)| *c == max).collect();

                if let [(answer, _)] = tied.as_slice() {
                    return Ok(VotingDecision {
                        answer: (*answer).clone(),
                        method: DecisionMethod::Mode,
                    });
                }
                weighted_draw(tied, rng)
            }
            VotingStrategy::Frequency => weighted_draw(table.iter().collect(), rng),
        }
    }

    /// Vote over raw canonical answers; `"bug"` entries are dropped.
    pub fn decide_answers<R: Rng + ?Sized>(
        &self,
        answers: &[CanonicalAnswer],
        rng: &mut R,
    ) -> Result<VotingDecision, VoteError> {
        self.decide(&FrequencyTable::from_answers(answers), rng)
    }
}

/// Uniform draw from a pool holding each answer `count` times.
fn weighted_draw<R: Rng + ?Sized>(
    candidates: Vec<(&CanonicalAnswer, usize)>,
    rng: &mut R,
) -> Result<VotingDecision, VoteError> {
    let pool: Vec<&CanonicalAnswer> = candidates
        .into_iter()
        .flat_map(|(answer, count)| std::iter::repeat_n(answer, count))
        .collect();

    pool.choose(rng)
        .map(|answer| VotingDecision {
            answer: (*answer).clone(),
            method: DecisionMethod::Sampling,
        })
        .ok_or(VoteError::NoCandidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::canonicalize;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn answers(values: &[&str]) -> Vec<CanonicalAnswer> {
        values.iter().map(|v| canonicalize(v)).collect()
    }

    #[test]
    fn test_unique_mode() {
        let voter = Voter::new(VotingStrategy::Mode);
        let mut rng = StdRng::seed_from_u64(0);
        let decision = voter
            .decide_answers(&answers(&["10", "10", "12", "10"]), &mut rng)
            .unwrap();
        assert_eq!(decision.answer.as_str(), "10.00");
        assert_eq!(decision.method, DecisionMethod::Mode);
    }

    #[test]
    fn test_bug_is_not_a_candidate() {
        let voter = Voter::default();
        let mut rng = StdRng::seed_from_u64(0);
        let samples = vec![CanonicalAnswer::bug(), CanonicalAnswer::bug(), canonicalize(4)];
        let decision = voter.decide_answers(&samples, &mut rng).unwrap();
        assert_eq!(decision.answer.as_str(), "4.00");
        assert_eq!(decision.method, DecisionMethod::Mode);
    }

    #[test]
    fn test_empty_table_errors() {
        let voter = Voter::default();
        let mut rng = StdRng::seed_from_u64(0);
        let err = voter
            .decide_answers(&[CanonicalAnswer::bug()], &mut rng)
            .unwrap_err();
        assert_eq!(err, VoteError::NoCandidates);
    }

    #[test]
    fn test_tie_is_reproducible_with_seed() {
        let voter = Voter::new(VotingStrategy::Mode);
        let samples = answers(&["5", "7", "5", "7"]);

        let first: Vec<_> = (0..20)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                voter.decide_answers(&samples, &mut rng).unwrap()
            })
            .collect();
        let second: Vec<_> = (0..20)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                voter.decide_answers(&samples, &mut rng).unwrap()
            })
            .collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|d| d.method == DecisionMethod::Sampling));
    }

    #[test]
    fn test_tie_draws_are_even() {
        let voter = Voter::new(VotingStrategy::Mode);
        let table = FrequencyTable::from_answers(&answers(&["5", "7"]));
        let mut rng = StdRng::seed_from_u64(42);
        let five = canonicalize(5);

        let hits = (0..10_000)
            .filter(|_| voter.decide(&table, &mut rng).unwrap().answer == five)
            .count();
        assert!((4_500..=5_500).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn test_tie_excludes_lower_counts() {
        let voter = Voter::new(VotingStrategy::Mode);
        let table = FrequencyTable::from_answers(&answers(&["1", "2", "2", "3", "3"]));
        let one = canonicalize(1);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_ne!(voter.decide(&table, &mut rng).unwrap().answer, one);
        }
    }

    #[test]
    fn test_frequency_strategy_always_samples() {
        let voter = Voter::new(VotingStrategy::Frequency);
        let table = FrequencyTable::from_answers(&answers(&["3", "3", "3", "9"]));
        let mut rng = StdRng::seed_from_u64(7);
        let nine = canonicalize(9);

        let mut nines = 0;
        for _ in 0..4_000 {
            let decision = voter.decide(&table, &mut rng).unwrap();
            assert_eq!(decision.method, DecisionMethod::Sampling);
            if decision.answer == nine {
                nines += 1;
            }
        }
        // One in four.
        assert!((800..=1_200).contains(&nines), "nines = {nines}");
    }

    #[test]
    fn test_table_counts_in_first_seen_order() {
        let mut table = FrequencyTable::new();
        assert_eq!(table.record(canonicalize(2)), 1);
        assert_eq!(table.record(canonicalize(1)), 1);
        assert_eq!(table.record(canonicalize(2)), 2);

        let order: Vec<&str> = table.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(order, vec!["2.00", "1.00"]);
        assert_eq!(table.get(&canonicalize(2)), 2);
        assert_eq!(table.get(&canonicalize(3)), 0);
        assert_eq!(table.max_frequency(), 2);
    }

    #[test]
    fn test_strategy_from_config_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: VotingStrategy,
        }
        let parsed: Wrapper = toml::from_str("strategy = \"frequency\"").unwrap();
        assert_eq!(parsed.strategy, VotingStrategy::Frequency);
    }
}
