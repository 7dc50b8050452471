//! Final-answer decision over the samples of one problem.
//!
//! Disagreeing samples go to the voter, or to the engine itself when the LLM
//! decider is enabled. The tie-break random source lives here and is seeded
//! once per run, so decisions are reproducible for a fixed sample stream.

use crate::answer::{CanonicalAnswer, FrequencyTable, Voter, VotingStrategy, canonicalize};
use crate::client::Generator;
use crate::methods::{answer_after_marker, build_prompt, decider_question};
use crate::models::{Decision, DecisionKind, PromptConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine-backed picker among candidate answers.
pub struct LlmDecider {
    generator: Arc<dyn Generator>,
    /// Rendered decider exemplars
    exemplars: String,
    template: PromptConfig,
    seed: u64,
}

impl LlmDecider {
    pub fn new(
        generator: Arc<dyn Generator>,
        exemplars: String,
        template: PromptConfig,
        seed: u64,
    ) -> Self {
        Self {
            generator,
            exemplars,
            template,
            seed,
        }
    }

    fn prompt(&self, question: &str, candidates: &FrequencyTable) -> String {
        build_prompt(
            &self.exemplars,
            &decider_question(question, candidates),
            &self.template,
        )
    }
}

/// Decides the answer of each problem from its frequency table.
pub struct Decider {
    voter: Voter,
    rng: StdRng,
    llm: Option<LlmDecider>,
}

impl Decider {
    /// Create a new decider; `seed` drives the tie-break draws.
    pub fn new(strategy: VotingStrategy, seed: u64, llm: Option<LlmDecider>) -> Self {
        Self {
            voter: Voter::new(strategy),
            rng: StdRng::seed_from_u64(seed),
            llm,
        }
    }

    /// Pick the final answer for `question`.
    ///
    /// No candidate gives `"bug"`; a single candidate is unanimous. Otherwise
    /// the LLM decider answers when enabled, falling back to the voter when
    /// it fails or replies without a number.
    pub async fn decide(&mut self, question: &str, table: &FrequencyTable) -> Decision {
        match table.len() {
            0 => return Decision::new(CanonicalAnswer::bug(), DecisionKind::None),
            1 => {
                if let Some((answer, _)) = table.iter().next() {
                    return Decision::new(answer.clone(), DecisionKind::Unanimous);
                }
            }
            _ => {}
        }

        if let Some(llm) = &self.llm {
            let prompt = llm.prompt(question, table);
            match llm.generator.generate(&prompt, &llm.template.stop, llm.seed).await {
                Ok(reply) => {
                    let answer = canonicalize(answer_after_marker(&reply));
                    if !answer.is_bug() {
                        debug!(answer = %answer, candidates = table.len(), "Decider answered");
                        return Decision {
                            answer,
                            kind: DecisionKind::Decider,
                            decider_output: Some(reply),
                        };
                    }
                    warn!("Decider reply holds no answer, voting instead");
                }
                Err(e) => {
                    warn!(error = %e, "Decider failed, voting instead");
                }
            }
        }

        self.vote(table)
    }

    /// Decide with the voter alone.
    pub fn vote(&mut self, table: &FrequencyTable) -> Decision {
        match self.voter.decide(table, &mut self.rng) {
            Ok(decision) => Decision::new(decision.answer, decision.method.into()),
            Err(_) => Decision::new(CanonicalAnswer::bug(), DecisionKind::None),
        }
    }
}
