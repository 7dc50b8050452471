//! Problem, sample and result types for concord.
//!
//! These types carry one problem from its dataset line through sampling and
//! voting to the record written for it.

use super::MethodKind;
use crate::answer::{CanonicalAnswer, DecisionMethod, FailureTag, canonicalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Input problem in GSM8K layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Unique identifier; assigned from the line number when absent
    #[serde(default)]
    pub id: String,

    /// The problem text
    pub question: String,

    /// Reference solution ending in `#### <answer>`
    pub answer: String,

    /// Optional metadata (passed through to output)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Problem {
    /// Canonical form of the reference answer: the text after the last `####`.
    pub fn expected_answer(&self) -> CanonicalAnswer {
        let tail = self.answer.rsplit("####").next().unwrap_or_default();
        canonicalize(tail.trim())
    }
}

/// Why a sample produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SampleFailure {
    /// The engine request failed
    Engine(String),
    /// No `def solution ... return result` block in the generated text
    MissingProgram,
    /// The generated program failed, timed out or could not start
    Execution(String),
    /// The equation set did not solve
    Solver(FailureTag),
}

/// One generated sample and its canonical answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSample {
    /// Unique identifier for this sample
    pub id: String,

    /// ID of the source problem
    pub problem_id: String,

    pub method: MethodKind,

    /// Iteration index within the method
    pub iteration: usize,

    /// Engine seed used
    pub seed: u64,

    /// Text kept for reporting: the generation, or the program for `pal`
    pub raw: String,

    pub canonical: CanonicalAnswer,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SampleFailure>,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,

    /// Generation and post-processing time in milliseconds
    pub generation_time_ms: u64,
}

impl MethodSample {
    /// Reporting form: the raw text followed by `#### <canonical>`.
    pub fn prediction(&self) -> String {
        format!("{}\n#### {}", self.raw, self.canonical)
    }

    pub fn is_valid(&self) -> bool {
        !self.canonical.is_bug()
    }
}

/// How the final answer of a problem was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    /// No valid sample; the answer is `"bug"`
    None,
    /// Every valid sample agreed
    Unanimous,
    /// Unique most frequent answer
    Mode,
    /// Weighted random draw
    Sampling,
    /// Chosen by the engine among the candidates
    Decider,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::None => "none",
            DecisionKind::Unanimous => "unanimous",
            DecisionKind::Mode => "mode",
            DecisionKind::Sampling => "sampling",
            DecisionKind::Decider => "decider",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DecisionMethod> for DecisionKind {
    fn from(method: DecisionMethod) -> Self {
        match method {
            DecisionMethod::Mode => DecisionKind::Mode,
            DecisionMethod::Sampling => DecisionKind::Sampling,
        }
    }
}

/// Final answer of one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub answer: CanonicalAnswer,
    pub kind: DecisionKind,

    /// Raw decider reply, when the engine decided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decider_output: Option<String>,
}

impl Decision {
    pub fn new(answer: CanonicalAnswer, kind: DecisionKind) -> Self {
        Self {
            answer,
            kind,
            decider_output: None,
        }
    }
}

/// Per-problem output record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRecord {
    /// 1-based position in the run
    pub index: usize,

    pub problem_id: String,

    pub question: String,

    /// Reference solution as given
    pub answer: String,

    pub concise_answer: CanonicalAnswer,

    /// All sample predictions followed by the decision
    pub prediction: String,

    pub concise_prediction: CanonicalAnswer,

    pub decision: DecisionKind,

    pub correct: bool,

    /// Sampling stopped before every iteration ran
    pub early_stopped: bool,

    pub samples: Vec<MethodSample>,

    /// Optional metadata from problem
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ProblemRecord {
    /// Assemble the record of a decided problem.
    pub fn new(
        index: usize,
        problem: &Problem,
        samples: Vec<MethodSample>,
        decision: Decision,
        early_stopped: bool,
    ) -> Self {
        let concise_answer = problem.expected_answer();
        let correct = decision.answer == concise_answer;

        let mut prediction = samples
            .iter()
            .map(MethodSample::prediction)
            .collect::<Vec<_>>()
            .join("\n\n");
        prediction.push_str(&format!(
            "\n\nDecider ({}): {}\n#### {}",
            decision.kind, decision.answer, decision.answer
        ));

        Self {
            index,
            problem_id: problem.id.clone(),
            question: problem.question.clone(),
            answer: problem.answer.clone(),
            concise_answer,
            prediction,
            concise_prediction: decision.answer,
            decision: decision.kind,
            correct,
            early_stopped,
            samples,
            metadata: problem.metadata.clone(),
        }
    }

    pub fn result_label(&self) -> &'static str {
        if self.correct { "Correct" } else { "Incorrect" }
    }
}

/// Statistics for an evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Total problems processed
    pub total_problems: usize,

    /// Total samples generated
    pub total_samples: usize,

    /// Samples whose canonical answer is `"bug"`
    pub invalid_samples: usize,

    /// Engine request failures
    pub engine_failures: usize,

    /// Missing or failed generated programs
    pub execution_failures: usize,

    /// Solver failures by tag
    pub solver_failures: BTreeMap<String, usize>,

    /// Problems decided per decision kind
    pub decisions: BTreeMap<DecisionKind, usize>,

    /// Problems that stopped sampling early
    pub early_stops: usize,

    pub total_correct: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Correct / problems (0.0 - 1.0)
    pub accuracy: f64,
}

impl RunStats {
    /// Count one finished problem.
    pub fn record(&mut self, record: &ProblemRecord) {
        self.total_problems += 1;
        self.total_samples += record.samples.len();
        if record.correct {
            self.total_correct += 1;
        }
        if record.early_stopped {
            self.early_stops += 1;
        }
        *self.decisions.entry(record.decision).or_default() += 1;

        for sample in &record.samples {
            if !sample.is_valid() {
                self.invalid_samples += 1;
            }
            match &sample.failure {
                Some(SampleFailure::Engine(_)) => self.engine_failures += 1,
                Some(SampleFailure::MissingProgram | SampleFailure::Execution(_)) => {
                    self.execution_failures += 1
                }
                Some(SampleFailure::Solver(tag)) => {
                    *self
                        .solver_failures
                        .entry(tag.as_str().to_string())
                        .or_default() += 1
                }
                None => {}
            }
        }
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.total_problems > 0 {
            self.accuracy = self.total_correct as f64 / self.total_problems as f64;
        }
    }
}
