//! Turning a generation into a canonical answer, per method.

use crate::answer::{CanonicalAnswer, canonicalize, extract_equations, solve};
use crate::client::CodeExecutor;
use crate::models::{MethodKind, SampleFailure};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Phrase preceding the final answer in zero-shot and chain-of-thought output.
pub const ANSWER_MARKER: &str = "The answer is ";

static PROGRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(def solution.*?return result[^\n]*)").expect("program pattern is valid")
});

/// Text after the last answer marker, trimmed. The whole text when absent.
pub fn answer_after_marker(text: &str) -> &str {
    text.rsplit(ANSWER_MARKER).next().unwrap_or(text).trim()
}

/// First `def solution ... return result` block in the generation.
pub fn extract_program(text: &str) -> Option<&str> {
    PROGRAM.find(text).map(|m| m.as_str())
}

/// Outcome of post-processing one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    /// Text kept for reporting
    pub raw: String,
    pub canonical: CanonicalAnswer,
    pub failure: Option<SampleFailure>,
}

impl Conclusion {
    fn answered(raw: impl Into<String>, canonical: CanonicalAnswer) -> Self {
        Self {
            raw: raw.into(),
            canonical,
            failure: None,
        }
    }

    fn failed(raw: impl Into<String>, failure: SampleFailure) -> Self {
        Self {
            raw: raw.into(),
            canonical: CanonicalAnswer::bug(),
            failure: Some(failure),
        }
    }
}

/// Derive the canonical answer of `generated` the way `kind` requires.
///
/// Programs run through `executor`; equation sets go through the solver.
pub async fn conclude(
    kind: MethodKind,
    generated: &str,
    executor: &dyn CodeExecutor,
    timeout: Duration,
) -> Conclusion {
    match kind {
        MethodKind::ZeroShot | MethodKind::Cot => {
            Conclusion::answered(generated, canonicalize(answer_after_marker(generated)))
        }
        MethodKind::Pal => {
            let Some(program) = extract_program(generated) else {
                return Conclusion::failed("", SampleFailure::MissingProgram);
            };
            let script = format!("{program}\nprint(solution())");
            match executor.execute(&script, timeout).await {
                Ok(stdout) => Conclusion::answered(program, canonicalize(stdout)),
                Err(e) => {
                    debug!(error = %e, "Program execution failed");
                    Conclusion::failed(program, SampleFailure::Execution(e.to_string()))
                }
            }
        }
        MethodKind::Declarative => {
            let equations = extract_equations(generated);
            match solve(&equations) {
                Ok(value) => Conclusion::answered(generated, canonicalize(value)),
                Err(tag) => Conclusion::failed(generated, SampleFailure::Solver(tag)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::FailureTag;
    use crate::client::testing::ScriptedExecutor;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_answer_after_last_marker() {
        let text = "The answer is 3? No. The answer is 1,200 dollars.\n";
        assert_eq!(answer_after_marker(text), "1,200 dollars.");
        assert_eq!(answer_after_marker(" 42 "), "42");
    }

    #[test]
    fn test_extract_program() {
        let text = "Here:\ndef solution():\n    a = 2\n    result = a * 3\n    return result\n\nQ: next";
        assert_eq!(
            extract_program(text),
            Some("def solution():\n    a = 2\n    result = a * 3\n    return result")
        );
        assert_eq!(extract_program("no code here"), None);
    }

    #[tokio::test]
    async fn test_cot_conclusion() {
        let executor = ScriptedExecutor::unavailable();
        let out = conclude(
            MethodKind::Cot,
            "She has 3 + 4 = 7 apples. The answer is 7.",
            &executor,
            TIMEOUT,
        )
        .await;
        assert_eq!(out.canonical.as_str(), "7.00");
        assert!(out.failure.is_none());
        assert_eq!(out.raw, "She has 3 + 4 = 7 apples. The answer is 7.");
    }

    #[tokio::test]
    async fn test_zero_shot_without_number() {
        let executor = ScriptedExecutor::unavailable();
        let out = conclude(MethodKind::ZeroShot, "I cannot tell.", &executor, TIMEOUT).await;
        assert!(out.canonical.is_bug());
    }

    #[tokio::test]
    async fn test_pal_runs_program_with_call_appended() {
        let executor = ScriptedExecutor::new(|program| {
            assert!(program.ends_with("return result\nprint(solution())"));
            Ok("1234.5".to_string())
        });
        let generated = "def solution():\n    result = 1234.5\n    return result\n";
        let out = conclude(MethodKind::Pal, generated, &executor, TIMEOUT).await;

        assert_eq!(out.canonical.as_str(), "1,234.50");
        assert_eq!(out.raw, "def solution():\n    result = 1234.5\n    return result");
        assert!(out.failure.is_none());
    }

    #[tokio::test]
    async fn test_pal_missing_program() {
        let executor = ScriptedExecutor::new(|_| panic!("nothing to execute"));
        let out = conclude(MethodKind::Pal, "print(3)", &executor, TIMEOUT).await;

        assert!(out.canonical.is_bug());
        assert_eq!(out.raw, "");
        assert_eq!(out.failure, Some(SampleFailure::MissingProgram));
    }

    #[tokio::test]
    async fn test_pal_execution_failure() {
        let executor = ScriptedExecutor::unavailable();
        let generated = "def solution():\n    result = 1 / 0\n    return result";
        let out = conclude(MethodKind::Pal, generated, &executor, TIMEOUT).await;

        assert!(out.canonical.is_bug());
        assert!(matches!(out.failure, Some(SampleFailure::Execution(_))));
    }

    #[tokio::test]
    async fn test_declarative_solved() {
        let executor = ScriptedExecutor::unavailable();
        let generated = "Let's see. [[eq1: x + 2 = 5]] [[answer: x]] The answer is 3";
        let out = conclude(MethodKind::Declarative, generated, &executor, TIMEOUT).await;

        assert_eq!(out.canonical.as_str(), "3.00");
        assert!(out.failure.is_none());
    }

    #[tokio::test]
    async fn test_declarative_failure_tag_kept() {
        let executor = ScriptedExecutor::unavailable();
        let out = conclude(MethodKind::Declarative, "x = y + 1, x = ?", &executor, TIMEOUT).await;

        assert!(out.canonical.is_bug());
        assert_eq!(out.failure, Some(SampleFailure::Solver(FailureTag::NoSolution)));
    }
}
