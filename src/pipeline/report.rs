//! Human-readable run report.

use crate::models::{ConcordError, ProblemRecord, Result};
use std::fmt::Write as _;
use std::path::Path;

const RULE: &str = "-------------";

/// Render every record as titled sections, then the run totals.
pub fn render_report(records: &[ProblemRecord], duration_secs: f64) -> String {
    let mut out = String::new();

    for record in records {
        let sections = [
            ("Question", record.question.as_str()),
            ("Answer", record.answer.as_str()),
            ("Concise answer", record.concise_answer.as_str()),
            ("Prediction", record.prediction.as_str()),
            ("Concise prediction", record.concise_prediction.as_str()),
            ("Result", record.result_label()),
        ];
        for (title, content) in sections {
            let _ = write!(out, "{RULE}\n{title} {}\n{RULE}\n{content}\n\n", record.index);
        }
    }

    let correct = records.iter().filter(|r| r.correct).count();
    let accuracy = if records.is_empty() {
        0.0
    } else {
        correct as f64 / records.len() as f64
    };
    let _ = writeln!(out, "Time: {duration_secs:.2} seconds");
    let _ = writeln!(out, "Accuracy: {accuracy:.3}");

    out
}

/// Write the report to `path`.
pub fn write_report(path: &Path, records: &[ProblemRecord], duration_secs: f64) -> Result<()> {
    std::fs::write(path, render_report(records, duration_secs))
        .map_err(|e| ConcordError::io(format!("writing report {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::canonicalize;
    use crate::models::{Decision, DecisionKind, Problem};
    use tempfile::TempDir;

    fn record(index: usize, predicted: &str) -> ProblemRecord {
        let problem = Problem {
            id: format!("p{index}"),
            question: "How many?".to_string(),
            answer: "2 + 3 = 5\n#### 5".to_string(),
            metadata: serde_json::Value::Null,
        };
        ProblemRecord::new(
            index,
            &problem,
            Vec::new(),
            Decision::new(canonicalize(predicted), DecisionKind::Mode),
            false,
        )
    }

    #[test]
    fn test_sections_per_problem() {
        let report = render_report(&[record(1, "5")], 1.234);

        assert!(report.starts_with("-------------\nQuestion 1\n-------------\nHow many?\n\n"));
        assert!(report.contains("-------------\nConcise answer 1\n-------------\n5.00\n\n"));
        assert!(report.contains("-------------\nConcise prediction 1\n-------------\n5.00\n\n"));
        assert!(report.contains("-------------\nResult 1\n-------------\nCorrect\n\n"));
        assert!(report.ends_with("Time: 1.23 seconds\nAccuracy: 1.000\n"));
    }

    #[test]
    fn test_accuracy_ratio() {
        let report = render_report(&[record(1, "5"), record(2, "4"), record(3, "5")], 10.0);
        assert!(report.contains("Result 2\n-------------\nIncorrect"));
        assert!(report.ends_with("Accuracy: 0.667\n"));
    }

    #[test]
    fn test_empty_run() {
        assert_eq!(render_report(&[], 0.5), "Time: 0.50 seconds\nAccuracy: 0.000\n");
    }

    #[test]
    fn test_write_report() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.txt");

        write_report(&path, &[record(1, "5")], 2.0).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Question 1"));
    }
}
