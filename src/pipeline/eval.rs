//! Evaluation pipeline.
//!
//! Pipeline flow:
//! Problems → Sample Pool → Method Samples → Decider → Records → JSONL + report

use super::report::write_report;
use crate::answer::FrequencyTable;
use crate::client::{CodeExecutor, Generator};
use crate::methods::{PreparedMethod, load_exemplars};
use crate::models::{Config, ConcordError, Problem, ProblemRecord, Result, RunStats};
use crate::pool::{Decider, LlmDecider, PoolSettings, SamplePool};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Pipeline sampling, deciding and scoring every problem.
pub struct EvalPipeline {
    pool: SamplePool,
    decider: Decider,
    config: Config,
}

impl EvalPipeline {
    /// Create a new pipeline from configuration.
    ///
    /// Exemplar files are read and rendered here, once per run.
    pub fn new(
        config: Config,
        generator: Arc<dyn Generator>,
        executor: Arc<dyn CodeExecutor>,
    ) -> Result<Self> {
        let methods = config
            .methods
            .iter()
            .map(|m| PreparedMethod::load(m, &config.prompt))
            .collect::<Result<Vec<_>>>()?;

        let llm = match (&config.voting.decider_exemplars, config.voting.llm_decider) {
            (Some(path), true) => Some(LlmDecider::new(
                Arc::clone(&generator),
                load_exemplars(path, &config.prompt, "")?,
                config.prompt.clone(),
                config.engine.seed,
            )),
            (None, true) => {
                return Err(ConcordError::InvalidInput(
                    "llm_decider requires decider_exemplars".to_string(),
                ));
            }
            _ => None,
        };

        let pool = SamplePool::new(
            generator,
            executor,
            methods,
            config.prompt.clone(),
            PoolSettings {
                base_seed: config.engine.seed,
                concurrency: config.engine.concurrency,
                exec_timeout: Duration::from_secs(config.execution.timeout_secs),
                early_stopping: config.voting.early_stopping,
            },
        );

        let decider = Decider::new(config.voting.strategy, config.voting.seed, llm);

        Ok(Self {
            pool,
            decider,
            config,
        })
    }

    /// Load problems from a JSONL file.
    ///
    /// Problems without an id get their 1-based line number.
    pub fn load_problems(path: &Path) -> Result<Vec<Problem>> {
        let file = File::open(path).map_err(|e| ConcordError::io("opening problems file", e))?;
        let reader = BufReader::new(file);
        let mut problems = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ConcordError::io("reading problems file", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let mut problem: Problem = serde_json::from_str(&line).map_err(|e| {
                ConcordError::ParseError(format!("Line {}: {}", line_num + 1, e))
            })?;
            if problem.id.is_empty() {
                problem.id = (line_num + 1).to_string();
            }
            problems.push(problem);
        }

        info!(count = problems.len(), "Loaded problems");
        Ok(problems)
    }

    /// Sample, decide and score one problem. `index` is 1-based.
    pub async fn evaluate(&mut self, index: usize, problem: &Problem) -> ProblemRecord {
        let (samples, early_stopped) = self.pool.sample_problem(problem).await;
        let table = FrequencyTable::from_answers(samples.iter().map(|s| &s.canonical));
        let decision = self.decider.decide(&problem.question, &table).await;

        ProblemRecord::new(index, problem, samples, decision, early_stopped)
    }

    /// Run the pipeline over `problems`.
    ///
    /// Records are appended to `output_path` as they complete; the text report
    /// is written at the end when a path is given.
    pub async fn run(
        &mut self,
        problems: Vec<Problem>,
        output_path: &Path,
        report_path: Option<&Path>,
    ) -> Result<RunStats> {
        let start = Instant::now();
        let total = problems.len();

        info!(
            total_problems = total,
            methods = self.pool.methods().len(),
            samples_per_problem = self.pool.planned_samples(),
            early_stopping = ?self.config.voting.early_stopping,
            llm_decider = self.config.voting.llm_decider,
            "Starting evaluation"
        );

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map_err(|e| ConcordError::Internal(format!("Invalid progress template: {}", e)))?
                .progress_chars("##-"),
        );

        let output_file =
            File::create(output_path).map_err(|e| ConcordError::io("creating output file", e))?;
        let mut writer = BufWriter::new(output_file);

        let mut stats = RunStats::default();
        let mut records = Vec::with_capacity(total);

        for (i, problem) in problems.iter().enumerate() {
            let record = self.evaluate(i + 1, problem).await;
            stats.record(&record);

            let json = serde_json::to_string(&record).map_err(|e| {
                ConcordError::Internal(format!("Failed to serialize record: {}", e))
            })?;
            writeln!(writer, "{}", json).map_err(|e| ConcordError::io("writing output", e))?;
            writer
                .flush()
                .map_err(|e| ConcordError::io("flushing output", e))?;

            pb.inc(1);
            pb.set_message(format!("correct: {}/{}", stats.total_correct, i + 1));
            records.push(record);
        }

        pb.finish_with_message(format!(
            "Done! {}/{} correct",
            stats.total_correct, stats.total_problems
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();

        if let Some(path) = report_path {
            write_report(path, &records, stats.runtime_secs)?;
        }

        info!(
            correct = stats.total_correct,
            problems = stats.total_problems,
            accuracy = format!("{:.3}", stats.accuracy),
            invalid_samples = stats.invalid_samples,
            runtime = format!("{:.2}s", stats.runtime_secs),
            "Evaluation complete"
        );

        Ok(stats)
    }
}
