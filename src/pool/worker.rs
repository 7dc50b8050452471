//! Sample pool: generation and post-processing of method samples.
//!
//! Every configured method is sampled `iterations` times per problem. Without
//! early stopping all samples of a problem run in parallel under a semaphore;
//! with it they run in order so the stop point is exact.

use crate::answer::{BUG, CanonicalAnswer, FrequencyTable};
use crate::client::{CodeExecutor, Generator};
use crate::methods::{PreparedMethod, conclude};
use crate::models::{
    ConcordError, MethodKind, MethodSample, Problem, PromptConfig, Result, SampleFailure,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// Pool drawing method samples for one problem at a time.
pub struct SamplePool {
    worker: SampleWorker,
    /// Methods in configuration order
    methods: Vec<PreparedMethod>,
    /// Stop once one answer has this many votes
    early_stopping: Option<usize>,
}

impl SamplePool {
    /// Create a new sample pool.
    pub fn new(
        generator: Arc<dyn Generator>,
        executor: Arc<dyn CodeExecutor>,
        methods: Vec<PreparedMethod>,
        template: PromptConfig,
        settings: PoolSettings,
    ) -> Self {
        Self {
            worker: SampleWorker {
                generator,
                executor,
                template: Arc::new(template),
                base_seed: settings.base_seed,
                exec_timeout: settings.exec_timeout,
                semaphore: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            },
            methods,
            early_stopping: settings.early_stopping,
        }
    }

    pub fn methods(&self) -> &[PreparedMethod] {
        &self.methods
    }

    /// Total samples per problem when no early stop happens.
    pub fn planned_samples(&self) -> usize {
        self.methods.iter().map(|m| m.iterations).sum()
    }

    /// Draw one sample. Never fails: errors become a `"bug"` sample.
    pub async fn sample(
        &self,
        problem: &Problem,
        method: &PreparedMethod,
        iteration: usize,
    ) -> MethodSample {
        self.worker.sample(problem, method, iteration).await
    }

    /// Draw all samples of a problem in method order.
    ///
    /// Returns the samples and whether early stopping cut the run short.
    pub async fn sample_problem(&self, problem: &Problem) -> (Vec<MethodSample>, bool) {
        match self.early_stopping {
            Some(threshold) => self.sample_until(problem, threshold).await,
            None => (self.sample_all(problem).await, false),
        }
    }

    async fn sample_until(&self, problem: &Problem, threshold: usize) -> (Vec<MethodSample>, bool) {
        let mut samples = Vec::with_capacity(self.planned_samples());
        let mut table = FrequencyTable::new();

        for method in &self.methods {
            for iteration in 0..method.iterations {
                let sample = self.worker.sample(problem, method, iteration).await;
                let votes = if sample.is_valid() {
                    table.record(sample.canonical.clone())
                } else {
                    0
                };
                samples.push(sample);

                if votes >= threshold {
                    debug!(
                        problem_id = %problem.id,
                        samples = samples.len(),
                        "Early stop"
                    );
                    return (samples, true);
                }
            }
        }

        (samples, false)
    }

    async fn sample_all(&self, problem: &Problem) -> Vec<MethodSample> {
        let problem = Arc::new(problem.clone());
        let mut handles = Vec::with_capacity(self.planned_samples());

        for method in &self.methods {
            for iteration in 0..method.iterations {
                let worker = self.clone_for_task();
                let problem = Arc::clone(&problem);
                let method = method.clone();
                let kind = method.kind;
                let handle = tokio::spawn(async move {
                    worker.sample(&problem, &method, iteration).await
                });
                handles.push((kind, iteration, handle));
            }
        }

        let mut samples = Vec::with_capacity(handles.len());
        for (kind, iteration, handle) in handles {
            match handle.await {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!(problem_id = %problem.id, method = %kind, error = %e, "Task panicked");
                    samples.push(self.worker.failed_sample(
                        &problem,
                        kind,
                        iteration,
                        SampleFailure::Engine(e.to_string()),
                        0,
                    ));
                }
            }
        }

        samples
    }

    /// Create a lightweight clone for spawning tasks.
    fn clone_for_task(&self) -> SampleWorker {
        self.worker.clone()
    }
}

/// Knobs of a [`SamplePool`] taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub base_seed: u64,
    pub concurrency: usize,
    pub exec_timeout: Duration,
    pub early_stopping: Option<usize>,
}

/// Lightweight handle for spawned tasks.
#[derive(Clone)]
struct SampleWorker {
    generator: Arc<dyn Generator>,
    executor: Arc<dyn CodeExecutor>,
    template: Arc<PromptConfig>,
    base_seed: u64,
    exec_timeout: Duration,
    semaphore: Arc<Semaphore>,
}

impl SampleWorker {
    async fn generate(&self, prompt: &str, seed: u64) -> Result<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ConcordError::Internal("Semaphore closed".to_string()))?;

        self.generator
            .generate(prompt, &self.template.stop, seed)
            .await
    }

    async fn sample(
        &self,
        problem: &Problem,
        method: &PreparedMethod,
        iteration: usize,
    ) -> MethodSample {
        let seed = self.base_seed.wrapping_add(iteration as u64);
        let start = Instant::now();
        let prompt = method.prompt(&problem.question, &self.template);

        let generated = match self.generate(&prompt, seed).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    problem_id = %problem.id,
                    method = %method.kind,
                    iteration,
                    error = %e,
                    "Generation failed"
                );
                return self.failed_sample(
                    problem,
                    method.kind,
                    iteration,
                    SampleFailure::Engine(e.to_string()),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let conclusion = conclude(
            method.kind,
            &generated,
            self.executor.as_ref(),
            self.exec_timeout,
        )
        .await;

        match &conclusion.failure {
            Some(SampleFailure::Execution(e)) => warn!(
                problem_id = %problem.id,
                iteration,
                error = %e,
                "Program execution failed"
            ),
            Some(failure) => debug!(
                problem_id = %problem.id,
                method = %method.kind,
                iteration,
                failure = ?failure,
                "Sample has no answer"
            ),
            None => {}
        }

        MethodSample {
            id: Uuid::new_v4().to_string(),
            problem_id: problem.id.clone(),
            method: method.kind,
            iteration,
            seed,
            raw: conclusion.raw,
            canonical: conclusion.canonical,
            failure: conclusion.failure,
            generated_at: Utc::now(),
            generation_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn failed_sample(
        &self,
        problem: &Problem,
        method: MethodKind,
        iteration: usize,
        failure: SampleFailure,
        elapsed_ms: u64,
    ) -> MethodSample {
        MethodSample {
            id: Uuid::new_v4().to_string(),
            problem_id: problem.id.clone(),
            method,
            iteration,
            seed: self.base_seed.wrapping_add(iteration as u64),
            raw: BUG.to_string(),
            canonical: CanonicalAnswer::bug(),
            failure: Some(failure),
            generated_at: Utc::now(),
            generation_time_ms: elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{ScriptedExecutor, ScriptedGenerator};

    fn method(kind: MethodKind, iterations: usize) -> PreparedMethod {
        PreparedMethod {
            kind,
            iterations,
            exemplars: String::new(),
        }
    }

    fn problem() -> Problem {
        Problem {
            id: "p1".to_string(),
            question: "Q: How many?".to_string(),
            answer: "#### 7".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    fn settings(early_stopping: Option<usize>) -> PoolSettings {
        PoolSettings {
            base_seed: 100,
            concurrency: 2,
            exec_timeout: Duration::from_secs(5),
            early_stopping,
        }
    }

    fn pool(
        generator: Arc<ScriptedGenerator>,
        methods: Vec<PreparedMethod>,
        early_stopping: Option<usize>,
    ) -> SamplePool {
        SamplePool::new(
            generator,
            Arc::new(ScriptedExecutor::unavailable()),
            methods,
            PromptConfig::default(),
            settings(early_stopping),
        )
    }

    #[tokio::test]
    async fn test_seeds_follow_iterations() {
        let generator = Arc::new(ScriptedGenerator::new(|_, seed| {
            Some(format!("The answer is {seed}"))
        }));
        let pool = pool(generator.clone(), vec![method(MethodKind::Cot, 3)], None);

        let (samples, early) = pool.sample_problem(&problem()).await;

        assert!(!early);
        let answers: Vec<&str> = samples.iter().map(|s| s.canonical.as_str()).collect();
        assert_eq!(answers, vec!["100.00", "101.00", "102.00"]);
        assert_eq!(samples[2].iteration, 2);
        assert_eq!(samples[2].seed, 102);
        assert_eq!(generator.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_samples_keep_method_order() {
        let generator = Arc::new(ScriptedGenerator::constant("The answer is 7"));
        let pool = pool(
            generator,
            vec![method(MethodKind::ZeroShot, 2), method(MethodKind::Cot, 1)],
            None,
        );

        let (samples, _) = pool.sample_problem(&problem()).await;

        let kinds: Vec<MethodKind> = samples.iter().map(|s| s.method).collect();
        assert_eq!(kinds, vec![MethodKind::ZeroShot, MethodKind::ZeroShot, MethodKind::Cot]);
        assert_eq!(pool.planned_samples(), 3);
    }

    #[tokio::test]
    async fn test_early_stopping_cuts_sampling() {
        let generator = Arc::new(ScriptedGenerator::constant("The answer is 7"));
        let pool = pool(generator.clone(), vec![method(MethodKind::Cot, 5)], Some(2));

        let (samples, early) = pool.sample_problem(&problem()).await;

        assert!(early);
        assert_eq!(samples.len(), 2);
        assert_eq!(generator.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_early_stopping_ignores_bug_answers() {
        let generator = Arc::new(ScriptedGenerator::constant("no idea"));
        let pool = pool(generator, vec![method(MethodKind::Cot, 3)], Some(1));

        let (samples, early) = pool.sample_problem(&problem()).await;

        assert!(!early);
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| !s.is_valid()));
    }

    #[tokio::test]
    async fn test_engine_failure_becomes_bug_sample() {
        let generator = Arc::new(ScriptedGenerator::new(|_, seed| {
            (seed != 101).then(|| "The answer is 3".to_string())
        }));
        let pool = pool(generator, vec![method(MethodKind::ZeroShot, 2)], None);

        let (samples, _) = pool.sample_problem(&problem()).await;

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].canonical.as_str(), "3.00");
        assert!(samples[1].canonical.is_bug());
        assert_eq!(samples[1].raw, "bug");
        assert!(matches!(samples[1].failure, Some(SampleFailure::Engine(_))));
    }

    #[tokio::test]
    async fn test_prompt_built_from_exemplars() {
        let generator = Arc::new(ScriptedGenerator::constant("The answer is 1"));
        let mut cot = method(MethodKind::Cot, 1);
        cot.exemplars = "Q: 1+1?\nA: The answer is 2.\n\n".to_string();
        let pool = pool(generator.clone(), vec![cot.clone()], None);

        let sample = pool.sample(&problem(), &cot, 0).await;

        assert_eq!(sample.canonical.as_str(), "1.00");
        let (prompt, seed) = generator.calls().remove(0);
        assert_eq!(prompt, "Q: 1+1?\nA: The answer is 2.\n\nQ: How many?\nA:");
        assert_eq!(seed, 100);
    }
}
