//! Scripted generator and executor for tests.

use super::{CodeExecutor, ExecutionFailure, Generator};
use crate::models::{ConcordError, EngineError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type GenerateFn = dyn Fn(&str, u64) -> Option<String> + Send + Sync;
type ExecuteFn = dyn Fn(&str) -> std::result::Result<String, String> + Send + Sync;

/// Generator answering from a closure of `(prompt, seed)`.
///
/// `None` from the closure becomes an engine error.
pub struct ScriptedGenerator {
    script: Box<GenerateFn>,
    calls: Mutex<Vec<(String, u64)>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl Fn(&str, u64) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Some(text.clone()))
    }

    /// Prompts and seeds seen so far, in call order.
    pub fn calls(&self) -> Vec<(String, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _stop: &[String], seed: u64) -> Result<String> {
        self.calls.lock().unwrap().push((prompt.to_string(), seed));
        (self.script)(prompt, seed).ok_or_else(|| {
            ConcordError::Engine(EngineError::InvalidResponse("scripted failure".to_string()))
        })
    }
}

/// Executor answering from a closure of the program text.
pub struct ScriptedExecutor {
    script: Box<ExecuteFn>,
}

impl ScriptedExecutor {
    pub fn new(
        script: impl Fn(&str) -> std::result::Result<String, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
        }
    }

    /// Executor that fails every program.
    pub fn unavailable() -> Self {
        Self::new(|_| Err("no interpreter".to_string()))
    }
}

#[async_trait]
impl CodeExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        program: &str,
        _timeout: Duration,
    ) -> std::result::Result<String, ExecutionFailure> {
        (self.script)(program).map_err(|stderr| ExecutionFailure::NonZeroExit {
            code: Some(1),
            stderr,
        })
    }
}
