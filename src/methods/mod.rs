//! Solving methods: prompt construction and answer post-processing.

mod conclude;
mod prompt;

pub use conclude::*;
pub use prompt::*;

use crate::models::{MethodConfig, MethodKind, PromptConfig, Result};

/// A configured method with its exemplars rendered once up front.
#[derive(Debug, Clone)]
pub struct PreparedMethod {
    pub kind: MethodKind,
    pub iterations: usize,
    pub exemplars: String,
}

impl PreparedMethod {
    /// Load and render the exemplar file of `config`, if it has one.
    pub fn load(config: &MethodConfig, template: &PromptConfig) -> Result<Self> {
        let exemplars = match &config.exemplars {
            Some(path) => load_exemplars(path, template, &config.lead)?,
            None => String::new(),
        };

        Ok(Self {
            kind: config.kind,
            iterations: config.iterations,
            exemplars,
        })
    }

    pub fn prompt(&self, question: &str, template: &PromptConfig) -> String {
        build_prompt(&self.exemplars, question, template)
    }
}
