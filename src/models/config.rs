//! Configuration models for concord.
//!
//! Every tunable of a run lives here and is read from one TOML file.

use crate::answer::VotingStrategy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

/// Top-level configuration for concord.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Text-generation engine
    pub engine: EngineConfig,

    /// Chat template wrapped around every prompt
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Solving methods, run in order
    pub methods: Vec<MethodConfig>,

    /// Final-answer selection
    #[serde(default)]
    pub voting: VotingConfig,

    /// Execution of generated programs
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// OpenAI-compatible completion endpoint (llama.cpp server, vLLM, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL for the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; `${VAR}` placeholders are expanded
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f64,

    /// Base seed; sample `i` of a method uses `seed + i`
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Maximum concurrent generation requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_model() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_seed() -> u64 {
    1337
}

fn default_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: None,
            model: default_model(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            seed: default_seed(),
            concurrency: default_concurrency(),
        }
    }
}

/// Chat template markers.
///
/// Exemplar files reference these as `{user_start}`, `{assistant_start}`, ...
/// and the question prompt ends with `user_end` and `assistant_start`.
/// The defaults are a plain `Q:`/`A:` completion format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_start: String,
    pub system_message: String,
    pub system_end: String,
    pub user_start: String,
    pub user_end: String,
    pub assistant_start: String,
    pub assistant_end: String,
    /// Stop sequences passed to the engine
    pub stop: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_start: String::new(),
            system_message: String::new(),
            system_end: "\n".to_string(),
            user_start: "Q:".to_string(),
            user_end: String::new(),
            assistant_start: "A:".to_string(),
            assistant_end: "\n".to_string(),
            stop: vec!["Q:".to_string()],
        }
    }
}

/// How a method turns generated text into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Free-form answer after "The answer is"
    ZeroShot,
    /// Chain-of-thought; answer after the last "The answer is"
    Cot,
    /// Tagged equations solved symbolically
    Declarative,
    /// Generated program executed for its output
    Pal,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::ZeroShot => "zero_shot",
            MethodKind::Cot => "cot",
            MethodKind::Declarative => "declarative",
            MethodKind::Pal => "pal",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One solving method and how often to sample it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodConfig {
    pub kind: MethodKind,

    /// Samples per problem
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Few-shot exemplar file
    #[serde(default)]
    pub exemplars: Option<PathBuf>,

    /// Text substituted for `{user_lead_message}` in the exemplars
    #[serde(default)]
    pub lead: String,
}

fn default_iterations() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    #[serde(default)]
    pub strategy: VotingStrategy,

    /// Seed of the tie-break random source
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stop sampling a problem once one answer has this many votes
    #[serde(default)]
    pub early_stopping: Option<usize>,

    /// Ask the engine to pick among disagreeing answers instead of voting
    #[serde(default)]
    pub llm_decider: bool,

    /// Exemplar file for the decider prompt
    #[serde(default)]
    pub decider_exemplars: Option<PathBuf>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            strategy: VotingStrategy::default(),
            seed: default_seed(),
            early_stopping: None,
            llm_decider: false,
            decider_exemplars: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Interpreter used for generated programs
    #[serde(default = "default_python")]
    pub python: String,

    /// Wall-clock limit per program in seconds
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_execution_timeout() -> u64 {
    5
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_execution_timeout(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSONL file of per-problem records
    pub path: PathBuf,

    /// Human-readable report
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })
    }

    /// Resolve the engine API key from config or environment.
    ///
    /// Local engines usually need none, so an unconfigured key is `None`;
    /// a named but unset environment variable is an error.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        if let Some(key) = &self.engine.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        match &self.engine.api_key_env {
            Some(env_var) => std::env::var(env_var)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey {
                    env_var: env_var.clone(),
                }),
            None => Ok(None),
        }
    }

    /// Total samples drawn per problem without early stopping.
    pub fn samples_per_problem(&self) -> usize {
        self.methods.iter().map(|m| m.iterations).sum()
    }

    /// Check the settings that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }
        if let Some(method) = self.methods.iter().find(|m| m.iterations == 0) {
            return Err(ConfigError::ZeroIterations(method.kind));
        }
        if self.voting.early_stopping == Some(0) {
            return Err(ConfigError::Invalid(
                "voting.early_stopping must be at least 1".to_string(),
            ));
        }
        if self.voting.llm_decider && self.voting.decider_exemplars.is_none() {
            return Err(ConfigError::MissingDeciderExemplars);
        }
        if self.engine.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "engine.concurrency must be at least 1".to_string(),
            ));
        }
        if self.engine.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_PLACEHOLDER.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: {env_var} is not set")]
    MissingApiKey { env_var: String },

    #[error("No solving methods configured: add at least one [[methods]] entry")]
    NoMethods,

    #[error("Method '{0}' has zero iterations")]
    ZeroIterations(MethodKind),

    #[error("voting.llm_decider is enabled but voting.decider_exemplars is not set")]
    MissingDeciderExemplars,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[engine]

[[methods]]
kind = "cot"
iterations = 3
exemplars = "exemplars/cot.txt"

[output]
path = "out.jsonl"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.engine.base_url, "http://localhost:8080/v1");
        assert_eq!(config.engine.seed, 1337);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.prompt.assistant_start, "A:");
        assert_eq!(config.prompt.stop, vec!["Q:".to_string()]);
        assert_eq!(config.voting.strategy, VotingStrategy::Mode);
        assert_eq!(config.voting.early_stopping, None);
        assert_eq!(config.execution.timeout_secs, 5);
        assert_eq!(config.methods[0].kind, MethodKind::Cot);
        assert_eq!(config.samples_per_problem(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
[engine]
base_url = "http://gpu-box:8000/v1"
model = "mixtral-8x7b-instruct"
seed = 7
temperature = 0.4

[prompt]
user_start = "<|user|>"
user_end = "<|end|>"
assistant_start = "<|assistant|>\n"
stop = ["<|end|>"]

[[methods]]
kind = "zero_shot"
lead = "Write 'The answer is {number}.' at the end."

[[methods]]
kind = "pal"
iterations = 2

[voting]
strategy = "frequency"
early_stopping = 3
llm_decider = true
decider_exemplars = "exemplars/decider.txt"

[execution]
python = "/usr/bin/python3"
timeout_secs = 10

[output]
path = "results/run.jsonl"
report = "results/run.txt"
"#,
        )
        .unwrap();

        assert_eq!(config.engine.model, "mixtral-8x7b-instruct");
        assert_eq!(config.prompt.user_end, "<|end|>");
        assert_eq!(config.prompt.system_end, "\n");
        assert_eq!(config.methods.len(), 2);
        assert_eq!(config.methods[0].iterations, 1);
        assert_eq!(config.methods[1].kind, MethodKind::Pal);
        assert_eq!(config.voting.strategy, VotingStrategy::Frequency);
        assert_eq!(config.voting.early_stopping, Some(3));
        assert_eq!(config.output.report, Some(PathBuf::from("results/run.txt")));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.methods[0].iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroIterations(MethodKind::Cot))
        ));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.methods.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoMethods)));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.voting.llm_decider = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingDeciderExemplars)
        ));

        let mut config = Config::from_toml(MINIMAL).unwrap();
        config.voting.early_stopping = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_method_kind_fails_to_parse() {
        let err = Config::from_toml(&MINIMAL.replace("\"cot\"", "\"tree_of_thought\"")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[engine\n").unwrap();

        match Config::from_file(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(ConfigError::FileRead { .. })
        ));
    }

    #[test]
    fn test_api_key_resolution() {
        let mut config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.resolve_api_key().unwrap(), None);

        config.engine.api_key = Some("sk-literal".to_string());
        assert_eq!(config.resolve_api_key().unwrap().as_deref(), Some("sk-literal"));

        config.engine.api_key = None;
        config.engine.api_key_env = Some("CONCORD_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        assert!(matches!(
            config.resolve_api_key(),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_unset_placeholder_left_unchanged() {
        let raw = "Bearer ${CONCORD_TEST_VAR_THAT_IS_NEVER_SET}";
        assert_eq!(expand_env_vars(raw), raw);
    }
}
