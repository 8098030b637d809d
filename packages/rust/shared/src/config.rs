//! Application configuration for SupportPilot.
//!
//! User config lives at `~/.supportpilot/supportpilot.toml`.
//! Environment overrides (`AGENT_MAX_RETRIES`, `AGENT_STEP_TIMEOUT_SECONDS`)
//! win over the config file, which wins over defaults. Secrets are never
//! written to the file; it only names the env vars that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SupportPilotError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "supportpilot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".supportpilot";

/// Env var overriding `pipeline.max_retries`.
pub const MAX_RETRIES_ENV: &str = "AGENT_MAX_RETRIES";

/// Env var overriding `pipeline.step_timeout_secs`.
pub const STEP_TIMEOUT_ENV: &str = "AGENT_STEP_TIMEOUT_SECONDS";

// ---------------------------------------------------------------------------
// Config structs (matching supportpilot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Step execution policy and retrieval parameters.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Completion and embedding service settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Knowledge store selection.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Optional system prompt overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Additional attempts per step after the first one fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-step deadline in seconds.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: f64,

    /// Maximum number of knowledge sources retrieved per request.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,

    /// Minimum cosine similarity for a source to be retrieved.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            step_timeout_secs: default_step_timeout(),
            search_limit: default_search_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_step_timeout() -> f64 {
    30.0
}
fn default_search_limit() -> u32 {
    5
}
fn default_similarity_threshold() -> f64 {
    0.7
}

/// Which completion API dialect to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// OpenAI-compatible `/chat/completions` with bearer auth.
    #[default]
    OpenAi,
    /// Azure OpenAI deployments with `api-key` auth.
    Azure,
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub provider: CompletionProvider,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL. For Azure this is the resource endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model (or Azure deployment) used for drafting.
    #[serde(default = "default_model")]
    pub model: String,

    /// Lower-latency model used for classification and validation.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Embedding model (or Azure deployment).
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Azure `api-version` query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::default(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            fast_model: default_fast_model(),
            embedding_model: default_embedding_model(),
            api_version: default_api_version(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_fast_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_api_version() -> String {
    "2024-02-01".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_request_timeout() -> u64 {
    60
}

/// Where knowledge articles are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBackend {
    /// libSQL file on disk with in-process similarity search.
    #[default]
    Local,
    /// Supabase/PostgREST with a pgvector `search_documents` function.
    Supabase,
    /// Fixed built-in articles; no embeddings required.
    Demo,
}

/// `[knowledge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub backend: KnowledgeBackend,

    /// Database path for the local backend (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Env var holding the Supabase project URL.
    #[serde(default = "default_supabase_url_env")]
    pub supabase_url_env: String,

    /// Env var holding the Supabase service key.
    #[serde(default = "default_supabase_key_env")]
    pub supabase_key_env: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: KnowledgeBackend::default(),
            db_path: default_db_path(),
            supabase_url_env: default_supabase_url_env(),
            supabase_key_env: default_supabase_key_env(),
        }
    }
}

fn default_db_path() -> String {
    "~/.supportpilot/knowledge.db".into()
}
fn default_supabase_url_env() -> String {
    "SUPABASE_URL".into()
}
fn default_supabase_key_env() -> String {
    "SUPABASE_KEY".into()
}

/// `[prompts]` section. Unset entries use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let timeout = self.pipeline.step_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(SupportPilotError::config(format!(
                "pipeline.step_timeout_secs must be a positive number, got {timeout}"
            )));
        }

        let threshold = self.pipeline.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SupportPilotError::config(format!(
                "pipeline.similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }

        if self.pipeline.search_limit == 0 {
            return Err(SupportPilotError::config(
                "pipeline.search_limit must be at least 1",
            ));
        }

        url::Url::parse(&self.completion.base_url).map_err(|e| {
            SupportPilotError::config(format!(
                "completion.base_url '{}' is not a valid URL: {e}",
                self.completion.base_url
            ))
        })?;

        Ok(())
    }

    /// Apply `AGENT_MAX_RETRIES` / `AGENT_STEP_TIMEOUT_SECONDS` if set.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(MAX_RETRIES_ENV) {
            self.pipeline.max_retries = raw.trim().parse().map_err(|e| {
                SupportPilotError::config(format!("{MAX_RETRIES_ENV}='{raw}' is not an integer: {e}"))
            })?;
        }

        if let Ok(raw) = std::env::var(STEP_TIMEOUT_ENV) {
            self.pipeline.step_timeout_secs = raw.trim().parse().map_err(|e| {
                SupportPilotError::config(format!("{STEP_TIMEOUT_ENV}='{raw}' is not a number: {e}"))
            })?;
        }

        Ok(())
    }

    /// Resolved path of the local knowledge database.
    pub fn knowledge_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.knowledge.db_path)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.supportpilot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SupportPilotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.supportpilot/supportpilot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, then apply env overrides.
/// Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SupportPilotError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SupportPilotError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SupportPilotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SupportPilotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SupportPilotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the completion API key from the configured env var.
pub fn completion_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.completion.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SupportPilotError::config(format!(
            "completion API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read the Supabase URL and key from their configured env vars.
pub fn supabase_credentials(config: &AppConfig) -> Result<(String, String)> {
    let read = |var_name: &str| match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SupportPilotError::config(format!(
            "Supabase backend selected but {var_name} is not set"
        ))),
    };

    Ok((
        read(&config.knowledge.supabase_url_env)?,
        read(&config.knowledge.supabase_key_env)?,
    ))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SupportPilotError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
