//! Shared types, error model, and configuration for SupportPilot.
//!
//! This crate is the foundation depended on by all other SupportPilot crates.
//! It provides:
//! - [`SupportPilotError`]: the unified error type
//! - Domain types ([`Intent`], [`Source`], [`StepRecord`], [`ProcessResult`], ...)
//! - Configuration ([`AppConfig`], config loading, env overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, CompletionProvider, KnowledgeBackend, KnowledgeConfig,
    PipelineConfig, PromptsConfig, completion_api_key, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, supabase_credentials,
};
pub use error::{Result, SupportPilotError};
pub use types::{
    Intent, KnowledgeDocument, Metrics, NewDocument, ProcessResult, SearchHit, Sentiment, Source,
    StepRecord, Urgency,
};
