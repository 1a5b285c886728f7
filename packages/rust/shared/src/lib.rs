//! Shared types, error model, and configuration for postcheck.
//!
//! This crate is the foundation depended on by all other postcheck crates.
//! It provides:
//! - [`PostcheckError`], the unified error type
//! - Domain types ([`AnalysisRequest`], [`AnalysisResult`], [`Deadline`], [`SearchHit`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CmsConfig, LlmConfig, PipelineConfig, PipelineSection, SearchConfig, ServerConfig,
    api_key_from_env, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PostcheckError, Result};
pub use types::{AnalysisRequest, AnalysisResult, Credentials, Deadline, RequestId, SearchHit};
