//! Shared types, error model, and configuration for pressgang.
//!
//! This crate is the foundation depended on by all other pressgang crates.
//! It provides:
//! - [`PressgangError`] — the unified error type
//! - Domain types ([`Record`], [`Stage`], [`StageStatus`], [`ContentFacts`])
//! - Configuration ([`AppConfig`], config loading, credential validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, EngineConfig, PipelineConfig, RouterConfig, SearchConfig,
    SiteConfig, StoreConfig, config_dir, config_file_path, engine_api_key, init_config,
    load_config, load_config_from, resolve_path, search_api_key, validate_credentials,
};
pub use error::{PressgangError, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, ContentFacts, FailureKind, Record, RecordId, SeedCandidate, Stage,
    StageError, StageStatus, slugify,
};
