//! Application configuration for pressgang.
//!
//! User config lives at `~/.pressgang/pressgang.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Credentials are never stored: engine and search entries name the
//! environment variable holding their key. The config struct is built
//! once at process start and passed by reference into every component;
//! nothing else reads ambient environment state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PressgangError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pressgang.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pressgang";

// ---------------------------------------------------------------------------
// Config structs (matching pressgang.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store and blob store locations.
    #[serde(default)]
    pub store: StoreConfig,

    /// Generation engines, in preference order.
    #[serde(default = "default_engines")]
    pub engines: Vec<EngineConfig>,

    /// Provider router policy.
    #[serde(default)]
    pub router: RouterConfig,

    /// Subject discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Source-document search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Per-stage batch behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Published-site settings for manifest generation.
    #[serde(default)]
    pub site: SiteConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory for blob buckets.
    #[serde(default = "default_blob_root")]
    pub blob_root: String,

    /// Public base URL under which blobs are served.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            blob_root: default_blob_root(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_db_path() -> String {
    "~/.pressgang/records.db".into()
}
fn default_blob_root() -> String {
    "~/.pressgang/blobs".into()
}
fn default_public_base_url() -> String {
    "https://files.pressgang.dev".into()
}

/// `[[engines]]` entry — one OpenAI-compatible generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Short display name used in logs.
    pub name: String,
    /// Chat-completions base URL (e.g. `https://api.deepseek.com`).
    pub base_url: String,
    /// Model identifier passed on every request.
    pub model: String,
    /// Name of the env var holding the API key (never the key itself).
    pub api_key_env: String,
}

fn default_engines() -> Vec<EngineConfig> {
    vec![
        EngineConfig {
            name: "deepseek".into(),
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            api_key_env: "DEEPSEEK_API_KEY".into(),
        },
        EngineConfig {
            name: "groq".into(),
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key_env: "GROQ_API_KEY".into(),
        },
    ]
}

/// `[router]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Attempts per provider before falling through to the next.
    #[serde(default = "default_attempts_per_provider")]
    pub max_attempts_per_provider: u32,

    /// Wait after a rate-limit response without a suggested delay.
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_secs: u64,

    /// Wait after a generic transient provider error.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Per-call timeout for generation requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Randomize provider order across calls to spread load.
    #[serde(default = "default_true")]
    pub shuffle: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: default_attempts_per_provider(),
            rate_limit_backoff_secs: default_rate_limit_backoff(),
            error_backoff_secs: default_error_backoff(),
            request_timeout_secs: default_request_timeout(),
            shuffle: default_true(),
        }
    }
}

fn default_attempts_per_provider() -> u32 {
    2
}
fn default_rate_limit_backoff() -> u64 {
    30
}
fn default_error_backoff() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Suggestion endpoint; the seed is appended as the `q` parameter.
    #[serde(default = "default_suggest_url")]
    pub suggest_url: String,

    /// Breadth-first suffix expansion depth (0 = seed only).
    #[serde(default = "default_expansion_depth")]
    pub expansion_depth: u32,

    /// Sleep between expansion levels, protecting the suggest endpoint.
    #[serde(default = "default_level_delay_ms")]
    pub level_delay_ms: u64,

    /// Timeout for suggestion requests.
    #[serde(default = "default_suggest_timeout")]
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            suggest_url: default_suggest_url(),
            expansion_depth: default_expansion_depth(),
            level_delay_ms: default_level_delay_ms(),
            timeout_secs: default_suggest_timeout(),
        }
    }
}

fn default_suggest_url() -> String {
    "https://www.google.com/complete/search?client=chrome".into()
}
fn default_expansion_depth() -> u32 {
    1
}
fn default_level_delay_ms() -> u64 {
    1000
}
fn default_suggest_timeout() -> u64 {
    10
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search API endpoint used to locate official source documents.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Timeout for search requests.
    #[serde(default = "default_suggest_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
            timeout_secs: default_suggest_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".into()
}
fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default batch limit per stage invocation.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Timeout for source-document downloads.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Pages always kept from the front of a source document.
    #[serde(default = "default_first_pages")]
    pub extract_first_pages: usize,

    /// In-stage generation attempts for synthesis validation failures.
    #[serde(default = "default_synthesize_attempts")]
    pub synthesize_attempts: u32,

    /// Minimum accepted synthesized-content length, in characters.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            download_timeout_secs: default_download_timeout(),
            extract_first_pages: default_first_pages(),
            synthesize_attempts: default_synthesize_attempts(),
            min_content_chars: default_min_content_chars(),
        }
    }
}

fn default_batch_size() -> u32 {
    10
}
fn default_download_timeout() -> u64 {
    20
}
fn default_first_pages() -> usize {
    5
}
fn default_synthesize_attempts() -> u32 {
    3
}
fn default_min_content_chars() -> usize {
    1500
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Canonical site base URL used in the sitemap.
    #[serde(default = "default_site_base_url")]
    pub base_url: String,

    /// Directory where `sitemap.xml` and `manifest.json` are written.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_base_url(),
            manifest_dir: default_manifest_dir(),
        }
    }
}

fn default_site_base_url() -> String {
    "https://pressgang.dev".into()
}
fn default_manifest_dir() -> String {
    "site".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pressgang/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PressgangError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pressgang/pressgang.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig {
            engines: default_engines(),
            ..AppConfig::default()
        });
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PressgangError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PressgangError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PressgangError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig {
        engines: default_engines(),
        ..AppConfig::default()
    };
    let content =
        toml::to_string_pretty(&config).map_err(|e| PressgangError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PressgangError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn resolve_path(raw: &str) -> Result<PathBuf> {
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| PressgangError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(raw))
    }
}

/// Resolve the API key for an engine, if its env var is set and non-empty.
pub fn engine_api_key(engine: &EngineConfig) -> Option<String> {
    std::env::var(&engine.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}

/// Check that at least one generation engine has a key available.
///
/// This runs before any record is touched; a failure here is the only
/// condition under which a stage command exits nonzero.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    if config.engines.is_empty() {
        return Err(PressgangError::config(
            "no generation engines configured; add an [[engines]] entry",
        ));
    }

    if config.engines.iter().any(|e| engine_api_key(e).is_some()) {
        Ok(())
    } else {
        let vars: Vec<&str> = config
            .engines
            .iter()
            .map(|e| e.api_key_env.as_str())
            .collect();
        Err(PressgangError::config(format!(
            "no generation provider key found. Set one of: {}",
            vars.join(", ")
        )))
    }
}

/// Resolve the search API key, required by the acquisition stage.
pub fn search_api_key(config: &AppConfig) -> Result<String> {
    std::env::var(&config.search.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            PressgangError::config(format!(
                "search API key not found. Set the {} environment variable.",
                config.search.api_key_env
            ))
        })
}
