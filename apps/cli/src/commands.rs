//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pressgang_core::driver::run_stages;
use pressgang_core::executor::{StageHandler, StageReport, run_single, run_stage};
use pressgang_core::manifest;
use pressgang_core::stages::{
    AcquireHandler, ExtractHandler, PackageHandler, SeedContext, SynthesizeHandler, run_discovery,
};
use pressgang_providers::{
    ChatCompletionsProvider, DocumentSearch, GenerationProvider, ProviderRouter, RouterPolicy,
    SuggestClient, TavilySearch,
};
use pressgang_shared::{
    AppConfig, Stage, engine_api_key, init_config, load_config, resolve_path, search_api_key,
    validate_credentials,
};
use pressgang_storage::{BlobStore, Store};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pressgang — record pipeline for sourced, packaged reports.
#[derive(Parser)]
#[command(
    name = "pressgang",
    version,
    about = "Mine subjects, acquire sources, extract facts, synthesize content, package reports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Shared flags for the per-stage commands.
#[derive(Args)]
pub(crate) struct StageArgs {
    /// Run exactly one record, addressed by its key.
    #[arg(long)]
    single: Option<String>,

    /// Batch limit (defaults to the configured batch size).
    #[arg(long)]
    batch: Option<u32>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Mine candidate subjects from a seed and create records.
    Discover {
        /// Seed subject to expand.
        seed: String,

        /// Suffix-expansion depth (defaults to the configured depth).
        #[arg(long)]
        depth: Option<u32>,

        /// Category inherited by candidates no rule matches.
        #[arg(long)]
        category: Option<String>,

        /// Tags inherited by all candidates (repeatable).
        #[arg(long)]
        tag: Vec<String>,
    },

    /// Find and download source documents for pending records.
    Acquire(StageArgs),

    /// Extract structured facts from acquired documents.
    Extract(StageArgs),

    /// Synthesize article content from extracted facts.
    Synthesize(StageArgs),

    /// Render and upload report artifacts.
    Package(StageArgs),

    /// Run all four stages in dependency order, then regenerate the manifest.
    Run {
        /// Batch limit per stage (defaults to the configured batch size).
        #[arg(long)]
        batch: Option<u32>,
    },

    /// Regenerate sitemap.xml and manifest.json from published records.
    Publish,

    /// Print aggregate per-stage progress.
    Status,

    /// Reopen a terminal-failed stage on one record for manual retry.
    Reset {
        /// Record key.
        key: String,

        /// Stage to reset: acquire, extract, synthesize, or package.
        stage: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pressgang=info",
        1 => "pressgang=debug",
        _ => "pressgang=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Discover {
            seed,
            depth,
            category,
            tag,
        } => cmd_discover(&seed, depth, category, tag).await,
        Command::Acquire(args) => cmd_stage(Stage::Acquire, &args).await,
        Command::Extract(args) => cmd_stage(Stage::Extract, &args).await,
        Command::Synthesize(args) => cmd_stage(Stage::Synthesize, &args).await,
        Command::Package(args) => cmd_stage(Stage::Package, &args).await,
        Command::Run { batch } => cmd_run(batch).await,
        Command::Publish => cmd_publish().await,
        Command::Status => cmd_status().await,
        Command::Reset { key, stage } => cmd_reset(&key, &stage).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Runtime assembly
// ---------------------------------------------------------------------------

/// Opened stores plus the loaded configuration.
struct Runtime {
    config: AppConfig,
    store: Store,
    blobs: BlobStore,
}

async fn open_runtime() -> Result<Runtime> {
    let config = load_config()?;
    let db_path = resolve_path(&config.store.db_path)?;
    let store = Store::open(&db_path).await?;
    let blobs = BlobStore::new(
        resolve_path(&config.store.blob_root)?,
        config.store.public_base_url.clone(),
    );
    Ok(Runtime {
        config,
        store,
        blobs,
    })
}

/// Build the generation router from every engine whose key is available.
///
/// Credential validation runs first: a missing key set is the one fatal,
/// nonzero-exit failure class, and it fires before any record is touched.
fn build_router(config: &AppConfig) -> Result<Arc<ProviderRouter>> {
    validate_credentials(config)?;

    let timeout = Duration::from_secs(config.router.request_timeout_secs);
    let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();
    for engine in &config.engines {
        if let Some(key) = engine_api_key(engine) {
            let provider = ChatCompletionsProvider::from_engine(engine, key, timeout)?;
            providers.push(Arc::new(provider));
        }
    }

    Ok(Arc::new(ProviderRouter::new(
        providers,
        RouterPolicy::from(&config.router),
    )?))
}

fn build_search(config: &AppConfig) -> Result<Arc<dyn DocumentSearch>> {
    let key = search_api_key(config)?;
    Ok(Arc::new(TavilySearch::new(&config.search, key)?))
}

/// Build the handler for one stage, validating only the credentials that
/// stage actually needs.
fn build_handler(stage: Stage, runtime: &Runtime) -> Result<Box<dyn StageHandler>> {
    let config = &runtime.config;
    Ok(match stage {
        Stage::Acquire => Box::new(AcquireHandler::new(
            build_search(config)?,
            runtime.blobs.clone(),
            Duration::from_secs(config.pipeline.download_timeout_secs),
        )?),
        Stage::Extract => Box::new(ExtractHandler::new(
            runtime.blobs.clone(),
            build_router(config)?,
            config.pipeline.extract_first_pages,
        )),
        Stage::Synthesize => Box::new(SynthesizeHandler::new(
            build_router(config)?,
            config.pipeline.synthesize_attempts,
            config.pipeline.min_content_chars,
        )),
        Stage::Package => Box::new(PackageHandler::new(runtime.blobs.clone())),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(
    seed: &str,
    depth: Option<u32>,
    category: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let runtime = open_runtime().await?;
    let client = SuggestClient::new(&runtime.config.discovery)?;
    let depth = depth.unwrap_or(runtime.config.discovery.expansion_depth);

    let context = SeedContext {
        subject: seed.to_string(),
        category,
        tags,
    };

    info!(seed, depth, "starting discovery");
    let spinner = spinner(&format!("Discovering: {seed}"));
    let report = run_discovery(&runtime.store, &client, &context, depth).await?;
    spinner.finish_and_clear();

    println!();
    println!("  Discovery finished.");
    println!("  Candidates: {}", report.candidates);
    println!("  Upserted:   {}", report.upserted);
    println!("  Skipped:    {}", report.skipped);
    println!();

    Ok(())
}

async fn cmd_stage(stage: Stage, args: &StageArgs) -> Result<()> {
    let runtime = open_runtime().await?;
    let handler = build_handler(stage, &runtime)?;

    let spinner = spinner(&format!("Running {stage}"));
    let report = match &args.single {
        Some(key) => run_single(&runtime.store, handler.as_ref(), key).await?,
        None => {
            let limit = args.batch.unwrap_or(runtime.config.pipeline.batch_size);
            run_stage(&runtime.store, handler.as_ref(), limit).await?
        }
    };
    spinner.finish_and_clear();

    print_report(&report);
    Ok(())
}

async fn cmd_run(batch: Option<u32>) -> Result<()> {
    let runtime = open_runtime().await?;
    let limit = batch.unwrap_or(runtime.config.pipeline.batch_size);

    // Assemble all handlers up front so credential problems abort before
    // any record is touched.
    let acquire = build_handler(Stage::Acquire, &runtime)?;
    let extract = build_handler(Stage::Extract, &runtime)?;
    let synthesize = build_handler(Stage::Synthesize, &runtime)?;
    let package = build_handler(Stage::Package, &runtime)?;

    let spinner = spinner("Running pipeline");
    let reports = run_stages(
        &runtime.store,
        vec![
            acquire.as_ref(),
            extract.as_ref(),
            synthesize.as_ref(),
            package.as_ref(),
        ],
        limit,
    )
    .await?;

    let manifest_dir = resolve_path(&runtime.config.site.manifest_dir)?;
    let publish_report =
        manifest::publish(&runtime.store, &runtime.config.site, &manifest_dir).await?;
    spinner.finish_and_clear();

    println!();
    for report in &reports {
        println!("  {}", report.summary());
    }
    println!(
        "  manifest: {} entries -> {}",
        publish_report.entries,
        publish_report.sitemap_path.display()
    );
    println!();
    Ok(())
}

async fn cmd_publish() -> Result<()> {
    let runtime = open_runtime().await?;
    let manifest_dir = resolve_path(&runtime.config.site.manifest_dir)?;
    let report = manifest::publish(&runtime.store, &runtime.config.site, &manifest_dir).await?;

    println!();
    println!("  Manifest regenerated.");
    println!("  Entries: {}", report.entries);
    println!("  Sitemap: {}", report.sitemap_path.display());
    println!("  Listing: {}", report.manifest_path.display());
    println!();
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let runtime = open_runtime().await?;
    let counts = runtime.store.stage_counts().await?;

    println!();
    println!("  Records: {}", counts.total);
    for stage in Stage::ALL {
        println!(
            "  {:<11} {} done, {} failed",
            format!("{stage}:"),
            counts.done_for(stage),
            counts.failed_for(stage)
        );
    }
    println!();
    Ok(())
}

async fn cmd_reset(key: &str, stage: &str) -> Result<()> {
    let stage: Stage = stage.parse().map_err(|e: String| eyre!(e))?;
    let runtime = open_runtime().await?;

    if runtime.store.reset_stage(key, stage).await? {
        println!("  Reset {stage} on {key}; it is eligible again.");
    } else {
        println!("  Nothing to reset: {key} is not terminal-failed on {stage}.");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("  Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

fn print_report(report: &StageReport) {
    println!();
    println!("  {}", report.summary());
    if !report.failures.is_empty() {
        println!("  Failure sample:");
        for (key, reason) in &report.failures {
            println!("    {key}: {reason}");
        }
    }
    println!();
}
