//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use postcheck_core::{Analyzer, ProgressReporter};
use postcheck_providers::{AnthropicClient, BraveSearch, CmsClient};
use postcheck_shared::{
    AnalysisRequest, AnalysisResult, AppConfig, Credentials, PipelineConfig, api_key_from_env,
    init_config, load_config, load_config_from,
};

use crate::routes::{self, AppState};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// postcheck: research-backed fact-checking and rewriting for blog posts.
#[derive(Parser)]
#[command(
    name = "postcheck",
    version,
    about = "Fact-check blog posts against live web research and rewrite them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.postcheck/postcheck.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP service.
    Serve {
        /// Address to bind (overrides the config file).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file).
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Fact-check and rewrite one post from a file.
    Analyze {
        /// File holding the post body (HTML or plain text).
        #[arg(short, long)]
        input: PathBuf,

        /// Post title.
        #[arg(short, long, default_value = "")]
        title: String,

        /// Extra guidance for choosing what to research.
        #[arg(long)]
        research_prompt: Option<String>,

        /// Extra guidance for the rewrite.
        #[arg(long)]
        writing_prompt: Option<String>,

        /// Write the rewritten post here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
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
        0 => "postcheck=info,tower_http=info",
        1 => "postcheck=debug,tower_http=debug",
        _ => "postcheck=trace,tower_http=trace",
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { host, port } => cmd_serve(config_path, host, port).await,
        Command::Analyze {
            input,
            title,
            research_prompt,
            writing_prompt,
            out,
        } => {
            cmd_analyze(
                config_path,
                &input,
                title,
                research_prompt,
                writing_prompt,
                out.as_deref(),
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Wire the real search and model clients into an analyzer.
pub(crate) fn build_analyzer(config: &AppConfig) -> Result<Analyzer> {
    let search = BraveSearch::new(
        &config.search.endpoint,
        Duration::from_secs(config.pipeline.search_timeout_secs),
    )?;
    let llm = AnthropicClient::new(&config.llm)?;
    Ok(Analyzer::new(
        Arc::new(search),
        Arc::new(llm),
        PipelineConfig::from(config),
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let state = AppState {
        analyzer: build_analyzer(&config)?,
        cms: CmsClient::new(&config.cms)?,
    };
    let app = routes::build_router(state, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        model = %config.llm.model,
        budget_secs = config.pipeline.budget_secs,
        "postcheck listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn cmd_analyze(
    config_path: Option<&Path>,
    input: &Path,
    title: String,
    research_prompt: Option<String>,
    writing_prompt: Option<String>,
    out: Option<&Path>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let credentials = Credentials {
        search_key: api_key_from_env(&config.search.api_key_env)?,
        llm_key: api_key_from_env(&config.llm.api_key_env)?,
    };

    let content = std::fs::read_to_string(input)
        .wrap_err_with(|| format!("cannot read '{}'", input.display()))?;
    let request =
        AnalysisRequest::new(content, title, credentials, research_prompt, writing_prompt)?;

    info!(input = %input.display(), title = %request.title, "analyzing post");

    let analyzer = build_analyzer(&config)?;
    let reporter = CliProgress::new();
    let result = analyzer.run(&request, &reporter).await.map_err(|e| {
        reporter.fail();
        eyre!(
            "analysis failed after {:.1}s: {}",
            e.elapsed.as_secs_f64(),
            e.source
        )
    })?;

    match out {
        Some(path) => {
            std::fs::write(path, &result.rewritten_content)
                .wrap_err_with(|| format!("cannot write '{}'", path.display()))?;
        }
        None => println!("{}", result.rewritten_content),
    }

    // Summary goes to stderr so stdout stays pipeable.
    eprintln!();
    eprintln!("  Analysis complete!");
    eprintln!("  Searches:  {}", result.searches_used);
    eprintln!("  LLM calls: {}", result.llm_calls);
    eprintln!("  Sections:  {}", result.sections_updated);
    eprintln!("  Time:      {:.1}s", result.duration.as_secs_f64());
    for note in &result.change_summary {
        eprintln!("  - {note}");
    }
    if let Some(path) = out {
        eprintln!("  Output:    {}", path.display());
    }
    eprintln!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn fail(&self) {
        self.spinner.abandon_with_message("analysis failed");
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn search_finished(&self, query: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Searching [{current}/{total}] {query}"));
    }

    fn chunk_rewritten(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Rewriting section [{current}/{total}]"));
    }

    fn done(&self, _result: &AnalysisResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
