//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use supportpilot_core::{ProgressReporter, Workflow, WorkflowConfig};
use supportpilot_knowledge::KnowledgeStore;
use supportpilot_llm::OpenAiClient;
use supportpilot_shared::{
    AppConfig, NewDocument, ProcessResult, SupportPilotError, completion_api_key, init_config,
    load_config,
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SupportPilot: multi-agent customer support assistant.
#[derive(Parser)]
#[command(
    name = "supportpilot",
    version,
    about = "Classify, answer and validate customer support requests.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one support request through the pipeline.
    Process {
        /// Request text. Omit when using --stdin.
        #[arg(required_unless_present = "stdin", conflicts_with = "stdin")]
        text: Option<String>,

        /// Read the request text from standard input.
        #[arg(long)]
        stdin: bool,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Knowledge base management.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum KbAction {
    /// Load the sample support articles.
    Seed {
        /// Seed even if the knowledge base already has articles.
        #[arg(long)]
        force: bool,
    },
    /// Remove every article.
    Clean,
    /// Add one article.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// List stored articles.
    List,
    /// Search articles by semantic similarity.
    Search {
        query: String,

        /// Maximum number of results (defaults to `pipeline.search_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity (defaults to `pipeline.similarity_threshold`).
        #[arg(long)]
        threshold: Option<f64>,
    },
}

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
        0 => "supportpilot=info",
        1 => "supportpilot=debug",
        _ => "supportpilot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Process { text, stdin, json } => cmd_process(text, stdin, json).await,
        Command::Kb { action } => match action {
            KbAction::Seed { force } => cmd_kb_seed(force).await,
            KbAction::Clean => cmd_kb_clean().await,
            KbAction::Add { title, content } => cmd_kb_add(title, content).await,
            KbAction::List => cmd_kb_list().await,
            KbAction::Search {
                query,
                limit,
                threshold,
            } => cmd_kb_search(&query, limit, threshold).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Build the completion client and open the configured knowledge store.
async fn connect(config: &AppConfig) -> Result<(Arc<OpenAiClient>, Arc<dyn KnowledgeStore>)> {
    let api_key = completion_api_key(config)?;
    let client = Arc::new(OpenAiClient::from_config(&config.completion, api_key)?);
    let store = supportpilot_knowledge::open_store(config, client.clone()).await?;
    info!(backend = store.name(), "knowledge store ready");
    Ok((client, store))
}

async fn open_knowledge() -> Result<Arc<dyn KnowledgeStore>> {
    let config = load_config()?;
    let (_, store) = connect(&config).await?;
    Ok(store)
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

async fn cmd_process(text: Option<String>, from_stdin: bool, json: bool) -> Result<()> {
    let text = if from_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| eyre!("failed to read request from stdin: {e}"))?;
        buf
    } else {
        text.unwrap_or_default()
    };

    let text = non_blank(text)?;

    let config = load_config()?;
    let (client, store) = connect(&config).await?;
    let workflow = Workflow::new(client, store, WorkflowConfig::from(&config));

    let request_id = Uuid::now_v7();
    let span = info_span!("request", %request_id);
    let reporter = CliProgress::new();
    let result = workflow
        .process_request_with(&text, &reporter)
        .instrument(span)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Reject blank input. Accepted text is passed on untouched.
fn non_blank(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(SupportPilotError::validation("request text must not be empty").into());
    }
    Ok(text)
}

fn print_result(result: &ProcessResult) {
    println!();
    println!("{}", result.answer);
    println!();

    if !result.sources.is_empty() {
        println!("  Sources:");
        for source in &result.sources {
            println!("    [{:.2}] {}", source.similarity_score, source.title);
        }
        println!();
    }

    let steps: Vec<_> = result
        .trace
        .iter()
        .map(|r| {
            if r.is_error() {
                format!("{} (error)", r.step_name)
            } else {
                r.step_name.clone()
            }
        })
        .collect();
    println!("  Steps:   {}", steps.join(" → "));
    println!("  Latency: {} ms", result.metrics.latency_ms);
    println!("  Tokens:  ~{}", result.metrics.token_usage);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the stage currently running.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn step_started(&self, agent_name: &str, step_name: &str) {
        self.spinner.set_message(format!("{agent_name}: {step_name}"));
    }

    fn done(&self, _result: &ProcessResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// kb
// ---------------------------------------------------------------------------

async fn cmd_kb_seed(force: bool) -> Result<()> {
    let store = open_knowledge().await?;
    let report = supportpilot_knowledge::seed(store.as_ref(), force).await?;

    if report.skipped {
        println!(
            "Knowledge base already has {} article(s); use --force to seed anyway.",
            report.existing
        );
    } else {
        println!(
            "Seeded {} article(s) ({} duplicate(s) skipped).",
            report.inserted, report.duplicates
        );
    }
    Ok(())
}

async fn cmd_kb_clean() -> Result<()> {
    let store = open_knowledge().await?;
    let removed = supportpilot_knowledge::clean(store.as_ref()).await?;
    println!("Removed {removed} article(s).");
    Ok(())
}

async fn cmd_kb_add(title: String, content: String) -> Result<()> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(SupportPilotError::validation("title and content must not be empty").into());
    }

    let store = open_knowledge().await?;
    match store.add_document(NewDocument::new(title, content)).await? {
        Some(id) => println!("Added article {id}."),
        None => println!("An article with identical content already exists."),
    }
    Ok(())
}

async fn cmd_kb_list() -> Result<()> {
    let store = open_knowledge().await?;
    let docs = store.list().await?;
    if docs.is_empty() {
        println!("Knowledge base is empty. Run `supportpilot kb seed` to load sample articles.");
        return Ok(());
    }

    for doc in &docs {
        println!("  {}  {}", doc.id, doc.title);
    }
    println!();
    println!("  {} article(s)", docs.len());
    Ok(())
}

async fn cmd_kb_search(query: &str, limit: Option<usize>, threshold: Option<f64>) -> Result<()> {
    let config = load_config()?;
    let limit = limit.unwrap_or(config.pipeline.search_limit as usize);
    let threshold = threshold.unwrap_or(config.pipeline.similarity_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(eyre!("threshold must be within [0, 1], got {threshold}"));
    }

    let (_, store) = connect(&config).await?;
    let hits = store.search(query, limit, threshold).await?;
    if hits.is_empty() {
        println!("No articles above similarity {threshold}.");
        return Ok(());
    }

    for hit in &hits {
        println!(
            "  [{:.3}] {}  {}",
            hit.similarity.unwrap_or(0.0),
            hit.id,
            hit.title
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
