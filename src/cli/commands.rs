//! CLI command definitions for debate-forge.
//!
//! `serve` runs the HTTP/websocket server used by the front-end; `run` plays
//! a debate in the terminal, which is handy for tuning prompts without one.

use chrono::FixedOffset;
use clap::Parser;
use futures::{pin_mut, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::debate::{DebateEvent, DebateSpec, Facilitator, Lang};
use crate::llm::ModelsConfig;
use crate::server::{start_server, AppState};
use crate::session::{RoomRegistry, SessionSettings};
use crate::strategy::StrategySetup;

/// Default model tag used for the state judge.
const DEFAULT_MODEL_TAG: &str = "OpenAI";
const DEFAULT_MODELS_FILE: &str = "./configs/models.yml";
const DEFAULT_STRATEGIST_FILE: &str = "./configs/strategist_config.yml";

/// Multi-LLM panel debates with a discussion strategist.
#[derive(Parser)]
#[command(name = "debate-forge")]
#[command(about = "Run multi-LLM panel debates and stream them to viewers")]
#[command(version)]
#[command(
    long_about = "debate-forge runs turn-based debates between LLM panelists, optionally steering a panelist with an embedding-scored discussion strategist, and streams the transcript to websocket viewers one line at a time.\n\nExample usage:\n  debate-forge serve --port 8000 --config-dir ./configs\n  debate-forge run --config ./configs/tax_en.yml --agenda \"Should VAT rise?\" --strategy"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start the HTTP and websocket server.
    Serve(ServeArgs),

    /// Run one debate in the terminal and print every event.
    Run(RunArgs),
}

/// Model and strategist files shared by both commands.
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model tag -> connection settings.
    #[arg(long, env = "DEBATE_FORGE_MODELS", default_value = DEFAULT_MODELS_FILE)]
    pub models: PathBuf,

    /// Strategist configuration.
    #[arg(long, env = "DEBATE_FORGE_STRATEGIST", default_value = DEFAULT_STRATEGIST_FILE)]
    pub strategist: PathBuf,

    /// Model tag the state judge runs on.
    #[arg(long, default_value = DEFAULT_MODEL_TAG)]
    pub default_tag: String,
}

/// Arguments for `debate-forge serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "DEBATE_FORGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "DEBATE_FORGE_PORT", default_value = "8000")]
    pub port: u16,

    /// Directory with debate files and agenda lists.
    #[arg(long, default_value = "./configs")]
    pub config_dir: PathBuf,

    /// Directory with cached transcripts.
    #[arg(long, default_value = "./cache")]
    pub cache_dir: PathBuf,

    #[command(flatten)]
    pub model_args: ModelArgs,

    /// Serve without a strategist; requests with `tech_enable` then fail.
    #[arg(long)]
    pub no_strategist: bool,

    /// Delay after each pushed message, in milliseconds.
    #[arg(long, default_value = "1000")]
    pub pacing_ms: u64,

    /// UTC offset in hours for message timestamps.
    #[arg(long, default_value = "9", allow_hyphen_values = true)]
    pub utc_offset: i32,

    /// Allowed CORS origins (comma-separated). Empty allows any origin.
    #[arg(long, value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}

/// Arguments for `debate-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Debate file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// First agenda.
    #[arg(short, long)]
    pub agenda: String,

    /// Agendas for follow-up rounds, in order.
    #[arg(long = "continue-agenda")]
    pub continue_agenda: Vec<String>,

    #[command(flatten)]
    pub model_args: ModelArgs,

    /// Steer the last panelist with the strategist.
    #[arg(long)]
    pub strategy: bool,

    /// Language of system lines (ja or en).
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Override the number of turns per round.
    #[arg(long)]
    pub turns: Option<u32>,

    /// Print events as JSON lines.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Run(args) => run_debate_command(args).await,
    }
}

// ============================================================================
// serve
// ============================================================================

fn utc_offset(hours: i32) -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {} hours", hours))
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    if let Err(e) = crate::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registry not initialized");
    }

    let models = ModelsConfig::load(&args.model_args.models)?;
    info!(
        path = %args.model_args.models.display(),
        tags = ?models.tags().collect::<Vec<_>>(),
        "Loaded models"
    );

    let strategy = if args.no_strategist {
        info!("Strategist disabled");
        None
    } else {
        let setup = StrategySetup::load(&args.model_args.strategist)?;
        info!(
            path = %args.model_args.strategist.display(),
            embedder = setup.embedder.model_name(),
            "Loaded strategist"
        );
        Some(setup)
    };

    let settings = SessionSettings::new(Arc::new(models))
        .with_strategy(strategy)
        .with_default_tag(args.model_args.default_tag.clone())
        .with_cache_dir(args.cache_dir.clone())
        .with_pacing(Duration::from_millis(args.pacing_ms))
        .with_utc_offset(utc_offset(args.utc_offset)?);

    let registry = Arc::new(RoomRegistry::new(Arc::new(settings)));
    let state = AppState::new(registry, args.config_dir.clone());
    start_server(&args.host, args.port, state, &args.allowed_origins).await
}

// ============================================================================
// run
// ============================================================================

fn print_event(event: &DebateEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        DebateEvent::TurnAnnouncement { text, .. } => println!("\n{}", text),
        DebateEvent::InterventionNotice { text } => println!("  [{}]", text),
        DebateEvent::Comment { speaker, text } => println!("{}: {}", speaker, text),
        DebateEvent::RoundComplete => {}
    }
    Ok(())
}

async fn run_round(
    facilitator: &mut Facilitator,
    agenda: &str,
    is_continuation: bool,
    use_strategy: bool,
    lang: Lang,
    json: bool,
) -> anyhow::Result<()> {
    if !json {
        println!("\n>>> {}", agenda);
    }
    let stream = facilitator.run(agenda, is_continuation, use_strategy, lang);
    pin_mut!(stream);
    while let Some(event) = stream.next().await {
        let event = event?;
        print_event(&event, json)?;
        if event.is_complete() {
            break;
        }
    }
    Ok(())
}

async fn run_debate_command(args: RunArgs) -> anyhow::Result<()> {
    let mut spec = DebateSpec::load(&args.config)?;
    if let Some(turns) = args.turns {
        spec.num_discussion_turn = turns.max(1);
    }
    let models = ModelsConfig::load(&args.model_args.models)?;
    let strategy = if args.strategy {
        Some(StrategySetup::load(&args.model_args.strategist)?)
    } else {
        None
    };

    let mut facilitator = Facilitator::new(
        &spec,
        &models,
        &args.model_args.default_tag,
        strategy.as_ref(),
    )
    .await?;
    let lang = Lang::from(args.lang.as_str());

    info!(
        label = %spec.label,
        panelists = spec.panelists.len(),
        turns = spec.num_discussion_turn,
        strategy = args.strategy,
        "Starting debate"
    );
    run_round(&mut facilitator, &args.agenda, false, args.strategy, lang, args.json).await?;
    for agenda in &args.continue_agenda {
        run_round(&mut facilitator, agenda, true, args.strategy, lang, args.json).await?;
    }

    if !args.json {
        println!("\n{}", lang.discussion_finished());
    }
    info!(entries = facilitator.context().discussion_log.len(), "Debate finished");
    Ok(())
}
