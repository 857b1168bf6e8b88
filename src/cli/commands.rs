//! CLI command definitions for kopi.
//!
//! The binary is the composition root: it loads configuration, opens the
//! conversation store, owns the provider handle and drives the service.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::debate::ProviderHandle;
use crate::metrics::{export_metrics, init_metrics};
use crate::service::{parse_conversation_id, DebateRequest, DebateService, DebateSnapshot, DebateTurn};
use crate::storage::{ConversationUpdate, Database, StoredMessage};

/// Kopi, a debate bot that always takes the other side.
#[derive(Parser)]
#[command(name = "kopi")]
#[command(about = "Debate an LLM that always argues the opposite stance")]
#[command(version)]
#[command(
    long_about = "kopi extracts a topic and a contrarian stance from your first message and then defends that stance for the rest of the conversation.\n\nExample usage:\n  kopi chat \"Remote work is the future\"\n  kopi chat --conversation-id <id> \"But commuting wastes hours\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file; environment variables override its values.
    #[arg(long, env = "KOPI_CONFIG", global = true)]
    pub config: Option<String>,

    /// SQLite database URL (overrides configuration).
    #[arg(long, global = true)]
    pub database: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Send a message, opening a new debate unless a conversation is given.
    #[command(alias = "say")]
    Chat(ChatArgs),

    /// Show a conversation and its first messages.
    Show(ShowArgs),

    /// List conversations, most recently active first.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Edit a conversation's topic, stance or active flag.
    Update(UpdateArgs),

    /// Delete a conversation and all of its messages.
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Apply database migrations.
    Migrate(MigrateArgs),

    /// Generate one reply to a canned prompt to verify provider settings.
    Check(CheckArgs),
}

/// Arguments for `kopi chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// The message to send.
    pub message: String,

    /// Conversation to continue.
    #[arg(short = 'c', long)]
    pub conversation_id: Option<String>,

    /// Number of recent messages to print after the reply.
    #[arg(short = 'n', long)]
    pub max_messages: Option<usize>,

    /// Print the turn as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print Prometheus metrics after the turn.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `kopi show`.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    pub conversation_id: String,

    /// Number of messages to print, from the start of the conversation.
    #[arg(short = 'n', long)]
    pub max_messages: Option<usize>,

    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kopi list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Maximum number of conversations.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kopi update`.
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    pub conversation_id: String,

    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub stance: Option<String>,

    /// Stop accepting new messages for this conversation.
    #[arg(long, conflicts_with = "activate")]
    pub deactivate: bool,

    /// Accept new messages again.
    #[arg(long)]
    pub activate: bool,
}

/// Arguments for `kopi delete`.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    pub conversation_id: String,
}

/// Arguments for `kopi migrate`.
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// List applied and pending migrations without changing anything.
    #[arg(long)]
    pub status: bool,

    /// Drop all tables before migrating. Destroys all data.
    #[arg(long, conflicts_with = "status")]
    pub reset: bool,
}

/// Arguments for `kopi check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.database.as_deref())?;

    match cli.command {
        Commands::Chat(args) => run_chat_command(config, args).await,
        Commands::Show(args) => run_show_command(config, args).await,
        Commands::List(args) => run_list_command(config, args).await,
        Commands::Update(args) => run_update_command(config, args).await,
        Commands::Delete(args) => run_delete_command(config, args).await,
        Commands::Migrate(args) => run_migrate_command(config, args).await,
        Commands::Check(args) => run_check_command(config, args).await,
    }
}

/// Defaults, then the YAML file if any, then environment, then `--database`.
fn load_config(path: Option<&str>, database: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::default(),
    };

    config.apply_overrides(|key| std::env::var(key).ok())?;
    if let Some(url) = database {
        config.database_url = url.to_string();
    }
    config.validate()?;

    Ok(config)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Database> {
    let store = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    let applied = store.run_migrations().await?;
    if applied > 0 {
        info!(applied, "Database migrations applied");
    }
    Ok(store)
}

// ============================================================================
// Conversation commands
// ============================================================================

async fn run_chat_command(config: AppConfig, args: ChatArgs) -> anyhow::Result<()> {
    if args.metrics {
        init_metrics().context("Failed to initialize metrics")?;
    }

    let conversation_id = args
        .conversation_id
        .as_deref()
        .map(parse_conversation_id)
        .transpose()?;

    let store = open_store(&config).await?;
    let provider = Arc::new(ProviderHandle::new(config));
    let service = DebateService::new(provider, store);

    let mut request = DebateRequest::new(args.message);
    request.conversation_id = conversation_id;
    request.max_messages = args.max_messages;

    let turn = service.post_message(request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
    } else {
        print_turn(&turn);
    }

    if args.metrics {
        print!("{}", export_metrics());
    }

    Ok(())
}

async fn run_show_command(config: AppConfig, args: ShowArgs) -> anyhow::Result<()> {
    let conversation_id = parse_conversation_id(&args.conversation_id)?;
    let store = open_store(&config).await?;
    let service = DebateService::new(Arc::new(ProviderHandle::new(config)), store);

    let snapshot = service.get_debate(conversation_id, args.max_messages).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

async fn run_list_command(config: AppConfig, args: ListArgs) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let conversations = store.list_conversations(args.limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    for conversation in conversations {
        let count = store.count_messages(conversation.id).await?;
        println!(
            "{}  {:>3} msgs  {}{}",
            conversation.id,
            count,
            conversation.topic,
            if conversation.is_active { "" } else { "  (inactive)" }
        );
    }
    Ok(())
}

async fn run_update_command(config: AppConfig, args: UpdateArgs) -> anyhow::Result<()> {
    let conversation_id = parse_conversation_id(&args.conversation_id)?;

    let mut update = ConversationUpdate::new();
    update.topic = args.topic;
    update.bot_stance = args.stance;
    if args.deactivate {
        update.is_active = Some(false);
    } else if args.activate {
        update.is_active = Some(true);
    }

    if update.is_empty() {
        anyhow::bail!("Nothing to update: pass --topic, --stance, --activate or --deactivate");
    }

    let store = open_store(&config).await?;
    let conversation = store.update_conversation(conversation_id, update).await?;

    println!("Updated {}", conversation.id);
    println!("  Topic:  {}", conversation.topic);
    println!("  Stance: {}", conversation.bot_stance);
    println!("  Active: {}", conversation.is_active);
    Ok(())
}

async fn run_delete_command(config: AppConfig, args: DeleteArgs) -> anyhow::Result<()> {
    let conversation_id = parse_conversation_id(&args.conversation_id)?;
    let store = open_store(&config).await?;

    if !store.delete_conversation(conversation_id).await? {
        anyhow::bail!("Conversation not found: {}", conversation_id);
    }
    println!("Deleted {}", conversation_id);
    Ok(())
}

// ============================================================================
// Maintenance commands
// ============================================================================

async fn run_migrate_command(config: AppConfig, args: MigrateArgs) -> anyhow::Result<()> {
    let store = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    let runner = store.migrations();

    if args.status {
        for migration in runner.list_applied_migrations().await? {
            println!("applied  {}  {}", migration.name, migration.applied_at.to_rfc3339());
        }
        for name in runner.pending_migrations().await? {
            println!("pending  {}", name);
        }
        return Ok(());
    }

    if args.reset {
        runner.reset_database().await?;
    }

    let applied = runner.run_migrations().await?;
    println!("Applied {} migration(s)", applied);
    Ok(())
}

async fn run_check_command(config: AppConfig, args: CheckArgs) -> anyhow::Result<()> {
    let handle = ProviderHandle::new(config);
    let report = handle.check_connection().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.success {
        println!(
            "{} ({}) OK, {} chars",
            report.provider,
            report.model.as_deref().unwrap_or("unknown model"),
            report.response_length.unwrap_or(0)
        );
        if let Some(preview) = &report.response_preview {
            println!("  {}", preview);
        }
    } else {
        println!(
            "{} check failed: {}",
            report.provider,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    if !report.success {
        anyhow::bail!("Provider check failed");
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_turn(turn: &DebateTurn) {
    println!("Conversation: {}", turn.conversation_id);
    println!("Topic:        {}", turn.topic);
    println!("Kopi argues:  {}", turn.bot_stance);
    println!();
    println!("{}", turn.bot_response);
}

fn print_snapshot(snapshot: &DebateSnapshot) {
    println!("Conversation: {}", snapshot.conversation_id);
    println!("Topic:        {}", snapshot.topic);
    println!("Kopi argues:  {}", snapshot.bot_stance);
    if !snapshot.is_active {
        println!("Status:       inactive");
    }
    println!();
    for message in &snapshot.messages {
        print_message(message);
    }
}

fn print_message(message: &StoredMessage) {
    let label = match message.role {
        crate::debate::Role::User => "you ",
        crate::debate::Role::Bot => "kopi",
    };
    println!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        label,
        message.content
    );
}
