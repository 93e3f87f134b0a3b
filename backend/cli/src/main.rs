mod history_cmd;
mod runtime;
mod status_cmd;
mod terminal_output;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use chatrelay_agent::ConversationMailbox;
use chatrelay_channels::{ChannelAdapter, MockSender, WhatsAppAdapter, WhatsAppWebhookConfig};
use chatrelay_config::{config_file_path, load_config, log_report, validate, RelayConfig};
use chatrelay_gateway::{build_router, spawn_inbound_pump, start_server, GatewayState};
use chatrelay_logging::init_logger;

use terminal_output::{note_info, note_success, note_warn};

/// Inbound deliveries buffered between the webhook and the mailbox.
const INBOUND_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "ChatRelay: WhatsApp chat relay to an LLM completion service")]
#[command(version)]
struct Cli {
    /// Path to config.yaml (default: $CHATRELAY_CONFIG or ~/.chatrelay/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the status of a running server
    Status {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print a stored conversation, or list conversations
    History {
        /// Conversation id, e.g. `whatsapp:+15551234567`
        #[arg(long)]
        conversation: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the effective configuration with secrets redacted
    Config,
    /// Run one conversation turn in-process without sending anything
    Simulate {
        /// Conversation id the message comes from
        #[arg(long)]
        from: String,
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let path = config_file_path(cli.config.as_deref());
    let (config, report) = load_config(&path).await?;

    let log_dir = matches!(cli.command, Commands::Serve { .. })
        .then(|| config.logging.dir.as_deref())
        .flatten();
    init_logger(&config.logging.level, log_dir, config.logging.json);

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            log_report(&validate(&config))?;
            run_server(config).await?;
        }
        Commands::Status { port } => {
            status_cmd::run(port.unwrap_or(config.server.port)).await?;
        }
        Commands::History {
            conversation,
            limit,
        } => {
            history_cmd::run(&config, conversation.as_deref(), limit).await?;
        }
        Commands::Config => {
            note_info(&format!("Config file: {}", path.display()));
            let snapshot = chatrelay_config::redacted_snapshot(&config)?;
            println!("{}", serde_yaml::to_string(&snapshot)?);
            for warning in &report.warnings {
                note_warn(&format!("{}: {}", warning.path, warning.message));
            }
            for error in &report.errors {
                terminal_output::note_error(&format!("{}: {}", error.path, error.message));
            }
            if report.is_valid() {
                note_success("Configuration is valid");
            }
        }
        Commands::Simulate { from, text } => {
            let mut config = config;
            config.twilio.dry_run = true;
            log_report(&validate(&config))?;
            simulate(&config, &from, &text).await?;
        }
    }

    Ok(())
}

async fn run_server(config: RelayConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("Invalid server.bind_address")?;

    info!(
        port = config.server.port,
        bind = %config.server.bind_address,
        provider = %config.llm.provider,
        storage = ?config.storage.backend,
        "Starting ChatRelay"
    );

    let store = runtime::open_store(&config)?;
    let provider = runtime::build_provider(&config)?;
    let sender = runtime::build_sender(&config)?;
    let orchestrator = runtime::build_orchestrator(&config, store, provider, sender);
    let mailbox = ConversationMailbox::new(
        Arc::new(orchestrator),
        Duration::from_secs(config.server.mailbox_idle_secs),
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let whatsapp = WhatsAppAdapter::new(
        WhatsAppWebhookConfig {
            auth_token: config.twilio.auth_token.clone(),
            public_url: config.twilio.public_url.clone(),
            webhook_path: config.twilio.webhook_path.clone(),
            verify_signature: config.twilio.verify_signature,
        },
        inbound_tx,
    );
    whatsapp.start().await?;

    let pump = spawn_inbound_pump(inbound_rx, mailbox.clone());
    let app = build_router(GatewayState::new(mailbox), &[&whatsapp]);

    info!(
        webhook = %format!("{}{}", config.twilio.public_url.trim_end_matches('/'), config.twilio.webhook_path),
        "Registered WhatsApp webhook"
    );
    start_server(addr, app).await?;

    pump.abort();
    Ok(())
}

async fn simulate(config: &RelayConfig, from: &str, text: &str) -> Result<()> {
    let store = runtime::open_store(config)?;
    let provider = runtime::build_provider(config)?;
    let sender = Arc::new(MockSender::new());
    let orchestrator = runtime::build_orchestrator(config, store, provider, sender.clone());

    let outcome = orchestrator.handle_inbound_message(from, text).await?;

    if outcome.summarized {
        note_info("History was summarized for this turn");
    }
    if outcome.fallback_used {
        note_warn("Completion failed; the fallback reply was used");
    }
    for (to, body) in sender.sent() {
        println!("→ {to}: {body}");
    }
    Ok(())
}
