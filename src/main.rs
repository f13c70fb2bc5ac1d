use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcpwire_lib::audit::start_audit_server;
use mcpwire_lib::client::{ClientEvent, McpClient};
use mcpwire_lib::config::{self, McpConfig};
use mcpwire_lib::engine::ServerEvent;
use mcpwire_lib::models::Message;
use mcpwire_lib::protocol::validate;
use mcpwire_lib::server::McpServer;
use mcpwire_lib::structure::run_checks;

#[derive(Parser, Debug)]
#[command(
    name = "mcpwire",
    author,
    version,
    about = "Development event protocol server and tools",
    long_about = "Observes a front-end app over WebSocket, keeps its project context and action log, and checks project structure"
)]
struct Cli {
    /// Config file (defaults to ~/.mcpwire/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the WebSocket server (and the audit HTTP surface when enabled)
    Serve(ServeArgs),
    /// Check a project tree and/or a single message
    Validate(ValidateArgs),
    /// Send one message to a running server and print the reply
    Send(SendArgs),
    /// Write a config file with the defaults
    InitConfig(InitConfigArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Run the structure check against this directory at startup
    #[arg(long)]
    project_root: Option<PathBuf>,
    #[arg(long)]
    audit_port: Option<u16>,
    /// Do not start the audit HTTP surface
    #[arg(long)]
    no_audit: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Project directory to check
    #[arg(long)]
    root: Option<PathBuf>,
    /// Message as a JSON string
    #[arg(long)]
    message: Option<String>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Message as a JSON string
    message: String,
    #[arg(long)]
    url: Option<String>,
    /// How long to wait for the reply
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    // Respects RUST_LOG, defaults to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let result = match cli.command {
        Commands::Serve(args) => handle_serve(config_path.as_deref(), args).await,
        Commands::Validate(args) => handle_validate(config_path.as_deref(), args),
        Commands::Send(args) => handle_send(config_path.as_deref(), args).await,
        Commands::InitConfig(args) => handle_init_config(config_path.as_deref(), args),
    };

    if let Err(err) = result {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

fn load(path: Option<&Path>) -> Result<McpConfig> {
    let loaded = match path {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    loaded.context("Failed to load configuration")
}

async fn handle_serve(config_path: Option<&Path>, args: ServeArgs) -> Result<()> {
    let mut config = load(config_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(root) = args.project_root {
        config.audit.project_root = root.clone();
        config.server.project_root = Some(root);
    }
    if let Some(port) = args.audit_port {
        config.audit.port = port;
    }
    if args.no_audit {
        config.audit.enabled = false;
    }

    let mut server = McpServer::new(config.server.clone());
    let mut events = server.subscribe();
    server
        .start()
        .await
        .context("Failed to start the MCP server")?;

    let cancel = CancellationToken::new();
    let audit = if config.audit.enabled {
        let (_, task) = start_audit_server(&config.audit, cancel.clone())
            .await
            .context("Failed to start the audit server")?;
        Some(task)
    } else {
        None
    };

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ServerEvent::ActionProcessed(entry) = event {
                log::info!("Action {} ({})", entry.kind, entry.id);
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    log::info!("Shutting down");

    server.stop().await;
    cancel.cancel();
    if let Some(task) = audit {
        let _ = task.await;
    }
    Ok(())
}

fn handle_validate(config_path: Option<&Path>, args: ValidateArgs) -> Result<()> {
    if args.root.is_none() && args.message.is_none() {
        bail!("Nothing to validate: pass --root and/or --message");
    }
    let config = load(config_path)?;
    let mut failed = false;

    if let Some(root) = args.root {
        let warnings = run_checks(&root, &config.server.structure);
        if warnings.is_empty() {
            println!("Structure OK: {}", root.display());
        } else {
            failed = true;
            println!("Structure problems in {}:", root.display());
            for warning in &warnings {
                println!("  - {}", warning);
            }
        }
    }

    if let Some(message) = args.message {
        let value: serde_json::Value =
            serde_json::from_str(&message).context("Message is not valid JSON")?;
        let report = validate(&value, &config.server.validation);
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
        failed |= !report.is_valid;
    }

    if failed {
        bail!("Validation failed");
    }
    Ok(())
}

async fn handle_send(config_path: Option<&Path>, args: SendArgs) -> Result<()> {
    let mut config = load(config_path)?;
    if let Some(url) = args.url {
        config.client.url = url;
    }

    let message: Message = serde_json::from_str(&args.message).context("Invalid message")?;
    let client = McpClient::new(config.client);
    let mut events = client.subscribe();

    client.send(message).context("Failed to queue message")?;
    client.start().context("Failed to start client")?;

    let reply = tokio::time::timeout(Duration::from_millis(args.timeout_ms), async {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Message(value) => return Ok(value),
                ClientEvent::MaxAttemptsReached { attempts } => {
                    bail!("Gave up after {} connection attempts", attempts)
                }
                _ => {}
            }
        }
        bail!("Client stopped before a reply arrived")
    })
    .await;

    client.shutdown().await;

    let reply = reply.context("Timed out waiting for a reply")??;
    println!(
        "{}",
        serde_json::to_string_pretty(&reply).context("Failed to encode reply")?
    );
    Ok(())
}

fn handle_init_config(config_path: Option<&Path>, args: InitConfigArgs) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::get_config_path()?,
    };
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    config::save_config_to(&McpConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
