//! VAP skill CLI - run a skill against a VAP registry from the command line
//!
//! Runs the demo skill described by a config file, discovers registries and
//! sends one-off notifications and queries.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vap_core::{Capability, ClientCapabilitySet, RegistryHandle};
use vap_discovery::{Discovery, DiscoveryConfig, DiscoverySource};
use vap_skill::{DispatchEvent, Session, SkillBuilder, SkillConfig};
use vap_transport::UdpTransport;

mod demo;

/// VAP skill - register a skill with a voice assistant registry
#[derive(Parser)]
#[command(name = "vap-skill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "VAP_SKILL_CONFIG")]
    config: Option<PathBuf>,

    /// Registry address, `[coap://]host[:port][/path]`; skips discovery
    #[arg(short, long, global = true)]
    registry: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured skill until interrupted
    Run {
        /// NLU directory, overrides the config file
        #[arg(short, long)]
        nlu_dir: Option<PathBuf>,
    },

    /// Find a registry on the local network
    Discover {
        /// How long to wait for answers, in milliseconds
        #[arg(short, long, default_value = "2000")]
        timeout_ms: u64,

        /// Browse mDNS instead of the CoAP multicast group
        #[arg(long)]
        mdns: bool,
    },

    /// Register, push a text to a client, and close
    Notify {
        /// Client to notify
        client_id: String,

        /// Text to send
        text: String,
    },

    /// Register, query capabilities of a client, and close
    Query {
        /// Client to query
        client_id: String,

        /// Capability names to query
        #[arg(required = true)]
        capabilities: Vec<String>,
    },

    /// Show version and protocol info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    match &cli.command {
        Commands::Run { nlu_dir } => {
            run_skill(&cli, nlu_dir.clone(), &mut shutdown_rx).await?;
        }

        Commands::Discover { timeout_ms, mdns } => {
            discover(*timeout_ms, *mdns).await?;
        }

        Commands::Notify { client_id, text } => {
            let session = connect(&cli).await?;
            let set = ClientCapabilitySet::new(client_id, vec![Capability::text(text)]);
            let sent = session.notify(set).await;
            session.close().await.context("Teardown failed")?;
            sent.context("Notification failed")?;
            println!("{} Notified {}", "OK".green().bold(), client_id);
        }

        Commands::Query {
            client_id,
            capabilities,
        } => {
            let session = connect(&cli).await?;
            let set = ClientCapabilitySet::new(
                client_id,
                capabilities.iter().map(|name| Capability::new(name)).collect(),
            );
            let answer = session.query(set).await;
            session.close().await.context("Teardown failed")?;
            let answer = answer.context("Query failed")?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }

        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<SkillConfig> {
    let Some(path) = &cli.config else {
        bail!("No config file given; pass --config or set VAP_SKILL_CONFIG");
    };
    SkillConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn builder(cli: &Cli, config: &SkillConfig) -> Result<SkillBuilder> {
    let mut builder = SkillBuilder::from_config(config);
    if let Some(registry) = &cli.registry {
        builder = builder.registry(parse_registry(registry)?);
    }
    Ok(builder)
}

/// Build and register a session for a one-off command
async fn connect(cli: &Cli) -> Result<Session> {
    let config = load_config(cli)?;
    let session = builder(cli, &config)?
        .build()
        .await
        .context("Failed to resolve registry")?;
    session
        .register()
        .await
        .with_context(|| format!("Failed to register with {}", session.handle()))?;
    Ok(session)
}

async fn run_skill(
    cli: &Cli,
    nlu_dir: Option<PathBuf>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let config = load_config(cli)?;
    let mut builder = builder(cli, &config)?;
    if let Some(dir) = nlu_dir {
        builder = builder.nlu_dir(dir);
    }

    println!(
        "{} Starting skill {} ({})",
        "VAP".cyan().bold(),
        config.skill.name.green(),
        config.skill.id
    );

    let handler = demo::DemoSkill::new(config.responses.clone());
    let session = builder
        .start(handler)
        .await
        .context("Failed to start skill")?;

    println!(
        "{} Registered with {} (languages: {})",
        "OK".green().bold(),
        session.handle(),
        session
            .languages()
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut events = session
        .take_events()
        .context("Dispatch events already taken")?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Some(DispatchEvent::Stopped { reason }) => {
                    println!("{} {}", "STOPPED".red().bold(), reason);
                    break;
                }
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    session.close().await.context("Teardown failed")?;
    println!("{} Skill closed", "OK".green().bold());
    Ok(())
}

fn print_event(event: &DispatchEvent) {
    match event {
        DispatchEvent::Answered {
            request_id,
            request_type,
            client_id,
        } => println!(
            "{} {} #{} from {}",
            "ANSWERED".green(),
            request_type.as_str(),
            request_id,
            client_id
        ),
        DispatchEvent::Failed { request_id, error } => {
            println!("{} #{}: {}", "FAILED".red(), request_id, error)
        }
        DispatchEvent::SubscriptionLost => println!("{}", "Subscription lost".yellow()),
        DispatchEvent::Resubscribed { attempt } => {
            println!("{} (attempt {})", "Resubscribed".green(), attempt)
        }
        DispatchEvent::Stopped { reason } => println!("{} {}", "STOPPED".red().bold(), reason),
    }
}

async fn discover(timeout_ms: u64, mdns: bool) -> Result<()> {
    let config = DiscoveryConfig {
        source: if mdns {
            DiscoverySource::Mdns
        } else {
            DiscoverySource::Multicast
        },
        timeout: Duration::from_millis(timeout_ms),
        ..Default::default()
    };

    let transport = UdpTransport::bind("0.0.0.0:0")
        .await
        .context("Failed to bind UDP socket")?;
    let handle = Discovery::with_config(config)
        .discover(&transport)
        .await
        .context("No registry found")?;

    println!("{} Registry at {}", "OK".green().bold(), handle);
    Ok(())
}

/// Parse `[coap://]host[:port][/path]`; IPv6 hosts go in brackets
fn parse_registry(s: &str) -> Result<RegistryHandle> {
    let rest = s.strip_prefix("coap://").unwrap_or(s);
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, path),
        None => (rest, vap_core::DEFAULT_BASE_PATH),
    };

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .with_context(|| format!("Unclosed '[' in registry address {:?}", s))?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        bail!("Missing host in registry address {:?}", s);
    }
    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .with_context(|| format!("Invalid port in registry address {:?}", s))?,
        None => vap_core::DEFAULT_PORT,
    };

    Ok(RegistryHandle::new(host, path).with_port(port))
}

fn print_info() {
    println!("{}", "VAP - Voice Assistant Protocol skill".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Protocol:   {}", vap_core::VAP_VERSION);
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!();
    println!("{}", "Discovery:".green());
    println!(
        "  - CoAP multicast {}:{} ({}?rt={})",
        vap_core::DISCOVERY_MULTICAST_ADDR,
        vap_core::DEFAULT_PORT,
        vap_core::WELL_KNOWN_CORE,
        vap_core::REGISTRY_RESOURCE_TYPE
    );
    println!("  - mDNS {} (feature `mdns`)", vap_core::MDNS_SERVICE_TYPE);
    println!();
    println!("{}", "Examples:".green());
    println!("  vap-skill -c demos/hello.toml run             # Run the demo skill");
    println!("  vap-skill discover                            # Find a registry");
    println!("  vap-skill -c demos/hello.toml notify c1 hi    # Push a text to client c1");
    println!("  vap-skill -c demos/hello.toml query c1 volume # Query a capability");
}
