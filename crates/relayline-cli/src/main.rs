//! Command-line front end for Relayline.
//!
//! `relayline run` reads device output on stdin, one line per message, and
//! writes rendered commands to stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relayline_core::config::{BusBackend, Config, ConfigBuilder};
use relayline_core::logging;
use relayline_core::utils::spawn_and_log;
use relayline_engine::{
    CompiledResponse, RenderedCommand, Service, ServiceDefinition, ServiceOptions,
};

/// Prefix for configuration environment variables (`RELAYLINE__BUS__URL`, ...)
const ENV_PREFIX: &str = "RELAYLINE";

/// Relayline - bridge a device protocol onto a pub/sub bus.
#[derive(Parser, Debug)]
#[command(name = "relayline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true, env = "RELAYLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Service definition file, overrides `service.definition_file`
    #[arg(short, long, value_name = "FILE", global = true)]
    definition: Option<PathBuf>,

    /// Bus backend, overrides `bus.backend`
    #[arg(short, long, value_enum, global = true)]
    backend: Option<Backend>,

    /// Per-message diagnostics
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Bridge stdin/stdout to the bus (default)
    Run,
    /// Load the service definition, report loops and broken patterns
    Check,
    /// Publish one value on a channel and exit
    Publish {
        /// Target channel
        channel: String,
        /// Value to publish; omitted means null
        value: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Memory,
    Redis,
}

impl From<Backend> for BusBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Memory => BusBackend::Memory,
            Backend::Redis => BusBackend::Redis,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    logging::init_from_config(&config.logging, config.service.debug)
        .context("Failed to initialize logging")?;

    let definition = load_definition(Path::new(&config.service.definition_file))?;
    info!(
        "Loaded service {} ({} commands, {} responses)",
        definition.service_name,
        definition.service_commands.len(),
        definition.service_responses.len()
    );

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, definition).await,
        Command::Check => check(&config, definition),
        Command::Publish { channel, value } => publish(&config, definition, &channel, value).await,
    }
}

/// Build the configuration, then apply command-line overrides
fn load_config(args: &Args) -> Result<Config> {
    let mut builder = ConfigBuilder::new().with_environment_prefix(ENV_PREFIX);
    if let Some(path) = &args.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("Failed to load configuration")?;
    apply_overrides(&mut config, args);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(path) = &args.definition {
        config.service.definition_file = path.to_string_lossy().to_string();
    }
    if let Some(backend) = args.backend {
        config.bus.backend = backend.into();
    }
    if args.debug {
        config.service.debug = true;
    }
}

fn load_definition(path: &Path) -> Result<ServiceDefinition> {
    ServiceDefinition::from_file(path)
        .with_context(|| format!("Failed to load service definition {}", path.display()))
}

async fn connected_service(
    config: &Config,
    definition: ServiceDefinition,
    sink: Option<mpsc::UnboundedSender<RenderedCommand>>,
) -> Result<Service> {
    let broker = relayline_bus::from_config(&config.bus).context("Failed to create broker")?;
    let sink = sink.map(|tx| Arc::new(tx) as Arc<dyn relayline_engine::CommandSink>);
    let service = Service::new(definition, ServiceOptions::from(&config.service), broker, sink);
    service.start().await.context("Failed to start service")?;
    Ok(service)
}

async fn run(config: &Config, definition: ServiceDefinition) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = spawn_and_log("stdout-writer", write_commands(rx));

    let service = connected_service(config, definition, Some(tx)).await?;
    let listening = !service.channels().is_empty();

    tokio::select! {
        result = feed_lines(&service) => {
            result?;
            info!("Input closed");
            if listening {
                info!("Still forwarding commands, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    service.shutdown().await.context("Failed to shut down service")?;
    writer.abort();
    Ok(())
}

/// Publish every stdin line, terminator included
async fn feed_lines(service: &Service) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let published = service.publish(&line).await;
        debug!("{:?} produced {} messages", line, published);
    }
}

async fn write_commands(mut rx: mpsc::UnboundedReceiver<RenderedCommand>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(command) = rx.recv().await {
        stdout.write_all(command.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn check(config: &Config, definition: ServiceDefinition) -> Result<()> {
    let options = ServiceOptions::from(&config.service);
    let ServiceDefinition {
        service_name,
        service_commands,
        mut service_responses,
    } = definition;

    let prefix = options.flags.channel_prefix(&service_name);
    let report = relayline_engine::detect_pubsub_loops_with_prefix(
        &service_commands,
        &mut service_responses,
        prefix.as_deref(),
    );
    for removed in &report.removed {
        println!(
            "loop: response '{}' publishes on command channel {}",
            removed.display_name(),
            removed.channel
        );
    }

    let mut broken = 0;
    for response in service_responses {
        let name = response.display_name().to_string();
        if let Err(e) = CompiledResponse::try_compile(response, options.flags.supports_hex) {
            println!("invalid: response '{}': {}", name, e);
            broken += 1;
        }
    }

    println!(
        "{}: {} commands, {} responses removed, {} invalid",
        service_name,
        service_commands.len(),
        report.removed.len(),
        broken
    );

    if broken > 0 {
        bail!("{} response definitions never match", broken);
    }
    Ok(())
}

async fn publish(
    config: &Config,
    definition: ServiceDefinition,
    channel: &str,
    value: Option<String>,
) -> Result<()> {
    let service = connected_service(config, definition, None).await?;
    let result = service.publish_direct(channel, value).await;
    if let Err(e) = service.shutdown().await {
        warn!("Failed to shut down cleanly: {}", e);
    }
    result.with_context(|| format!("Failed to publish to {}", channel))
}
