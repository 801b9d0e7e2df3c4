//! joinwatch - new-member monitor for chat-community channels
//!
//! Loads configuration, connects to a WebDriver endpoint, announces itself on
//! the operator channel and polls the configured channels until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use joinwatch_common::config::{
    load_or_default, resolve_config_path, write_toml_config, RootFolderInitializer,
    RootFolderResolver, TomlConfig,
};
use joinwatch_common::logging::{bootstrap_subscriber, build_filter, init_tracing};
use joinwatch_monitor::compose::{startup_report, StartupSummary};
use joinwatch_monitor::detection::DetectionPipeline;
use joinwatch_monitor::driver::{Page, WebDriverPage};
use joinwatch_monitor::identity::normalizer_for;
use joinwatch_monitor::matcher::PatternMatcher;
use joinwatch_monitor::notify::{ChannelNotifier, LogNotifier, Notification, Notifier};
use joinwatch_monitor::orchestrator::{PollOrchestrator, PollSettings};
use joinwatch_monitor::roster::{RosterExtractor, RosterTiming};
use joinwatch_monitor::store::JsonStateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "joinwatch", version, about = "Report newly joined members of watched channels")]
struct Cli {
    /// Config file (TOML)
    #[arg(long, env = "JOINWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the state file
    #[arg(long, env = "JOINWATCH_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// State file path (default: <root>/joinwatch-state.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// WebDriver endpoint
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log notifications instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a config file with default values
    InitConfig {
        /// Destination (default: ./joinwatch.toml)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Some(Command::InitConfig { path }) = &cli.command {
        let path = path.clone().unwrap_or_else(|| PathBuf::from("joinwatch.toml"));
        write_toml_config(&TomlConfig::default(), &path)
            .with_context(|| format!("Writing {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let bootstrap = bootstrap_subscriber(build_filter("info")?, std::io::stderr);
    let config = tracing::subscriber::with_default(bootstrap, || load_config(&cli))?;
    init_tracing(&config.logging)?;

    info!(
        "Starting joinwatch v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(cli.root_folder.clone())
        .with_toml_value(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;
    let state_path = initializer.state_path(cli.state_file.as_deref().or(config.state_file.as_deref()));
    info!("State file: {}", state_path.display());

    let matcher = match &config.monitor.join_patterns {
        Some(patterns) => PatternMatcher::new(patterns.as_slice()).context("Compiling monitor.join_patterns")?,
        None => PatternMatcher::default(),
    };
    let pattern_count = matcher.len();

    let notifier = build_notifier(&config, cli.dry_run)?;
    let store = Arc::new(JsonStateStore::new(state_path));
    let mut pipeline = DetectionPipeline::new(matcher, store, notifier.clone())
        .with_normalizer(normalizer_for(config.monitor.identity_normalization))
        .with_direct_messages(config.monitor.send_message_to_users);
    pipeline.load()?;

    let page = Arc::new(
        WebDriverPage::connect(&config.driver)
            .await
            .with_context(|| format!("Connecting to WebDriver at {}", config.driver.webdriver_url))?,
    );
    info!("✓ Browser session ready");

    let summary = StartupSummary {
        pattern_count,
        channel_count: config.monitor.channel_urls.len(),
        rate_limit_delay_seconds: config.monitor.rate_limit_delay_seconds,
        max_operations_per_hour: config.monitor.max_operations_per_hour,
        member_scan_enabled: config.monitor.member_scan_enabled,
    };
    if let Err(e) = notifier.send(&Notification::info(startup_report(&summary))).await {
        warn!("Startup announcement failed: {}", e);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Interrupted (Ctrl+C)");
            interrupt.cancel();
        }
    });

    let page_handle: Arc<dyn Page> = page.clone();
    let mut orchestrator = PollOrchestrator::new(
        page_handle,
        pipeline,
        RosterExtractor::new(RosterTiming::default()),
        PollSettings::from_config(&config.monitor),
        cancel,
    );

    let outcome = if cli.once {
        let reports = orchestrator.run_cycle().await;
        info!("Single cycle visited {} channel(s)", reports.len());
        orchestrator.pipeline().flush()
    } else {
        orchestrator.run().await
    };

    if let Err(e) = page.close().await {
        warn!("Closing browser session failed: {}", e);
    }
    outcome?;
    Ok(())
}

/// TOML file, then environment, then command line
fn load_config(cli: &Cli) -> Result<TomlConfig> {
    let path = resolve_config_path(cli.config.as_deref());
    let mut config = load_or_default(path.as_deref())?;
    config.apply_env_overrides();

    if let Some(url) = &cli.webdriver_url {
        config.driver.webdriver_url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_notifier(config: &TomlConfig, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run {
        info!("Dry run: notifications will be logged only");
        return Ok(Arc::new(LogNotifier));
    }
    if config.notify.bot_token.is_none() || config.notify.channel_id.is_none() {
        warn!("No bot token or operator channel configured; notifications will be logged only");
        return Ok(Arc::new(LogNotifier));
    }
    Ok(Arc::new(ChannelNotifier::new(&config.notify)?))
}
