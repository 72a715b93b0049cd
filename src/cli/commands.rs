//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;

use crate::browser::{BrowserSession, ChromeSessionFactory, SessionFactory};
use crate::config::Settings;
use crate::harvest::{PageHarvestController, WorkerSupervisor};
use crate::models::TargetPage;
use crate::server::{self, AppState};
use crate::session::{Authenticator, CredentialBundle, SessionBootstrapper};
use crate::store::{ChannelStore, SqliteChannelStore};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Incremental engagement harvester for social media pages")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to harvest.toml in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Run one supervised harvest over the configured pages
    Run {
        /// Number of parallel browser sessions (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Harvest only these pages (can be repeated)
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },

    /// Start the trigger API
    Serve {
        /// Address to bind
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
    },

    /// List harvested channels
    Channels,

    /// Open one browser session and check that the credentials authenticate
    CheckSession,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Run { workers, targets } => cmd_run(settings, workers, targets).await,
        Commands::Serve { bind } => cmd_serve(&settings, &bind).await,
        Commands::Channels => cmd_channels(&settings).await,
        Commands::CheckSession => cmd_check_session(&settings).await,
    }
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<SqliteChannelStore>> {
    let store = SqliteChannelStore::open(&settings.database)
        .await
        .with_context(|| format!("Failed to open {}", settings.database.display()))?;
    Ok(Arc::new(store))
}

fn load_credentials(settings: &Settings) -> anyhow::Result<Arc<CredentialBundle>> {
    let bundle = CredentialBundle::load(&settings.credentials).with_context(|| {
        format!(
            "Failed to load credentials from {}",
            settings.credentials.display()
        )
    })?;
    Ok(Arc::new(bundle))
}

fn build_supervisor(
    settings: &Settings,
    store: Arc<dyn ChannelStore>,
    targets: Vec<TargetPage>,
) -> anyhow::Result<WorkerSupervisor> {
    let harvester = PageHarvestController::from_settings(settings, store)?;
    let bootstrapper =
        SessionBootstrapper::from_file(settings.session.clone(), settings.credentials.clone());

    Ok(WorkerSupervisor::new(
        Arc::new(ChromeSessionFactory::new(settings.browser.clone())),
        Arc::new(bootstrapper),
        Arc::new(harvester),
        settings.supervisor.clone(),
        targets,
    ))
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    open_store(settings).await?;
    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database.display()
    );

    if settings.targets.is_empty() {
        println!(
            "{} No targets configured in harvest.toml",
            style("!").yellow()
        );
    }
    Ok(())
}

async fn cmd_run(
    mut settings: Settings,
    workers: Option<usize>,
    targets: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(workers) = workers {
        anyhow::ensure!(workers > 0, "--workers must be at least 1");
        settings.supervisor.workers = workers;
    }
    if !targets.is_empty() {
        settings.targets = targets;
    }

    let pages = settings.target_pages();
    if pages.is_empty() {
        println!("{} No target pages to harvest", style("!").yellow());
        return Ok(());
    }

    // Fail fast on an unreadable bundle; workers re-read it at bootstrap.
    load_credentials(&settings)?;
    let store = open_store(&settings).await?;
    let supervisor = build_supervisor(&settings, store, pages)?;

    let Some(summary) = supervisor.run().await else {
        anyhow::bail!("A harvest run is already in progress");
    };

    println!("\n{}", style("Harvest complete").bold());
    println!("  Pages:      {}", summary.pages);
    println!("  Harvested:  {}", style(summary.harvested).green());
    println!("  New posts:  {}", summary.appended);
    if summary.retried > 0 {
        println!("  Retried:    {}", summary.retried);
    }
    if summary.failed > 0 {
        println!("  Failed:     {}", style(summary.failed).red());
    }
    if summary.abandoned > 0 {
        println!("  Abandoned:  {}", style(summary.abandoned).red());
    }
    Ok(())
}

async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let store: Arc<dyn ChannelStore> = store;
    let supervisor = build_supervisor(settings, store.clone(), settings.target_pages())?;

    let state = AppState::new(Arc::new(supervisor), store);
    server::serve(state, bind).await
}

async fn cmd_channels(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let channels = store.list_channels().await?;

    if channels.is_empty() {
        println!("{} No channels harvested yet", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Channels").bold());
    println!("{}", "-".repeat(80));
    println!(
        "{:<24} {:>10} {:>8} {:<20}",
        "Handle", "Followers", "Posts", "Last scraped"
    );
    println!("{}", "-".repeat(80));
    for channel in channels {
        let last = channel
            .last_scraped
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24} {:>10} {:>8} {:<20}",
            channel.handle, channel.followers, channel.post_count, last
        );
        println!("  {}", style(&channel.url).dim());
    }
    Ok(())
}

async fn cmd_check_session(settings: &Settings) -> anyhow::Result<()> {
    let credentials = load_credentials(settings)?;
    println!(
        "{} Loaded {} credential cookies",
        style("→").cyan(),
        credentials.len()
    );

    let factory = ChromeSessionFactory::new(settings.browser.clone());
    let session = factory.open().await.context("Failed to open browser session")?;
    let bootstrapper = SessionBootstrapper::new(settings.session.clone(), credentials);

    let result = bootstrapper.authenticate(session.as_ref()).await;
    if let Err(e) = session.close().await {
        tracing::debug!("Session close failed: {}", e);
    }

    if result.context("Browser failed during authentication")? {
        println!("{} Session authenticated", style("✓").green());
        Ok(())
    } else {
        println!(
            "{} Session did not authenticate; export fresh cookies to {}",
            style("✗").red(),
            settings.credentials.display()
        );
        anyhow::bail!("authentication failed")
    }
}
