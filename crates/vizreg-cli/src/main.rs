//! vizreg CLI - visual regression snapshots from anywhere
//!
//! Usage:
//!   vizreg init                                   Write a default .vizreg.toml
//!   vizreg run --server <url> --assets-dir <dir>  Snapshot pages of a running site
//!   vizreg discover <url>                         Print the resources a page needs
//!   vizreg agent-snapshot <url> --name <name>     Snapshot through the local agent

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vizreg_browser::BrowserSession;
use vizreg_client::{global, AgentClient, VisualClient};
use vizreg_core::config::TOKEN_ENV;
use vizreg_core::{LoaderKind, SnapshotOptions, VizregConfig};
use vizreg_loaders::{CurlFetcher, Loader, NativeLoader};

#[derive(Parser)]
#[command(name = "vizreg")]
#[command(author, version, about = "Visual regression snapshots for any web app")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root holding .vizreg.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .vizreg.toml
    Init,

    /// Snapshot pages of a running site against its compiled assets
    Run {
        /// Base URL of the running site
        #[arg(long)]
        server: String,

        /// Directory of compiled static assets
        #[arg(long)]
        assets_dir: PathBuf,

        /// URL prefix the assets are served under
        #[arg(long)]
        base_url: Option<String>,

        /// Page path to snapshot (repeatable)
        #[arg(long = "path", required = true)]
        paths: Vec<String>,

        /// Widths to render at, comma separated
        #[arg(long, value_delimiter = ',')]
        widths: Vec<u32>,
    },

    /// Print the resources a snapshot of a page would include
    Discover {
        /// Page URL
        url: String,

        /// Extra asset hostname to allow (repeatable)
        #[arg(long = "asset-host")]
        asset_hosts: Vec<String>,

        /// Include same-origin iframe documents
        #[arg(long)]
        iframes: bool,
    },

    /// Snapshot a page through the local agent
    AgentSnapshot {
        /// Page URL
        url: String,

        /// Snapshot name
        #[arg(long)]
        name: String,

        /// Widths to render at, comma separated
        #[arg(long, value_delimiter = ',')]
        widths: Vec<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = VizregConfig::load_or_default(&cli.root)
        .context("Failed to load configuration")?
        .apply_env();

    match cli.command {
        Commands::Init => cmd_init(cli.root).await,
        Commands::Run {
            server,
            assets_dir,
            base_url,
            paths,
            widths,
        } => cmd_run(config, server, assets_dir, base_url, paths, widths).await,
        Commands::Discover {
            url,
            asset_hosts,
            iframes,
        } => cmd_discover(config, url, asset_hosts, iframes).await,
        Commands::AgentSnapshot { url, name, widths } => {
            cmd_agent_snapshot(config, url, name, widths).await
        }
    }
}

async fn cmd_init(root: PathBuf) -> Result<()> {
    let path = VizregConfig::write_default(&root).context("Failed to write configuration")?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn cmd_run(
    mut config: VizregConfig,
    server: String,
    assets_dir: PathBuf,
    base_url: Option<String>,
    paths: Vec<String>,
    widths: Vec<u32>,
) -> Result<()> {
    if config.token.is_none() {
        bail!("{} must be set to upload snapshots", TOKEN_ENV);
    }
    if !assets_dir.is_dir() {
        bail!("Assets directory {} does not exist", assets_dir.display());
    }

    config.loader.kind = Some(LoaderKind::Filesystem);
    config.loader.asset_path = Some(assets_dir);
    if base_url.is_some() {
        config.loader.base_url = base_url;
    }
    let loader = Loader::from_settings(&config.loader, None, Arc::new(CurlFetcher::new()))
        .context("Failed to configure loader")?;
    let client = VisualClient::from_config(&config, loader).context("Failed to create client")?;
    global::install(client).await;

    if global::initialize_build().await?.is_none() {
        println!("Visual snapshots are disabled; nothing to do");
        global::reset().await;
        return Ok(());
    }

    let session = BrowserSession::launch()
        .await
        .context("Failed to launch headless Chrome")?;
    for path in &paths {
        let url = page_url(&server, path);
        info!("Snapshotting {}", url);
        session
            .navigate(&url)
            .await
            .with_context(|| format!("Failed to load {}", url))?;

        let mut options = SnapshotOptions::named(path.as_str());
        if !widths.is_empty() {
            options = options.with_widths(widths.clone());
        }
        let taken = global::snapshot(&session, options).await?;
        debug!("Snapshot {} submitted: {}", path, taken);
    }
    session.close().await?;

    let build = global::finalize_build().await?;
    global::reset().await;

    match build.and_then(|b| b.web_url) {
        Some(web_url) => {
            println!("Done! Snapshots are now processing.");
            println!("--> {}", web_url);
        }
        None => println!("Done. No build was finalized."),
    }
    Ok(())
}

async fn cmd_discover(
    config: VizregConfig,
    url: String,
    asset_hosts: Vec<String>,
    iframes: bool,
) -> Result<()> {
    let mut hosts = config.loader.asset_hostnames.clone();
    if !asset_hosts.is_empty() {
        hosts.get_or_insert_with(Vec::new).extend(asset_hosts);
    }
    let loader = NativeLoader::new(Arc::new(CurlFetcher::new()))
        .with_asset_hostnames(hosts)
        .with_iframes(iframes || config.loader.include_iframes);

    let session = BrowserSession::launch()
        .await
        .context("Failed to launch headless Chrome")?;
    session
        .navigate(&url)
        .await
        .with_context(|| format!("Failed to load {}", url))?;

    let resources = loader
        .snapshot_resources(&session, &Default::default())
        .await
        .context("Resource discovery failed")?;
    session.close().await?;

    let descriptors: Vec<_> = resources.iter().map(|r| r.descriptor()).collect();
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

async fn cmd_agent_snapshot(
    config: VizregConfig,
    url: String,
    name: String,
    widths: Vec<u32>,
) -> Result<()> {
    let agent = AgentClient::from_config(&config.agent)?;
    if !agent.is_agent_running().await {
        bail!("No compatible snapshot agent at {}", agent.base_url());
    }

    let session = BrowserSession::launch()
        .await
        .context("Failed to launch headless Chrome")?;
    session
        .navigate(&url)
        .await
        .with_context(|| format!("Failed to load {}", url))?;

    let mut options = SnapshotOptions::named(name.as_str());
    if !widths.is_empty() {
        options = options.with_widths(widths);
    }
    let taken = agent.snapshot(&session, &options).await?;
    session.close().await?;

    if taken {
        println!("Snapshot {} sent to agent", name);
        Ok(())
    } else {
        bail!("Agent did not accept snapshot {}", name)
    }
}

/// Join a server base URL and a page path with exactly one slash
fn page_url(server: &str, path: &str) -> String {
    format!(
        "{}/{}",
        server.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
