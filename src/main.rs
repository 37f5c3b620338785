//! PocketPaw CLI entry point.

use clap::Parser;
use pocketpaw::app::App;
use pocketpaw::config::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pocketpaw", version)]
#[command(about = "On-device AI agent host with a web dashboard")]
struct Cli {
    /// Run the Telegram channel (headless)
    #[arg(long)]
    telegram: bool,

    /// Run the Discord channel (headless)
    #[arg(long)]
    discord: bool,

    /// Run the Slack channel (headless)
    #[arg(long)]
    slack: bool,

    /// Run the WhatsApp channel (headless)
    #[arg(long)]
    whatsapp: bool,

    /// Dashboard port (default 8888; falls back to a free port when busy)
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn requested_channels(&self) -> Vec<String> {
        let mut channels = Vec::new();
        if self.telegram {
            channels.push("telegram".to_string());
        }
        if self.discord {
            channels.push("discord".to_string());
        }
        if self.slack {
            channels.push("slack".to_string());
        }
        if self.whatsapp {
            channels.push("whatsapp".to_string());
        }
        channels
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "pocketpaw=debug,info"
    } else {
        "pocketpaw=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let mut settings = Settings::load()?;
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let channels = cli.requested_channels();
    let app = App::new(settings)?;

    // Fail fast on unconfigured channels before binding anything.
    app.start_channels(&channels).await?;

    let port = pocketpaw::api::find_free_port(app.settings.port)?;
    if port != app.settings.port {
        tracing::info!(
            requested = app.settings.port,
            actual = port,
            "default port busy, using a free one"
        );
    }

    let bind: std::net::SocketAddr = ([127, 0, 0, 1], port).into();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = pocketpaw::api::start_http_server(bind, app.api_state(), shutdown_rx).await?;

    if channels.is_empty() {
        tracing::info!("dashboard available at http://{bind}");
    } else {
        tracing::info!(?channels, "running headless channels");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    let _ = shutdown_tx.send(true);
    app.shutdown().await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server).await;

    Ok(())
}
