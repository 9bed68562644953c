/// Orb Server - range streaming and listen parties
use clap::{Parser, Subcommand};
use orb_core::UserId;
use orb_server::{
    api,
    config::ServerConfig,
    services::{AuthService, LocalObjectStore, SqliteCatalog},
    state::AppState,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orb-server")]
#[command(about = "Orb audio streaming and listen party server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long, env = "ORB_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print a bearer token for local testing
    IssueToken {
        /// User ID placed in the token subject
        #[arg(short, long)]
        user_id: String,
        /// Display name shown to listen party guests
        #[arg(short, long)]
        name: Option<String>,
        /// Configuration file path
        #[arg(short, long, env = "ORB_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orb_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            serve(load_config(config)?).await?;
        }
        Commands::IssueToken {
            user_id,
            name,
            config,
        } => {
            issue_token(&load_config(config)?, &user_id, name.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    let config = ServerConfig::load_from(path.as_deref())?;
    config.validate()?;
    Ok(config)
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting Orb server"
    );

    // Initialize catalog
    let catalog = SqliteCatalog::connect(&config.storage.database_url).await?;
    tracing::info!("Catalog connected");

    // Initialize object store
    let store = LocalObjectStore::new(config.storage.object_store_path.clone());
    store.initialize().await?;
    tracing::info!(path = %store.base_path().display(), "Object store initialized");

    let auth_service = Arc::new(AuthService::new(
        config.auth.jwt_secret.clone(),
        config.auth.jwt_expiration_hours,
    ));

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let app_state = AppState::new(
        Arc::new(config),
        auth_service,
        Arc::new(catalog),
        Arc::new(store),
    );
    let app = api::router(app_state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn issue_token(config: &ServerConfig, user_id: &str, name: Option<&str>) -> anyhow::Result<()> {
    let auth_service = AuthService::new(
        config.auth.jwt_secret.clone(),
        config.auth.jwt_expiration_hours,
    );
    let token = auth_service.issue(&UserId::new(user_id), name)?;
    println!("{}", token);
    Ok(())
}
