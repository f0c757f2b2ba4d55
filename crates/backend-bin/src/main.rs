use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use foundation_backend_lib::{
    auth::hash_password_with,
    config::Settings,
    router::create_router,
    storage::{FlatFileStorage, UserStore},
    AppState,
};
use foundation_common::NewUser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

/// Environment variable `add-user` reads the new password from
const PASSWORD_ENV: &str = "FOUNDATION_PASSWORD";

#[derive(Parser)]
#[command(name = "foundation", version, about = "Foundation admin backend")]
struct Cli {
    /// TOML config file; defaults to ./foundation.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Emit logs as JSON lines
        #[arg(long)]
        log_json: bool,
    },
    /// Create a user; the password is read from FOUNDATION_PASSWORD
    AddUser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Command::Serve { bind, log_json } => {
            init_tracing(&settings.log_level, log_json);
            if let Some(bind) = bind {
                settings.bind_addr = bind;
            }
            serve(settings).await
        },
        Command::AddUser {
            username,
            display_name,
        } => {
            init_tracing(&settings.log_level, false);
            add_user(settings, username, display_name).await
        },
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let storage = Arc::new(
        FlatFileStorage::new(&settings.data_dir)
            .with_context(|| format!("opening data dir {}", settings.data_dir.display()))?,
    );
    let addr = settings.bind_addr;

    let state = AppState::new(storage, settings)?;
    let sweeps = state.spawn_background_tasks();
    let shutdown = state.shutdown.clone();

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    // Streams and sweeps watch the same token
    shutdown.cancel();
    for sweep in sweeps {
        if let Err(e) = sweep.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    info!("shut down");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, cancelling `shutdown` so open streams end
/// and the server can drain.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown requested");
    shutdown.cancel();
}

async fn add_user(
    settings: Settings,
    username: String,
    display_name: String,
) -> anyhow::Result<()> {
    let password = Zeroizing::new(
        std::env::var(PASSWORD_ENV).with_context(|| format!("{PASSWORD_ENV} is not set"))?,
    );
    if password.is_empty() {
        bail!("{PASSWORD_ENV} is empty");
    }

    let storage = FlatFileStorage::new(&settings.data_dir)
        .with_context(|| format!("opening data dir {}", settings.data_dir.display()))?;
    let params = settings.password;
    let hashed_password =
        tokio::task::spawn_blocking(move || hash_password_with(&password, params)).await??;

    let user = storage
        .insert_user(NewUser {
            user_name: username,
            display_name,
            hashed_password,
        })
        .await?;
    info!(user_id = user.id, user_name = %user.user_name, "user created");
    Ok(())
}
