use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use market_auth::auth::{AuthManager, RefreshScheduler};
use market_auth::config::{resolve_otp, Command, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    config.validate()?;

    match config.command.clone() {
        Command::Register { args } => register(&config, &args).await,
        Command::Run => run(&config).await,
    }
}

/// One-shot registration; the daemon picks the tokens up from disk
async fn register(config: &Config, args: &[String]) -> Result<()> {
    println!("Repo: {}", config.working_dir.display());

    let otp = resolve_otp(args)?;

    let auth_manager = AuthManager::new(
        &config.market_uri,
        &config.working_dir,
        config.http_timeout(),
    )
    .context("market auth")?;

    auth_manager
        .register(&otp)
        .await
        .context("error registering appliance")?;

    println!("successfully registered as a market appliance. you can now restart in daemon mode.");

    Ok(())
}

/// Keep tokens fresh until Ctrl+C or SIGTERM
async fn run(config: &Config) -> Result<()> {
    tracing::info!("Market auth starting against {}", config.market_uri);

    let auth_manager = Arc::new(
        AuthManager::new(
            &config.market_uri,
            &config.working_dir,
            config.http_timeout(),
        )
        .context("Failed to load market tokens")?,
    );

    let tokens = auth_manager.current().await;
    if tokens.is_registered() {
        tracing::info!(
            "✅ Market tokens loaded (expires: {})",
            tokens.expires.to_rfc3339()
        );
    } else {
        tracing::warn!("No market tokens found; run `market-auth register <OTP>` first");
    }

    let handle = RefreshScheduler::new(
        auth_manager.clone(),
        config.poll_interval(),
        config.refresh_threshold(),
    )
    .spawn(CancellationToken::new());

    shutdown_signal().await;

    handle.shutdown().await;
    tracing::info!("👋 Shutdown complete");

    Ok(())
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
