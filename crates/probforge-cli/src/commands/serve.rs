//! The `probforge serve` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use probforge_core::VariantGateway;
use probforge_server::{router, AppState, StateOptions};

pub async fn execute(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    database_url: Option<String>,
) -> Result<()> {
    let mut config = probforge_providers::load_config_from(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    // Fail before binding when generation cannot work.
    let provider = config
        .generation_provider()
        .context("invalid generation configuration")?;
    let store = super::open_store(&config, database_url).await?;

    let gateway = Arc::new(VariantGateway::new(provider, config.gateway_settings()));
    let state = AppState::new(
        store,
        gateway,
        StateOptions {
            delete_policy: config.delete_policy,
            retry: config.generation_retry(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        provider = %config.default_provider,
        model = %config.default_model,
        "probforge API listening"
    );

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        return Err(e.into());
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
