use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use castcheck_core::RuleStore;
use castcheck_review::LlmModelClient;
use castcheck_server::{build_router, cli::Cli, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    let rules = RuleStore::load(&settings.rules_path)?;
    let model = LlmModelClient::new(settings.ai.clone())?;

    tracing::info!(
        rules = rules.len(),
        provider = %settings.ai.provider,
        model = %settings.ai.model,
        output_dir = %settings.output_dir.display(),
        dpi = settings.render_dpi,
        "configuration loaded"
    );

    let state = AppState::new(settings, rules, Arc::new(model)).with_http(cli.http_options());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    tracing::info!("castcheck listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("castcheck shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
