// ABOUTME: Entry point for the watchtower service.
// ABOUTME: Parses flags, wires engine, resolver, scheduler and HTTP API, and maps failures to exit codes.

use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use watchtower::api;
use watchtower::app::{App, RunOptions};
use watchtower::cli::Cli;
use watchtower::config::Config;
use watchtower::engine::Engine;
use watchtower::error::Result;
use watchtower::notify::LogNotifier;
use watchtower::resolver::{DigestLookup, DockerCredentials, ImageResolver, RegistryClient};
use watchtower::runtime::BollardRuntime;
use watchtower::scheduler;
use watchtower::session::Trigger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_cli(cli)?;

    let runtime = BollardRuntime::connect(&config.connect_options())?;
    runtime.ping(&config.host).await?;

    let digests: Arc<dyn DigestLookup> = Arc::new(RegistryClient::new(config.registry_timeout)?);
    let resolver = ImageResolver::new(
        Arc::new(DockerCredentials::from_env()),
        Some(digests),
        config.warn_on_head_failure,
    );
    let engine = Engine::new(Arc::new(runtime), resolver, config.engine.clone());
    let (params, description) = config.update_params();
    let app = Arc::new(App::new(engine, params, Arc::new(LogNotifier::new())));

    app.prepare(&config.scope).await?;
    log_startup(&config, &description);

    if config.run_once {
        let result = app.run_queued(Trigger::Startup, RunOptions::default()).await;
        app.wait_idle().await;
        result?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let server = if config.api.enabled() {
        let listener = TcpListener::bind(("0.0.0.0", config.api_port)).await?;
        let router = api::router(Arc::clone(&app), &config.api);
        Some(tokio::spawn(api::serve(listener, router, shutdown.clone())))
    } else {
        None
    };

    if config.scheduler_enabled() {
        scheduler::run(&config.schedule, shutdown.clone(), || {
            let app = Arc::clone(&app);
            async move {
                app.run_scheduled().await;
            }
        })
        .await;
    } else {
        shutdown.cancelled().await;
    }

    tracing::info!("Waiting for running update to be finished...");
    app.wait_idle().await;

    if let Some(server) = server {
        match server.await {
            Ok(result) => result?,
            Err(e) => tracing::warn!("HTTP API task failed: {}", e),
        }
    }
    Ok(())
}

fn log_startup(config: &Config, filter_description: &str) {
    if !config.startup_message {
        return;
    }

    tracing::info!("Watchtower {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("{}", filter_description);

    if config.run_once {
        tracing::info!("Running a one time update.");
    } else if config.scheduler_enabled() {
        let now = Utc::now();
        match config.schedule.next_after(now) {
            Some(next) => {
                let until = (next - now).to_std().unwrap_or_default();
                tracing::info!(schedule = %config.schedule, "Scheduling first run: {}", next);
                tracing::info!(
                    "Note that the first check will be performed in {}",
                    humantime::format_duration(std::time::Duration::from_secs(until.as_secs()))
                );
            }
            None => tracing::warn!(schedule = %config.schedule, "Schedule never fires"),
        }
    } else {
        tracing::info!("Periodic runs are not enabled.");
    }

    if config.api.update {
        tracing::info!(port = config.api_port, "The HTTP API is enabled.");
    }
}

async fn watch_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Failed to create SIGTERM handler: {}", e);
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    tracing::info!("Got stop signal. Exiting...");
    shutdown.cancel();
}
