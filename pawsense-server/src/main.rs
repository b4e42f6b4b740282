// PawSense - dog emotion monitor
// Camera or uploads in, dashboard and chat alerts out

use anyhow::Context;
use clap::Parser;
use pawsense_core::PawsenseConfig;
use pawsense_server::dispatcher::JOB_TIMEOUT;
use pawsense_server::logging::init_logging;
use pawsense_server::monitor::{spawn_digest_task, DIGEST_CHECK_PERIOD};
use pawsense_server::{
    bot, create_router, spawn_dispatcher, vision, AppContext, DispatchHandle, ServiceMetrics,
    TelegramNotifier,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "pawsense-server", version, about = "Dog emotion monitor with dashboard and chat alerts")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Camera index for real-time monitoring
    #[arg(long)]
    camera: Option<u32>,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.check {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let _log_guard = init_logging(&config.logging);
    info!("🚀 Starting PawSense...");

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(ServiceMetrics::new());

    info!("🧠 Loading vision models...");
    let vision = vision::load(&config);

    let telegram = TelegramNotifier::from_config(&config.telegram);
    let (alerts, dispatcher_task) = match &telegram {
        Some(client) => {
            match client.get_me().await {
                Ok(username) => info!("✅ Telegram bot ready: @{}", username),
                Err(e) => warn!("⚠️  Telegram bot check failed, alerts may not be delivered: {}", e),
            }
            let (handle, task) = spawn_dispatcher(
                Arc::new(client.clone()),
                metrics.clone(),
                shutdown.child_token(),
                JOB_TIMEOUT,
            );
            (handle, Some(task))
        }
        None => {
            warn!("⚠️  Telegram credentials missing: chat alerts and commands are disabled");
            (DispatchHandle::disabled(), None)
        }
    };

    let ctx = AppContext::new(config, vision, alerts.clone(), metrics, shutdown.clone());
    info!("🔑 Chat connection code: {}", ctx.authorizer.lock().code());

    let mut background = Vec::new();
    if let Some(task) = dispatcher_task {
        background.push(task);
    }
    if let Some(client) = telegram {
        background.push(spawn_digest_task(
            ctx.coordinator.clone(),
            alerts,
            shutdown.child_token(),
            DIGEST_CHECK_PERIOD,
        ));
        background.push(bot::spawn_bot(client, ctx.clone(), shutdown.child_token()));
    }

    let http_server = start_http_server(ctx.clone()).await?;

    wait_for_shutdown().await;

    info!("🛑 Shutting down...");
    ctx.shutdown().await;
    for task in background {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }
    if let Err(e) = http_server.await {
        error!("HTTP server task failed: {}", e);
    }
    info!("👋 PawSense stopped");
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<PawsenseConfig> {
    let mut config = PawsenseConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(camera) = cli.camera {
        config.camera.index = camera;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Bind and serve until the shutdown token fires
async fn start_http_server(ctx: AppContext) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", ctx.config.server.host, ctx.config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let shutdown = ctx.shutdown.clone();
    let app = create_router(ctx);

    info!("🌐 Dashboard listening on http://{}", addr);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("HTTP server failed: {}", e);
        }
    }))
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("🛑 Shutdown signal received");
}
