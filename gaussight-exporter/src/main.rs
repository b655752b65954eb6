//! Prometheus exporter for GaussDB and PostgreSQL-compatible databases.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use gaussight_common::init_tracing;
use gaussight_exporter::{DefinitionRegistry, ExporterConfig, HttpServer, PgTarget, Scraper};

/// Prometheus exporter for GaussDB.
#[derive(Parser, Debug)]
#[command(name = "gaussight-exporter")]
#[command(about = "Export GaussDB statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Query definition file or directory (overrides config).
    #[arg(short, long)]
    queries: Option<String>,

    /// Load and print the query definitions, then exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(queries) = args.queries {
        config.queries.path = Some(queries.into());
    }

    init_tracing(&config.logging)?;

    let queries_path = config
        .queries
        .path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No query definition path configured"))?;
    let registry = Arc::new(DefinitionRegistry::from_path(&queries_path)?);
    let table = registry.snapshot();

    if args.dry_run {
        let specs: serde_json::Map<String, serde_json::Value> = table
            .iter()
            .map(|def| -> serde_json::Result<(String, serde_json::Value)> {
                Ok((def.name().to_string(), serde_json::to_value(def.spec())?))
            })
            .collect::<serde_json::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    info!(
        definitions = table.len(),
        path = %queries_path.display(),
        "Starting GaussDB exporter"
    );

    let target = Arc::new(PgTarget::new(&config.target)?);
    let scraper = Arc::new(Scraper::new(target, registry.clone(), &config));

    if let Err(e) = scraper.refresh_server_info().await {
        warn!(error = %e, "Target not reachable at startup");
    }

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(
        scraper.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_shutdown(&registry).await;

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = scraper.stats();
    info!(
        scrapes = stats.scrapes_total,
        succeeded = stats.scrapes_succeeded,
        query_failures = stats.query_failures_total,
        sample_errors = stats.sample_errors_total,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Block until SIGINT or SIGTERM. SIGHUP reloads the query definitions.
#[cfg(unix)]
async fn wait_for_shutdown(registry: &DefinitionRegistry) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sighup) =
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => (term, hup),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Cannot install signal handlers, only Ctrl+C is handled");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
                return;
            }
        };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                return;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                return;
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading query definitions");
                match registry.reload() {
                    Ok(table) => info!(definitions = table.len(), "Query definitions reloaded"),
                    Err(e) => error!(error = %e, "Failed to reload query definitions"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_registry: &DefinitionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Received Ctrl+C, shutting down...");
}
