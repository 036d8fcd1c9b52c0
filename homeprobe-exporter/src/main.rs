//! Environmental sensor exporter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use homeprobe_exporter::demo::{
    DemoAirQualitySensor, DemoBeacon, DemoClimateSensor, DemoCo2Sensor, feed_beacon,
};
use homeprobe_exporter::{
    BeaconHandler, EnvironmentGauges, EnvironmentPoller, ExporterConfig, HttpServer,
};
use homeprobe_metrics::MetricSet;

/// Seconds between demo beacon advertisements.
const DEMO_ADVERTISE_INTERVAL: Duration = Duration::from_secs(5);

/// Prometheus exporter for environmental sensors.
#[derive(Parser, Debug)]
#[command(name = "homeprobe-exporter")]
#[command(about = "Export environmental sensor readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // CLI overrides
    if let Some(listen) = args.listen {
        config.http.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if config.demo && config.beacon.device_id.is_empty() {
        config.beacon.device_id = "demo".to_string();
    }
    config.validate()?;

    homeprobe_common::init_tracing(&config.logging)?;

    info!(demo = config.demo, "Starting homeprobe exporter");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Build the registry
    let mut set = MetricSet::new();
    let gauges = EnvironmentGauges::register(&mut set);
    let metrics = Arc::new(set);
    let base_labels = config.base_labels();

    // Parse listen address
    let listen_addr = config
        .http
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut ready_at = Instant::now();

    // Start sensor poller
    if config.poller.enabled {
        let mut poller = EnvironmentPoller::new(
            gauges.clone(),
            &base_labels,
            config.site.clone(),
            &config.poller,
        );
        if config.demo {
            poller = poller
                .with_climate_sensor(Box::new(DemoClimateSensor::new()))
                .with_air_quality_sensor(Box::new(DemoAirQualitySensor::new()))
                .with_co2_sensor(Box::new(DemoCo2Sensor::new()));
        }
        if poller.sensor_count() == 0 {
            warn!("Sensor poller enabled without sensors, nothing will be polled");
        }
        ready_at = poller.ready_at();

        tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));
    }

    // Start beacon handler
    if config.beacon.enabled {
        let (adv_tx, adv_rx) = mpsc::channel(64);
        let handler = BeaconHandler::new(gauges.clone(), &base_labels, &config.site, &config.beacon);
        tasks.push(tokio::spawn(handler.run(adv_rx, shutdown_rx.clone())));

        if config.demo {
            let beacon = DemoBeacon::new(config.beacon.kind, config.beacon.device_id.clone());
            tasks.push(tokio::spawn(feed_beacon(
                beacon,
                adv_tx,
                DEMO_ADVERTISE_INTERVAL,
                shutdown_rx.clone(),
            )));
        } else {
            warn!(
                kind = config.beacon.kind.as_str(),
                "No advertisement source attached to the beacon handler"
            );
            // Keep the channel open so the handler keeps running its watchdog.
            let mut keep_shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let _adv_tx = adv_tx;
                while keep_shutdown.changed().await.is_ok() {
                    if *keep_shutdown.borrow() {
                        break;
                    }
                }
            }));
        }
    }

    // Start expiry sweeper
    if let Some(secs) = config.expiry.sweep_interval_secs {
        let sweep_metrics = metrics.clone();
        let mut sweep_shutdown = shutdown_rx.clone();

        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = sweep_metrics.expire(Instant::now());
                        if removed > 0 {
                            debug!(removed, "Expired samples removed");
                        }
                    }
                    _ = sweep_shutdown.changed() => {
                        if *sweep_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    // Start HTTP server
    let http_server = HttpServer::new(metrics.clone(), listen_addr, config.http.path.clone())
        .with_warmup_until(ready_at);
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = http_task.await;
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    info!(
        metrics = metrics.len(),
        series_count = metrics.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
