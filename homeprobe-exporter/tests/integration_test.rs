//! Integration tests for the exporter.
//!
//! These tests drive the producers the way the binary does and check what a
//! scraper sees on the HTTP endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use homeprobe_exporter::beacon::{ThoReading, WxBeaconReading};
use homeprobe_exporter::config::{BeaconKind, PollerConfig};
use homeprobe_exporter::demo::{
    DemoAirQualitySensor, DemoBeacon, DemoClimateSensor, DemoCo2Sensor, feed_beacon,
};
use homeprobe_exporter::{
    Advertisement, BeaconData, BeaconHandler, EnvironmentGauges, EnvironmentPoller,
    ExporterConfig, HttpServer, Outcome,
};
use homeprobe_metrics::{MetricSet, SharedMetricSet};

/// Parse "name{labels} value" lines into (series, value) pairs.
fn samples(output: &str) -> Vec<(&str, f64)> {
    output
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            Some((series, value.parse().ok()?))
        })
        .collect()
}

fn demo_config() -> ExporterConfig {
    ExporterConfig::parse(
        r#"{
            labels: { site: "home" },
            poller: { warmup_secs: 0 },
            beacon: { device_id: "C0:11:22:33:44:55" },
        }"#,
    )
    .unwrap()
}

fn build(config: &ExporterConfig) -> (SharedMetricSet, EnvironmentPoller, BeaconHandler) {
    let mut set = MetricSet::new();
    let gauges = EnvironmentGauges::register(&mut set);
    let labels = config.base_labels();

    let poller = EnvironmentPoller::new(
        gauges.clone(),
        &labels,
        config.site.clone(),
        &config.poller,
    )
    .with_climate_sensor(Box::new(DemoClimateSensor::seeded(42)))
    .with_air_quality_sensor(Box::new(DemoAirQualitySensor::new()))
    .with_co2_sensor(Box::new(DemoCo2Sensor::new()));

    let handler = BeaconHandler::new(gauges, &labels, &config.site, &config.beacon);

    (Arc::new(set), poller, handler)
}

#[test]
fn test_poller_and_beacon_share_registry() {
    let config = demo_config();
    let (metrics, mut poller, mut handler) = build(&config);
    let now = Instant::now();

    let report = poller.poll_once(now);
    assert_eq!(report.failures, 0);
    assert_eq!(report.published, 8);

    let adv = Advertisement {
        device_id: config.beacon.device_id.clone(),
        data: BeaconData::WxBeacon2(WxBeaconReading {
            sequence: 1,
            temperature: 9.5,
            humidity: 71.0,
            ambient_light: 350.0,
            uv_index: 0.5,
            pressure: 1002.0,
            sound_noise: 38.0,
            discomfort_index: 52.1,
            heat_stroke: 8.4,
            battery_voltage: 2.87,
        }),
    };
    assert_eq!(handler.handle(&adv, now), Outcome::Published(10));

    let output = metrics.render(now);
    let temperatures: Vec<&str> = output
        .lines()
        .filter(|l| l.starts_with("temperature{"))
        .collect();
    assert_eq!(temperatures.len(), 2, "{}", output);
    assert!(temperatures[0].starts_with("temperature{place=\"inside\",site=\"home\"} "));
    assert_eq!(temperatures[1], "temperature{place=\"outside\",site=\"home\"} 9.50");

    // Indoor-only and outdoor-only gauges each appear once.
    assert_eq!(
        samples(&output)
            .iter()
            .filter(|(s, _)| s.starts_with("co2{"))
            .count(),
        1
    );
    assert!(output.contains("uv_index{place=\"outside\",site=\"home\"} 0.50\n"));
}

#[test]
fn test_beacon_samples_expire_poller_samples_stay() {
    let config = demo_config();
    let (metrics, mut poller, mut handler) = build(&config);
    let now = Instant::now();

    poller.poll_once(now);
    let adv = Advertisement {
        device_id: config.beacon.device_id.clone(),
        data: BeaconData::Tho(ThoReading {
            sequence: 3,
            temperature: 18.2,
            humidity: 55.0,
            battery_percent: 90,
        }),
    };
    assert_eq!(handler.handle(&adv, now), Outcome::Published(5));

    let later = Instant::now() + Duration::from_secs(config.beacon.ttl_secs + 1);
    let output = metrics.render(later);
    assert!(!output.contains("wosensor_type"), "{}", output);
    assert!(!output.contains("sensor_vbat"));
    assert!(output.contains("co2{place=\"inside\",site=\"home\"} "));
}

#[test]
fn test_poller_ttl_config() {
    let mut config = demo_config();
    config.poller = PollerConfig {
        ttl_secs: Some(30),
        warmup_secs: 0,
        ..PollerConfig::default()
    };
    let (metrics, mut poller, _handler) = build(&config);
    let now = Instant::now();

    poller.poll_once(now);
    assert_eq!(metrics.series_count(), 8);
    assert_eq!(metrics.expire(now + Duration::from_secs(31)), 8);
    assert_eq!(metrics.render(now + Duration::from_secs(31)), "");
}

#[tokio::test]
async fn test_demo_beacon_feed_publishes() {
    let config = demo_config();
    let (metrics, _poller, handler) = build(&config);
    let (adv_tx, adv_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let beacon = DemoBeacon::seeded(BeaconKind::WxBeacon2, config.beacon.device_id.clone(), 9);
    let handler_task = tokio::spawn(handler.run(adv_rx, shutdown_rx.clone()));
    let feed_task = tokio::spawn(feed_beacon(
        beacon,
        adv_tx,
        Duration::from_millis(5),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), async {
        feed_task.await.unwrap();
        handler_task.await.unwrap();
    })
    .await
    .unwrap();

    let output = metrics.render(Instant::now());
    assert!(output.contains("sensor_vbat{place=\"outside\",site=\"home\"} "), "{}", output);
}

#[tokio::test]
async fn test_http_server_metrics_endpoint() {
    let config = demo_config();
    let (metrics, mut poller, _handler) = build(&config);
    poller.poll_once(Instant::now());

    // Bind first so the port is known before the server starts.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = HttpServer::new(metrics.clone(), addr, config.http.path.clone());
    let server_handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
    let body = response.text().await.unwrap();
    assert_eq!(body, metrics.render(Instant::now()));
    assert_eq!(samples(&body).len(), 8);

    let ready = client
        .get(format!("http://{}/ready", addr))
        .send()
        .await
        .unwrap();
    assert!(ready.status().is_success());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), server_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_http_server_warming_up() {
    let metrics: SharedMetricSet = Arc::new(MetricSet::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = HttpServer::new(metrics, addr, "/metrics".to_string())
        .with_warmup_until(Instant::now() + Duration::from_secs(30));
    let server_handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    let client = reqwest::Client::new();
    let ready = client
        .get(format!("http://{}/ready", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert!(health.status().is_success());

    shutdown_tx.send(true).unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(1), server_handle).await;
}
