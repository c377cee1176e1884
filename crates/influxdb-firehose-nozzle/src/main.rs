// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod health;

use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use influxdb_nozzle::{
    aggregator::Aggregator,
    config::NozzleConfig,
    flusher::{Flusher, FlusherConfig},
    listener::EnvelopeListener,
};

const DEFAULT_CONFIG_PATH: &str = "config/influxdb-firehose-nozzle.json";
const DEFAULT_HEALTH_PORT: u16 = 8000;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("NOZZLE_LOGLEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading nozzle configuration: {e}");
            return;
        }
    };

    let ip = config.resolved_ip();
    info!(
        "Starting nozzle for deployment '{}' on {}, writing to {} database '{}'",
        config.deployment, ip, config.influx_db_url, config.influx_db_database
    );

    let aggregator = Arc::new(Mutex::new(Aggregator::new(&config.deployment, &ip)));

    let flusher = match Flusher::new(FlusherConfig {
        aggregator: Arc::clone(&aggregator),
        influxdb: config.influxdb_config(),
        metric_prefix: config.metric_prefix.clone(),
    }) {
        Ok(flusher) => flusher,
        Err(e) => {
            error!("Error creating InfluxDB flusher: {e}");
            return;
        }
    };

    let cancel_token = CancellationToken::new();

    let listener = match EnvelopeListener::new(
        &config.listener_config(),
        Arc::clone(&aggregator),
        cancel_token.clone(),
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Unable to bind envelope listener on {}:{}: {e}",
                config.listener_host, config.listener_port
            );
            return;
        }
    };
    if let Some(addr) = listener.local_addr() {
        info!("envelope-udp: starting to listen on {addr}");
    }
    let listener_handle = tokio::spawn(listener.spin());

    let health_port = env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HEALTH_PORT);
    let health_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, health_port));
    let health_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr, health_token).await {
            error!("Liveness endpoint on {health_addr} stopped: {e}");
        }
    });

    let mut flush_interval = flush_ticker(config.flush_interval());
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            _ = flush_interval.tick() => {
                debug!("Flushing aggregated series");
                // Failures are logged by the flusher and retried on the next tick.
                let _ = flusher.flush().await;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Unable to listen for shutdown signal: {e}");
                }
                break;
            }
        }
    }

    info!("Shutting down, flushing pending series");
    cancel_token.cancel();
    if let Err(e) = listener_handle.await {
        error!("Envelope listener task failed: {e}");
    }
    if let Ok(n_series) = flusher.flush().await {
        info!("Final flush sent {n_series} series");
    }
}

/// A slow write pushes the next flush back instead of triggering catch-up flushes.
fn flush_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Reads `NOZZLE_CONFIG`, or the default file when it exists, falling back to the environment.
fn load_config() -> Result<NozzleConfig, influxdb_nozzle::errors::ConfigError> {
    let path = match env::var("NOZZLE_CONFIG") {
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()),
    };

    match path {
        Some(path) => {
            debug!("Reading configuration from {}", path.display());
            NozzleConfig::load(&path)
        }
        None => {
            debug!("No configuration file, reading configuration from the environment");
            NozzleConfig::from_env()
        }
    }
}
