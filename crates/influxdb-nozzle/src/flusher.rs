// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator::Aggregator;
use crate::errors::{CreationError, ShippingError};
use crate::influxdb::{InfluxDbApi, InfluxDbConfig};
use crate::line_protocol;
use crate::util::unix_now;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

#[derive(Clone)]
pub struct Flusher {
    aggregator: Arc<Mutex<Aggregator>>,
    influxdb_api: InfluxDbApi,
    metric_prefix: String,
    // Serializes flushes across clones; consumers never touch it.
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

pub struct FlusherConfig {
    pub aggregator: Arc<Mutex<Aggregator>>,
    pub influxdb: InfluxDbConfig,
    pub metric_prefix: String,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Result<Self, CreationError> {
        let influxdb_api = InfluxDbApi::new(&config.influxdb)?;
        debug!("Using InfluxDB write URL {}", influxdb_api.write_url());
        Ok(Flusher {
            aggregator: config.aggregator,
            influxdb_api,
            metric_prefix: config.metric_prefix,
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Ships the pending batch, internal series included.
    ///
    /// Returns the number of series written. On failure the batch is kept and goes out again,
    /// together with whatever arrived in the meantime, on the next flush.
    ///
    /// The aggregator lock is only held while the batch is detached and put back, never during
    /// the HTTP request, so consumers are not blocked by a slow write.
    pub async fn flush(&self) -> Result<usize, ShippingError> {
        let _in_flight = self.in_flight.lock().await;

        let now = unix_now();
        let batch = {
            #[allow(clippy::expect_used)]
            let mut aggregator = self.aggregator.lock().expect("lock poisoned");
            aggregator.populate_internal_metrics(now);
            aggregator.take_batch()
        };

        let (payload, n_series) = line_protocol::render(&batch, &self.metric_prefix, now);
        debug!("Posting {n_series} series");

        let result = self.influxdb_api.ship(payload).await;

        #[allow(clippy::expect_used)]
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        match result {
            Ok(status) => {
                aggregator.record_sent(n_series);
                debug!("Successfully flushed {n_series} series ({status})");
                Ok(n_series)
            }
            Err(e) => {
                error!("Failed to flush {n_series} series, keeping them for the next flush: {e}");
                aggregator.restore_batch(batch);
                Err(e)
            }
        }
    }
}
