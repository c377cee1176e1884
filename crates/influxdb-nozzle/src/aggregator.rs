// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-interval series aggregation.
//!
//! The [`Aggregator`] owns the pending [`Batch`] and the process-wide counters. It performs no I/O;
//! callers share it behind a mutex between the stream consumer and the [`crate::flusher`].

use crate::constants::{
    NANOS_PER_SECOND, SLOW_CONSUMER_ALERT, TOTAL_MESSAGES_RECEIVED, TOTAL_METRICS_SENT,
};
use crate::envelope::Envelope;
use crate::metric::{self, new_batch, Batch, MetricKind, Point, SeriesKey, SeriesValue};
use crate::tags::TagSet;
use crate::util::unix_now;
use hashbrown::hash_map::Entry;
use tracing::{debug, trace, warn};
use ustr::Ustr;

pub struct Aggregator {
    batch: Batch,
    internal_tags: TagSet,
    total_messages_received: u64,
    total_metrics_sent: u64,
}

impl Aggregator {
    /// Creates an empty aggregator. `deployment` and `ip` tag the internal series.
    #[must_use]
    pub fn new(deployment: &str, ip: &str) -> Self {
        Aggregator {
            batch: new_batch(),
            internal_tags: TagSet::from_pairs([("ip", ip), ("deployment", deployment)]),
            total_messages_received: 0,
            total_metrics_sent: 0,
        }
    }

    /// Adds one envelope to the batch.
    ///
    /// Every envelope counts as received. Only value metrics and counter events with a finite
    /// value produce a point; anything else is dropped.
    pub fn consume(&mut self, envelope: &Envelope) {
        self.total_messages_received += 1;

        let Some((kind, name, value)) = metric::extract(envelope) else {
            trace!("Ignoring {} envelope", envelope.event_type());
            return;
        };
        if !value.is_finite() {
            warn!("Dropping non-finite value {value} for {name}");
            return;
        }

        let tags = TagSet::from_envelope(envelope);
        let key = SeriesKey::new(kind, name, &tags);
        let series = self.batch.entry(key).or_default();
        series.tags = tags;
        series.points.push(Point {
            timestamp: envelope.timestamp / NANOS_PER_SECOND,
            value,
        });
    }

    /// Queues `slowConsumerAlert=1` in the current batch. The alert is cleared by the next
    /// successful flush.
    pub fn alert_slow_consumer(&mut self) {
        debug!("Slow consumer alert raised");
        self.add_internal_metric(SLOW_CONSUMER_ALERT, 1, unix_now());
    }

    /// Overwrites the counter series and adds `slowConsumerAlert=0` unless an alert is queued.
    pub fn populate_internal_metrics(&mut self, now: i64) {
        self.add_internal_metric(TOTAL_MESSAGES_RECEIVED, self.total_messages_received, now);
        self.add_internal_metric(TOTAL_METRICS_SENT, self.total_metrics_sent, now);

        if !self.batch.contains_key(&self.internal_key(SLOW_CONSUMER_ALERT)) {
            self.add_internal_metric(SLOW_CONSUMER_ALERT, 0, now);
        }
    }

    /// Detaches the pending batch, leaving an empty one behind for concurrent consumers.
    pub fn take_batch(&mut self) -> Batch {
        std::mem::replace(&mut self.batch, new_batch())
    }

    /// Puts back a batch that could not be delivered.
    ///
    /// Points of `undelivered` go in front of points consumed since it was taken, and the newer
    /// tag rendering is kept. For internal series the newer value wins outright.
    pub fn restore_batch(&mut self, undelivered: Batch) {
        for (key, mut older) in undelivered {
            match self.batch.entry(key) {
                Entry::Occupied(mut entry) => {
                    if key.kind == MetricKind::Internal {
                        continue;
                    }
                    let newer = entry.get_mut();
                    older.points.append(&mut newer.points);
                    newer.points = older.points;
                }
                Entry::Vacant(entry) => {
                    entry.insert(older);
                }
            }
        }
    }

    /// Records a successful delivery of `series` series.
    pub fn record_sent(&mut self, series: usize) {
        self.total_metrics_sent += series as u64;
    }

    #[must_use]
    pub fn total_messages_received(&self) -> u64 {
        self.total_messages_received
    }

    #[must_use]
    pub fn total_metrics_sent(&self) -> u64 {
        self.total_metrics_sent
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    #[must_use]
    pub fn get_series(&self, kind: MetricKind, name: &str, tags: &TagSet) -> Option<&SeriesValue> {
        self.batch
            .get(&SeriesKey::new(kind, Ustr::from(name), tags))
    }

    #[must_use]
    pub fn get_internal_series(&self, name: &str) -> Option<&SeriesValue> {
        self.batch.get(&self.internal_key(name))
    }

    fn internal_key(&self, name: &str) -> SeriesKey {
        SeriesKey::new(MetricKind::Internal, Ustr::from(name), &self.internal_tags)
    }

    fn add_internal_metric(&mut self, name: &str, value: u64, now: i64) {
        let key = self.internal_key(name);
        #[allow(clippy::cast_precision_loss)]
        let point = Point {
            timestamp: now,
            value: value as f64,
        };
        self.batch.insert(
            key,
            SeriesValue {
                tags: self.internal_tags.clone(),
                points: vec![point],
            },
        );
    }
}
