// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::envelope::{Envelope, Event};
use crate::tags::{TagSet, TagsHash};
use std::hash::BuildHasherDefault;
use ustr::Ustr;

/// Pending series of one flush window.
pub type Batch = hashbrown::HashMap<SeriesKey, SeriesValue, BuildHasherDefault<fnv::FnvHasher>>;

#[must_use]
pub fn new_batch() -> Batch {
    Batch::with_hasher(BuildHasherDefault::default())
}

/// What produced a series. Only value metrics and counter events are aggregated from the
/// firehose; internal series are injected by the nozzle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum MetricKind {
    #[display("value")]
    Value,
    #[display("counter")]
    Counter,
    #[display("internal")]
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub kind: MetricKind,
    pub name: Ustr,
    pub tags_hash: TagsHash,
}

impl SeriesKey {
    #[must_use]
    pub fn new(kind: MetricKind, name: Ustr, tags: &TagSet) -> Self {
        Self {
            kind,
            name,
            tags_hash: tags.hash(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Seconds since the unix epoch.
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesValue {
    pub tags: TagSet,
    pub points: Vec<Point>,
}

/// Kind, `origin.name` and value of an aggregatable envelope, or `None` for every other event.
///
/// Counter events report their running total, not the delta.
#[must_use]
pub fn extract(envelope: &Envelope) -> Option<(MetricKind, Ustr, f64)> {
    let (kind, name, value) = match &envelope.event {
        Event::ValueMetric(metric) => (MetricKind::Value, &metric.name, metric.value),
        #[allow(clippy::cast_precision_loss)]
        Event::CounterEvent(counter) => (MetricKind::Counter, &counter.name, counter.total as f64),
        Event::Other(_) => return None,
    };
    let qualified = format!("{}.{}", envelope.origin(), name);
    Some((kind, Ustr::from(qualified.as_str()), value))
}
