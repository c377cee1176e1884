// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose envelope model.
//!
//! Envelopes arrive as JSON objects using the firehose's camelCase field names. A `ValueMetric` or
//! `CounterEvent` envelope must carry its typed payload; decoding rejects it otherwise, so an
//! [`Envelope`] in hand always has a well-formed [`Event`].

use crate::errors::EnvelopeError;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, derive_more::Display)]
pub enum EventType {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValueMetric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

impl ValueMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            unit: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterEvent {
    pub name: String,
    #[serde(default)]
    pub delta: u64,
    pub total: u64,
}

impl CounterEvent {
    pub fn new(name: impl Into<String>, delta: u64, total: u64) -> Self {
        Self {
            name: name.into(),
            delta,
            total,
        }
    }
}

/// Typed payload of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ValueMetric(ValueMetric),
    CounterEvent(CounterEvent),
    /// Any other firehose event. Counted, never aggregated.
    Other(EventType),
}

impl Event {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ValueMetric(_) => EventType::ValueMetric,
            Self::CounterEvent(_) => EventType::CounterEvent,
            Self::Other(event_type) => *event_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    pub origin: Option<String>,
    /// Nanoseconds since the unix epoch.
    pub timestamp: i64,
    pub deployment: Option<String>,
    pub job: Option<String>,
    pub index: Option<String>,
    pub ip: Option<String>,
    pub tags: HashMap<String, String>,
    pub event: Event,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, event: Event) -> Self {
        Self {
            origin: Some(origin.into()),
            timestamp: 0,
            deployment: None,
            job: None,
            index: None,
            ip: None,
            tags: HashMap::new(),
            event,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    #[must_use]
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        self.origin.as_deref().unwrap_or_default()
    }
}

// Wire shape of an envelope, before the payload is matched against the declared event type.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    origin: Option<String>,
    event_type: EventType,
    #[serde(default)]
    timestamp: i64,
    deployment: Option<String>,
    job: Option<String>,
    index: Option<String>,
    ip: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    value_metric: Option<ValueMetric>,
    counter_event: Option<CounterEvent>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let event = match raw.event_type {
            EventType::ValueMetric => Event::ValueMetric(
                raw.value_metric
                    .ok_or(EnvelopeError::MissingPayload(EventType::ValueMetric))?,
            ),
            EventType::CounterEvent => Event::CounterEvent(
                raw.counter_event
                    .ok_or(EnvelopeError::MissingPayload(EventType::CounterEvent))?,
            ),
            other => Event::Other(other),
        };

        Ok(Envelope {
            origin: raw.origin,
            timestamp: raw.timestamp,
            deployment: raw.deployment,
            job: raw.job,
            index: raw.index,
            ip: raw.ip,
            tags: raw.tags,
            event,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_value_metric() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "origin": "gorouter",
                "eventType": "ValueMetric",
                "timestamp": 1500000000000000000,
                "deployment": "cf",
                "job": "router",
                "index": "0",
                "ip": "10.0.16.4",
                "tags": {"az": "z1"},
                "valueMetric": {"name": "latency", "value": 12.5, "unit": "ms"}
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.event_type(), EventType::ValueMetric);
        assert_eq!(envelope.origin(), "gorouter");
        assert_eq!(envelope.timestamp, 1_500_000_000_000_000_000);
        assert_eq!(envelope.tags.get("az").map(String::as_str), Some("z1"));
        assert_eq!(
            envelope.event,
            Event::ValueMetric(ValueMetric {
                name: "latency".to_string(),
                value: 12.5,
                unit: "ms".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_counter_event() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"origin":"doppler","eventType":"CounterEvent","timestamp":1,
                "counterEvent":{"name":"dropped","delta":2,"total":40}}"#,
        )
        .unwrap();

        assert_eq!(
            envelope.event,
            Event::CounterEvent(CounterEvent::new("dropped", 2, 40))
        );
        assert!(envelope.deployment.is_none());
        assert!(envelope.tags.is_empty());
    }

    #[test]
    fn test_decode_other_event_types() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"origin":"app","eventType":"LogMessage","timestamp":1}"#)
                .unwrap();
        assert_eq!(envelope.event, Event::Other(EventType::LogMessage));

        let envelope: Envelope =
            serde_json::from_str(r#"{"origin":"app","eventType":"SomethingNew"}"#).unwrap();
        assert_eq!(envelope.event_type(), EventType::Unknown);
    }

    #[test]
    fn test_decode_rejects_missing_payload() {
        let result = serde_json::from_str::<Envelope>(
            r#"{"origin":"app","eventType":"ValueMetric","timestamp":1}"#,
        );
        let err = result.unwrap_err();
        assert!(err
            .to_string()
            .contains("ValueMetric envelope is missing its typed payload"));
    }
}
