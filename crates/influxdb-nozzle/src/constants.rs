// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const TOTAL_MESSAGES_RECEIVED: &str = "totalMessagesReceived";
pub const TOTAL_METRICS_SENT: &str = "totalMetricsSent";
pub const SLOW_CONSUMER_ALERT: &str = "slowConsumerAlert";

/// Origin and counter name the firehose uses to report messages it dropped because this
/// consumer could not keep up.
pub const SLOW_CONSUMER_ORIGIN: &str = "doppler";
pub const SLOW_CONSUMER_COUNTER: &str = "TruncatingBuffer.DroppedMessages";

pub const WRITE_PATH: &str = "/write";
pub const CONTENT_TYPE: &str = "application/binary";

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LISTENER_HOST: &str = "0.0.0.0";
pub const DEFAULT_LISTENER_PORT: u16 = 8126;
