// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregation and delivery engine for firehose envelopes.
//!
//! Envelopes are grouped into per-interval series by the [`aggregator`], rendered to InfluxDB
//! line protocol by [`line_protocol`] and shipped by the [`flusher`] through the [`influxdb`]
//! write client.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod errors;
pub mod flusher;
pub mod influxdb;
pub mod line_protocol;
pub mod listener;
pub mod metric;
pub mod tags;
pub mod util;
