// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Clock and host helpers.

use std::net::{IpAddr, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds. A clock set before the epoch reads as 0.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Address of the interface the host would use for outbound traffic.
///
/// Connecting a UDP socket only selects a route, no packet is sent.
#[must_use]
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr() {
        Ok(addr) if !addr.ip().is_unspecified() => Some(addr.ip()),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("Unable to resolve local address: {}", e);
            None
        }
    }
}
