// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope listener for receiving firehose envelopes over UDP.
//!
//! Each datagram holds one or more newline-separated JSON envelopes. Decoded envelopes are
//! consumed by the shared [`Aggregator`]; lines that fail to decode are logged and skipped.
//! The firehose reports its own dropped-message counter when this consumer falls behind; that
//! counter raises the slow consumer alert.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::aggregator::Aggregator;
use crate::constants::{SLOW_CONSUMER_COUNTER, SLOW_CONSUMER_ORIGIN};
use crate::envelope::{Envelope, Event};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

// Large enough for a full UDP datagram.
const BUFFER_SIZE: usize = 65_536;

pub struct ListenerConfig {
    /// Host to bind the UDP socket to (e.g., "0.0.0.0")
    pub host: String,
    /// Port to bind the UDP socket to, 0 picks a free one
    pub port: u16,
}

enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Replays a fixed buffer, for tests.
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = [0; BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                Ok((buf[..amt].to_owned(), src))
            }
            BufferReader::MirrorTest(data, src) => Ok((data.clone(), *src)),
        }
    }
}

pub struct EnvelopeListener {
    cancel_token: CancellationToken,
    aggregator: Arc<Mutex<Aggregator>>,
    buffer_reader: BufferReader,
}

impl EnvelopeListener {
    /// Binds the UDP socket described by `config`.
    pub async fn new(
        config: &ListenerConfig,
        aggregator: Arc<Mutex<Aggregator>>,
        cancel_token: CancellationToken,
    ) -> std::io::Result<EnvelopeListener> {
        let addr = format!("{}:{}", config.host, config.port);
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        Ok(EnvelopeListener {
            cancel_token,
            aggregator,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            BufferReader::MirrorTest(_, addr) => Some(*addr),
        }
    }

    /// Receives and consumes datagrams until the cancel token fires.
    pub async fn spin(self) {
        while !self.cancel_token.is_cancelled() {
            tokio::select! {
                read = self.buffer_reader.read() => match read {
                    Ok((buf, src)) => self.consume_datagram(&buf, src),
                    Err(e) => error!("Failed to receive envelopes: {}", e),
                },
                _ = self.cancel_token.cancelled() => break,
            }
        }
        debug!("Envelope listener stopped");
    }

    fn consume_datagram(&self, buf: &[u8], src: SocketAddr) {
        let msgs = match std::str::from_utf8(buf) {
            Ok(msgs) => msgs,
            Err(e) => {
                warn!("Dropping non UTF-8 datagram from {}: {}", src, e);
                return;
            }
        };
        trace!("Received message: {} from {}", msgs, src);

        let envelopes: Vec<Envelope> = msgs
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str::<Envelope>(line) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    error!("Failed to decode envelope {}: {}", line, e);
                    None
                }
            })
            .collect();

        if envelopes.is_empty() {
            return;
        }
        debug!("Consuming {} envelopes", envelopes.len());

        #[allow(clippy::expect_used)]
        let mut aggregator = self.aggregator.lock().expect("lock poisoned");
        for envelope in &envelopes {
            if is_slow_consumer_signal(envelope) {
                warn!("Firehose is dropping messages for this consumer, raising slow consumer alert");
                aggregator.alert_slow_consumer();
            }
            aggregator.consume(envelope);
        }
    }
}

fn is_slow_consumer_signal(envelope: &Envelope) -> bool {
    matches!(
        &envelope.event,
        Event::CounterEvent(counter)
            if counter.name == SLOW_CONSUMER_COUNTER && envelope.origin() == SLOW_CONSUMER_ORIGIN
    )
}
