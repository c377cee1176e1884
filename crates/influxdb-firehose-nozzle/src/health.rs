// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Liveness endpoint for the platform health check.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{header, http, Request, Response, StatusCode};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const RUNNING: &str = r#"{ "status" : "running" }"#;

/// Serves the liveness answer on `addr` until `cancel_token` fires.
pub async fn serve(addr: SocketAddr, cancel_token: CancellationToken) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    debug!("Liveness endpoint listening on {}", listener.local_addr()?);
    serve_listener(listener, cancel_token).await
}

async fn serve_listener(
    listener: tokio::net::TcpListener,
    cancel_token: CancellationToken,
) -> io::Result<()> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Liveness server error: {e}");
                    return Err(e);
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => {
                if let Err(e) = finished {
                    error!("Liveness connection handler failed: {e:?}");
                }
                continue;
            },
            _ = cancel_token.cancelled() => return Ok(()),
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        joinset.spawn(async move {
            if let Err(e) = server
                .serve_connection(conn, service_fn(liveness_handler))
                .await
            {
                debug!("Liveness connection error: {e}");
            }
        });
    }
}

async fn liveness_handler(_req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(running().unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }))
}

fn running() -> http::Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(RUNNING.as_bytes())))
}
