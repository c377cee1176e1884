// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! InfluxDB write client.
//!
//! Posts a rendered payload to `<url>/write?db=<database>` once. Retrying is left to the caller:
//! a failed batch stays pending and goes out again with the next flush.

use crate::constants::{CONTENT_TYPE, WRITE_PATH};
use crate::errors::{CreationError, ShippingError};
use reqwest::{StatusCode, Url};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InfluxDbConfig {
    /// Base URL of the server, e.g. `https://influx.example.com:8086`.
    pub url: String,
    pub database: String,
    /// Basic auth user. No credentials are sent when empty.
    pub user: String,
    pub password: String,
    pub insecure_skip_verify: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InfluxDbApi {
    client: reqwest::Client,
    write_url: Url,
    credentials: Option<(String, String)>,
}

impl InfluxDbApi {
    pub fn new(config: &InfluxDbConfig) -> Result<Self, CreationError> {
        let write_url = write_url(&config.url, &config.database)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| CreationError::HttpClient(e.to_string()))?;
        let credentials = if config.user.is_empty() {
            None
        } else {
            Some((config.user.clone(), config.password.clone()))
        };

        Ok(InfluxDbApi {
            client,
            write_url,
            credentials,
        })
    }

    #[must_use]
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Posts `payload` to the write endpoint.
    ///
    /// Any `2xx` answer is a success. Every other answer, and any failure to get an answer at
    /// all, is returned as a [`ShippingError`].
    pub async fn ship(&self, payload: Vec<u8>) -> Result<StatusCode, ShippingError> {
        debug!(
            "Posting {} bytes to InfluxDB at {}",
            payload.len(),
            self.write_url
        );

        let mut request = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(payload);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ShippingError::Transport(error_chain(&e)))?;
        let status = response.status();
        debug!(
            "InfluxDB answered {} in {} ms",
            status,
            start.elapsed().as_millis()
        );

        if status.is_success() {
            return Ok(status);
        }
        match response.text().await {
            Ok(body) => Err(ShippingError::Status { status, body }),
            Err(_) => Err(ShippingError::Body { status }),
        }
    }
}

/// Builds `<base>/write?db=<database>`.
pub fn write_url(base: &str, database: &str) -> Result<Url, CreationError> {
    let invalid = |reason: String| CreationError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), WRITE_PATH))
        .map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http or https URL".to_string()));
    }
    url.query_pairs_mut().append_pair("db", database);
    Ok(url)
}

// reqwest hides the interesting part (connection refused, certificate invalid) in the sources.
fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(url: &str) -> InfluxDbConfig {
        InfluxDbConfig {
            url: url.to_string(),
            database: "metrics".to_string(),
            user: String::new(),
            password: String::new(),
            insecure_skip_verify: false,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_write_url() {
        assert_eq!(
            write_url("http://localhost:8086", "metrics").unwrap().as_str(),
            "http://localhost:8086/write?db=metrics"
        );
        assert_eq!(
            write_url("https://influx.example.com/", "cf metrics")
                .unwrap()
                .as_str(),
            "https://influx.example.com/write?db=cf+metrics"
        );
    }

    #[test]
    fn test_write_url_rejects_garbage() {
        assert!(matches!(
            write_url("not a url", "metrics"),
            Err(CreationError::InvalidUrl { .. })
        ));
        assert!(matches!(
            write_url("ftp://influx.example.com", "metrics"),
            Err(CreationError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_any_2xx_is_success() {
        let mut server = mockito::Server::new_async().await;
        let api = InfluxDbApi::new(&config(&server.url())).unwrap();

        for status in [200, 201, 204] {
            let mock = server
                .mock("POST", "/write")
                .match_query(mockito::Matcher::Any)
                .with_status(status)
                .expect(1)
                .create_async()
                .await;
            assert_eq!(
                api.ship(b"m value=1 1".to_vec()).await.unwrap().as_u16(),
                u16::try_from(status).unwrap()
            );
            mock.assert_async().await;
            mock.remove_async().await;
        }
    }

    #[tokio::test]
    async fn test_3xx_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/write")
            .match_query(mockito::Matcher::Any)
            .with_status(300)
            .with_body("moved")
            .create_async()
            .await;

        let api = InfluxDbApi::new(&config(&server.url())).unwrap();
        let err = api.ship(b"m value=1 1".to_vec()).await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::MULTIPLE_CHOICES));
        assert!(matches!(err, ShippingError::Status { .. }));
        assert!(err.to_string().ends_with("moved"));
    }

    #[tokio::test]
    async fn test_transport_failure_carries_cause() {
        // Nothing listens on port 1.
        let api = InfluxDbApi::new(&config("http://127.0.0.1:1")).unwrap();

        let err = api.ship(b"m value=1 1".to_vec()).await.unwrap_err();
        assert!(err.status().is_none());
        assert!(matches!(err, ShippingError::Transport(_)));
    }

    #[tokio::test]
    async fn test_basic_auth_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/write")
            .match_query(mockito::Matcher::UrlEncoded(
                "db".to_string(),
                "metrics".to_string(),
            ))
            .match_header("content-type", "application/binary")
            // admin:secret
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .match_body("m value=1 1000000000\n")
            .with_status(204)
            .create_async()
            .await;

        let mut config = config(&server.url());
        config.user = "admin".to_string();
        config.password = "secret".to_string();
        let api = InfluxDbApi::new(&config).unwrap();

        let status = api
            .ship(b"m value=1 1000000000\n".to_vec())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/write")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("engine: cache maximum memory size exceeded")
            .expect(1)
            .create_async()
            .await;

        let api = InfluxDbApi::new(&config(&server.url())).unwrap();
        let err = api.ship(b"m value=1 1".to_vec()).await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            err.to_string(),
            "InfluxDB request returned HTTP response: 500 Internal Server Error;\nengine: cache maximum memory size exceeded"
        );
        // One request, no retries.
        mock.assert_async().await;
    }
}
