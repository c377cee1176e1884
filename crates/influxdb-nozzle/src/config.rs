// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_HTTP_TIMEOUT, DEFAULT_LISTENER_HOST, DEFAULT_LISTENER_PORT,
};
use crate::errors::ConfigError;
use crate::influxdb::InfluxDbConfig;
use crate::listener::ListenerConfig;
use crate::util::local_ip;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Nozzle configuration, read from a JSON file and overridden by `NOZZLE_*` environment
/// variables (the upper-cased key, e.g. `NOZZLE_INFLUXDBURL`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct NozzleConfig {
    /// Base URL of the InfluxDB server
    pub influx_db_url: String,
    /// Database written to
    pub influx_db_database: String,
    pub influx_db_user: String,
    pub influx_db_password: String,
    /// Accept any TLS certificate from the InfluxDB server
    #[serde(rename = "InsecureSSLSkipVerify")]
    pub insecure_ssl_skip_verify: bool,
    /// Prepended verbatim to every series name
    pub metric_prefix: String,
    /// Tags the internal series
    pub deployment: String,
    /// Tags the internal series, the local outbound address when empty
    pub ip: String,
    pub flush_duration_seconds: u64,
    pub http_timeout_seconds: u64,
    pub listener_host: String,
    pub listener_port: u16,
}

impl Default for NozzleConfig {
    fn default() -> Self {
        Self {
            influx_db_url: String::new(),
            influx_db_database: String::new(),
            influx_db_user: String::new(),
            influx_db_password: String::new(),
            insecure_ssl_skip_verify: false,
            metric_prefix: String::new(),
            deployment: String::new(),
            ip: String::new(),
            flush_duration_seconds: DEFAULT_FLUSH_INTERVAL.as_secs(),
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT.as_secs(),
            listener_host: DEFAULT_LISTENER_HOST.to_string(),
            listener_port: DEFAULT_LISTENER_PORT,
        }
    }
}

impl NozzleConfig {
    /// Reads `path`, applies environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Overrides every field for which `lookup` returns a value. Values that do not parse are
    /// ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_string(&lookup, "NOZZLE_INFLUXDBURL", &mut self.influx_db_url);
        override_string(&lookup, "NOZZLE_INFLUXDBDATABASE", &mut self.influx_db_database);
        override_string(&lookup, "NOZZLE_INFLUXDBUSER", &mut self.influx_db_user);
        override_string(&lookup, "NOZZLE_INFLUXDBPASSWORD", &mut self.influx_db_password);
        override_parsed(
            &lookup,
            "NOZZLE_INSECURESSLSKIPVERIFY",
            &mut self.insecure_ssl_skip_verify,
        );
        override_string(&lookup, "NOZZLE_METRICPREFIX", &mut self.metric_prefix);
        override_string(&lookup, "NOZZLE_DEPLOYMENT", &mut self.deployment);
        override_string(&lookup, "NOZZLE_IP", &mut self.ip);
        override_parsed(
            &lookup,
            "NOZZLE_FLUSHDURATIONSECONDS",
            &mut self.flush_duration_seconds,
        );
        override_parsed(
            &lookup,
            "NOZZLE_HTTPTIMEOUTSECONDS",
            &mut self.http_timeout_seconds,
        );
        override_string(&lookup, "NOZZLE_LISTENERHOST", &mut self.listener_host);
        override_parsed(&lookup, "NOZZLE_LISTENERPORT", &mut self.listener_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.influx_db_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "InfluxDbUrl cannot be empty".to_string(),
            ));
        }

        if self.influx_db_database.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "InfluxDbDatabase cannot be empty".to_string(),
            ));
        }

        if self.flush_duration_seconds == 0 {
            return Err(ConfigError::Invalid(
                "FlushDurationSeconds must be greater than 0".to_string(),
            ));
        }

        if self.http_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "HttpTimeoutSeconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_duration_seconds)
    }

    /// Configured IP, or the local outbound address when none is set.
    #[must_use]
    pub fn resolved_ip(&self) -> String {
        if !self.ip.is_empty() {
            return self.ip.clone();
        }
        local_ip().map(|ip| ip.to_string()).unwrap_or_default()
    }

    #[must_use]
    pub fn influxdb_config(&self) -> InfluxDbConfig {
        InfluxDbConfig {
            url: self.influx_db_url.clone(),
            database: self.influx_db_database.clone(),
            user: self.influx_db_user.clone(),
            password: self.influx_db_password.clone(),
            insecure_skip_verify: self.insecure_ssl_skip_verify,
            timeout: Duration::from_secs(self.http_timeout_seconds),
        }
    }

    #[must_use]
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            host: self.listener_host.clone(),
            port: self.listener_port,
        }
    }
}

fn override_string<F>(lookup: &F, key: &str, field: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *field = value;
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, field: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        match value.trim().parse::<T>() {
            Ok(parsed) => *field = parsed,
            Err(_) => warn!("Ignoring {key}: unable to parse '{value}'"),
        }
    }
}
