// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::types::ImageReference;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Recorded in the provenance marker of every instrumented workload
    pub operator_version: String,
    pub injector_image: ImageReference,
    pub proxy_image: ImageReference,
    /// OTLP endpoint of the telemetry proxy service
    pub proxy_endpoint: String,
    pub reconcile_timeout: Duration,
    /// Requeue interval for instances in an Error state
    pub error_requeue: Duration,
    pub resync_interval: Duration,
    pub max_conflict_retries: u32,
    /// Minimum age of `lastUpdateTime` before an otherwise unchanged status is rewritten
    pub status_refresh_interval: Duration,
    pub crd_wait_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let operator_version = env::var("LUMIGO_OPERATOR_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let injector_image = env::var("LUMIGO_INJECTOR_IMAGE")
            .context("LUMIGO_INJECTOR_IMAGE environment variable not set")?;
        let proxy_image = env::var("LUMIGO_TELEMETRY_PROXY_IMAGE")
            .context("LUMIGO_TELEMETRY_PROXY_IMAGE environment variable not set")?;
        let proxy_endpoint = env::var("TELEMETRY_PROXY_OTLP_SERVICE")
            .context("TELEMETRY_PROXY_OTLP_SERVICE environment variable not set")?;

        Ok(Config {
            operator_version,
            injector_image: ImageReference::parse(&injector_image),
            proxy_image: ImageReference::parse(&proxy_image),
            proxy_endpoint: proxy_endpoint.trim_end_matches('/').to_string(),
            reconcile_timeout: secs_from_env("RECONCILE_TIMEOUT_SECS", 30)?,
            error_requeue: secs_from_env("ERROR_REQUEUE_SECS", 10)?,
            resync_interval: secs_from_env("RESYNC_INTERVAL_SECS", 300)?,
            max_conflict_retries: number_from_env("MAX_CONFLICT_RETRIES", 5)?,
            status_refresh_interval: secs_from_env("STATUS_REFRESH_SECS", 60)?,
            crd_wait_timeout: secs_from_env("CRD_WAIT_TIMEOUT_SECS", 600)?,
        })
    }
}

fn number_from_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", name, value)),
        Err(_) => Ok(default),
    }
}

fn secs_from_env(name: &str, default: u64) -> Result<Duration> {
    number_from_env(name, default).map(Duration::from_secs)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        operator_version: "test".to_string(),
        injector_image: ImageReference::parse("localhost:5000/lumigo-injector:latest"),
        proxy_image: ImageReference::parse("localhost:5000/lumigo-telemetry-proxy:latest"),
        proxy_endpoint: "http://localhost:4318".to_string(),
        reconcile_timeout: Duration::from_secs(5),
        error_requeue: Duration::from_secs(10),
        resync_interval: Duration::from_secs(300),
        max_conflict_retries: 3,
        status_refresh_interval: Duration::from_secs(60),
        crd_wait_timeout: Duration::from_secs(1),
    }
}
