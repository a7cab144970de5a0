//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use pvmon_common::MetricsConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::errors::{Result, SinkError};
use crate::line::{encode_lines, MetricLine};
use crate::sink::MetricsSink;

const MAX_ERROR_BODY: usize = 512;

/// POSTs line-protocol batches to a VictoriaMetrics (or any Prometheus
/// text import compatible) endpoint.
#[derive(Debug, Clone)]
pub struct VictoriaMetricsSink {
    client: Client,
    endpoint: String,
}

impl VictoriaMetricsSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &MetricsConfig) -> Result<Self> {
        Self::new(config.endpoint.clone(), config.timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricsSink for VictoriaMetricsSink {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let body = encode_lines(lines);
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            debug!(lines = lines.len(), status = status.as_u16(), "metrics published");
            return Ok(());
        }
        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Err(SinkError::Status {
            status: status.as_u16(),
            body: text,
        })
    }
}
