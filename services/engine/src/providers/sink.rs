//! Result Sinks
//!
//! Hand a finished [`DiscoveryResult`] to whatever persists or alerts on it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::io::Write;
use std::time::Duration;
use tracing::info;

use super::ResultSink;
use crate::discovery::DiscoveryResult;

/// Output format for [`StdoutSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

/// Writes the result to stdout
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn render(&self, result: &DiscoveryResult) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(result.display()),
            OutputFormat::Json => {
                serde_json::to_string_pretty(result).context("Failed to serialize discovery result")
            }
        }
    }
}

#[async_trait]
impl ResultSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn publish(&self, result: &DiscoveryResult) -> Result<()> {
        let rendered = self.render(result)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", rendered).context("Failed to write result to stdout")?;
        Ok(())
    }
}

/// POSTs the result as JSON to a persistence/alerting endpoint
pub struct HttpResultSink {
    http_client: Client,
    url: String,
}

impl HttpResultSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, result: &DiscoveryResult) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(result)
            .send()
            .await
            .with_context(|| format!("Failed to publish result to {}", self.url))?;

        if !response.status().is_success() {
            anyhow::bail!("Result sink returned {}", response.status());
        }

        info!(run_id = %result.run_id, url = %self.url, "Published discovery result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_formats() {
        let result = DiscoveryResult::begin().finish();

        let json = StdoutSink::new(OutputFormat::Json).render(&result).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["accounts_attempted"], 0);
        assert!(parsed["success_rate"].is_null());

        let text = StdoutSink::new(OutputFormat::Text).render(&result).unwrap();
        assert!(text.contains("0/0 scanned (n/a)"));
    }
}
