use anyhow::{bail, Context};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector address, `host:port` or a full URL.
    pub server_address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u16,
    #[serde(default = "default_retry_initial_delay")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_increment")]
    pub retry_increment_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Optional HMAC signing key. An empty string disables signing.
    pub key: Option<String>,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_batch_size() -> usize {
    10
}

fn default_rate_limit() -> usize {
    2
}

fn default_max_retries() -> u16 {
    3
}

fn default_retry_initial_delay() -> u64 {
    1000
}

fn default_retry_increment() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    10
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server_address.trim().is_empty() {
            bail!("server_address must not be empty");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_increment(&self) -> Duration {
        Duration::from_millis(self.retry_increment_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Signing key bytes, `None` when unset or empty.
    pub fn signing_key(&self) -> Option<&[u8]> {
        self.key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::as_bytes)
    }

    /// Build the batch endpoint URL from `server_address`.
    pub fn updates_url(&self) -> String {
        let addr = self.server_address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return format!("{addr}/updates/");
        }
        format!("http://{addr}/updates/")
    }
}
