use async_trait::async_trait;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::SendError;

/// Network boundary of the agent: posts one prepared envelope.
///
/// Implementations make exactly one attempt per call; retrying is the
/// caller's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, envelope: &Envelope) -> Result<(), SendError>;
}

/// `POST`s envelopes to the collector's batch endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, envelope: &Envelope) -> Result<(), SendError> {
        let mut request = self.client.post(&self.url);
        for (name, value) in envelope.headers() {
            request = request.header(name, value);
        }

        let resp = request
            .body(envelope.body.clone())
            .send()
            .await
            .map_err(|e| SendError::Transport(Box::new(e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        Err(SendError::Status {
            status: status.as_u16(),
            body: rejection_body(status.as_u16(), resp.text().await),
        })
    }
}

/// Body of a rejected response, or a placeholder naming the read failure.
fn rejection_body<E: std::fmt::Display>(status: u16, read: Result<String, E>) -> String {
    match read {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(status, error = %e, "Failed to read response body");
            format!("<unreadable: {e}>")
        }
    }
}
