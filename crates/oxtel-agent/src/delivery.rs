use oxtel_common::backoff::Backoff;
use oxtel_common::types::MetricRecord;
use tokio_util::sync::CancellationToken;

use crate::envelope::EnvelopeBuilder;
use crate::error::{classify_send_error, DeliveryError, SendError};
use crate::transport::Transport;

/// Encodes, signs, compresses and sends one batch, retrying only the network
/// part.
pub struct Delivery<T> {
    transport: T,
    envelope: EnvelopeBuilder,
    backoff: Backoff<SendError>,
}

impl<T: Transport> Delivery<T> {
    pub fn new(transport: T, envelope: EnvelopeBuilder, backoff: Backoff<SendError>) -> Self {
        Self {
            transport,
            envelope,
            backoff,
        }
    }

    /// Builds the standard network retry policy around [`classify_send_error`].
    pub fn network_backoff(max_retries: u16) -> Backoff<SendError> {
        Backoff::new(max_retries, classify_send_error)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the number of network attempts on success.
    pub async fn deliver(
        &self,
        batch: &[MetricRecord],
        cancel: &CancellationToken,
    ) -> Result<u32, DeliveryError> {
        let payload = serde_json::to_vec(batch)?;
        let envelope = self.envelope.build(&payload)?;

        let mut attempts = 0u32;
        self.backoff
            .run(cancel, || {
                attempts += 1;
                self.transport.post(&envelope)
            })
            .await?;
        Ok(attempts)
    }
}
