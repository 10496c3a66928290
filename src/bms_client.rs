use std::time::Duration;

use tokio::time::sleep;

use crate::battery_sample::BatterySample;
use crate::error::{DecodeError, TransportError};
use crate::message::status_frame::{self, FRAME_LEN};
use crate::transport::Transport;

/// Talks the poll/response protocol over a [`Transport`].
///
/// There is no request correlation on the wire, so only one request is ever
/// outstanding.
pub struct BmsClient<T> {
    transport: T,
    settle_delay: Duration,
    read_timeout: Duration,
}

impl<T: Transport> BmsClient<T> {
    /// `settle_delay` is how long the BMS is given to answer a poll before the
    /// response is read; `read_timeout` bounds the read itself.
    pub fn new(transport: T, settle_delay: Duration, read_timeout: Duration) -> Self {
        Self {
            transport,
            settle_delay,
            read_timeout,
        }
    }

    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }

    /// Poll the BMS and return the raw response.
    ///
    /// The response may be short or empty if the BMS did not answer in time;
    /// that is for the decoder to reject. Only a failure of the byte stream
    /// itself is an error here.
    pub async fn fetch_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        // the tail of an earlier response must not be read as the start of this one
        if let Err(e) = self.transport.discard_input().await {
            tracing::debug!("BMS: failed to discard stale input: {e} (continuing)");
        }

        let rq = status_frame::encode_poll_command();
        tracing::debug!("BMS: TX: {}", hex::encode(rq));
        self.transport.write(&rq).await?;

        sleep(self.settle_delay).await;

        let rsp = self.transport.read(FRAME_LEN, self.read_timeout).await?;
        tracing::debug!("BMS: RX {} bytes: 0x{}", rsp.len(), hex::encode(&rsp));
        Ok(rsp)
    }

    /// Poll once and disconnect.
    ///
    /// A failed poll is reported ahead of a failed disconnect, which is only
    /// logged.
    pub async fn read_once(mut self) -> Result<Result<BatterySample, DecodeError>, TransportError> {
        let raw = self.fetch_frame().await;
        if let Err(e) = self.close().await {
            tracing::warn!("BMS: failed to close transport: {e}");
        }
        Ok(status_frame::decode(&raw?))
    }

    /// Disconnect from the BMS
    pub async fn close(self) -> Result<(), TransportError> {
        self.transport.close().await
    }
}
