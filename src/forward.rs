// src/forward.rs
//! Forwarding RMC sentences from a local receiver to a relay server

use crate::{
    error::{RelayError, Result},
    gps::{is_rmc, serial::SentenceReader},
};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Form field the server reads the sentence from
pub const OUTPUT_FIELD: &str = "Output";

/// Posts sentences to `<server>/marker`
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl Forwarder {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/marker", server_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one sentence and return the server's status
    pub async fn forward(&self, sentence: &str) -> Result<StatusCode> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[(OUTPUT_FIELD, sentence)])
            .send()
            .await?;
        Ok(response.status())
    }

    /// Forward every RMC sentence read from `reader` until it ends or
    /// `cancel` fires. Failed posts are logged and skipped.
    pub async fn run<R>(&self, reader: R, cancel: CancellationToken) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        info!(endpoint = %self.endpoint, "forwarding GPS sentences");
        let mut reader = SentenceReader::new(reader);
        let mut forwarded = 0;

        loop {
            let sentence = tokio::select! {
                _ = cancel.cancelled() => break,
                sentence = reader.next_sentence() => sentence?,
            };
            let Some(sentence) = sentence else {
                break;
            };
            if !is_rmc(&sentence) {
                continue;
            }

            match self.forward(&sentence).await {
                Ok(status) if status.is_success() => {
                    debug!(%status, "sentence accepted");
                    forwarded += 1;
                }
                Ok(status) => warn!(%status, sentence = %sentence, "server rejected sentence"),
                Err(RelayError::Http(e)) => warn!(error = %e, "failed to reach server"),
                Err(e) => return Err(e),
            }
        }

        Ok(forwarded)
    }
}
