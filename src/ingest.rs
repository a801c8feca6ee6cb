// src/ingest.rs
//! Feeding framed sentences from a byte stream into the publisher

use crate::{
    error::Result,
    gps::{is_rmc, parse_rmc, serial::SentenceReader},
    publisher::Publisher,
};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one ingestion run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub sentences: usize,
    pub published: usize,
    pub no_fix: usize,
    pub rejected: usize,
}

/// Read sentences until the stream ends or `cancel` fires, publishing every
/// RMC sentence that parses. Other sentence types are ignored.
pub async fn ingest<R>(reader: R, publisher: &Publisher, cancel: CancellationToken) -> Result<IngestStats>
where
    R: AsyncRead + Unpin,
{
    let mut reader = SentenceReader::new(reader);
    let mut stats = IngestStats::default();

    loop {
        let sentence = tokio::select! {
            _ = cancel.cancelled() => break,
            sentence = reader.next_sentence() => sentence?,
        };
        let Some(sentence) = sentence else {
            info!("end of GPS stream");
            break;
        };
        stats.sentences += 1;

        if !is_rmc(&sentence) {
            continue;
        }
        match parse_rmc(&sentence) {
            Ok(reading) => {
                publisher.publish(reading).await?;
                stats.published += 1;
            }
            Err(e) if e.is_no_fix() => {
                debug!("no fix yet");
                stats.no_fix += 1;
            }
            Err(e) => {
                warn!(error = %e, sentence = %sentence, "error parsing gps output");
                stats.rejected += 1;
            }
        }
    }

    Ok(stats)
}
