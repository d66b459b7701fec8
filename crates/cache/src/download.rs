use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use reqwest::StatusCode;
use thiserror::Error;

use crate::buffer::ChunkBuffer;
use crate::progress::ProgressObserver;

/// A download attempt failed. Attempts are never retried; the first failure
/// surfaces to the caller.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request could not be sent or the body stream failed mid-transfer.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("download of {url} failed with status {status}")]
    Status { url: String, status: StatusCode },
}

/// Streams HTTP response bodies into pre-sized buffers with per-chunk
/// progress reporting.
///
/// Issues a single GET per download. When the response declares a non-zero
/// `Content-Length`, the body is streamed into a [`ChunkBuffer`] of that size
/// and the observer is invoked once per chunk. Without a usable declared
/// length the whole body is buffered in one read and the observer is never
/// invoked.
pub struct ChunkedDownloader {
    client: reqwest::Client,
}

impl ChunkedDownloader {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Share an HTTP client with other components so connections are pooled.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn download(
        &self,
        url: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let declared = response.content_length().unwrap_or(0);
        if declared == 0 {
            warn!(
                "Content-Length missing or zero for {}; downloading without progress",
                url
            );
            let body = response.bytes().await?;
            return Ok(body.to_vec());
        }

        debug!("downloading {} ({} declared bytes)", url, declared);
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownloadError::from));
        read_chunked(declared as usize, stream, observer).await
    }
}

impl Default for ChunkedDownloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a body stream into a buffer pre-sized to the declared length,
/// reporting progress after every chunk.
///
/// A buffer grow can lower the raw received/capacity ratio, so reports are
/// clamped to the highest fraction seen; the observer always sees a
/// non-decreasing sequence.
async fn read_chunked<S, B>(
    declared: usize,
    mut stream: S,
    observer: &dyn ProgressObserver,
) -> Result<Vec<u8>, DownloadError>
where
    S: Stream<Item = Result<B, DownloadError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut buffer = ChunkBuffer::with_capacity(declared);
    let mut reported = 0.0f64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.extend_from_chunk(chunk.as_ref());
        reported = reported.max(buffer.fraction());
        observer.progress(reported);
    }

    debug!("received {} of {} declared bytes", buffer.len(), declared);
    Ok(buffer.into_bytes())
}
