//! The `Uploader` capability: an abstract sink for chunk/manifest bytes.
//!
//! Concrete transports (HTTP, object storage, TLS policy) are external
//! collaborators; this crate only defines the contract they must satisfy
//! and ships a [`NullUploader`] for testing and for callers that only want
//! local file output.

use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;

use crate::config::RetryPolicy;
use crate::error::UploadError;

/// A `(name, value)` request header pair.
pub type Header = (String, String);

/// The write half of a chunked-transfer upload. Sending never blocks past
/// the channel's bound, which is how a slow network applies backpressure to
/// the producer (see the concurrency model). Dropping or calling
/// [`ChunkedSink::close`] signals end-of-body to the uploader thread.
pub struct ChunkedSink {
    sender: Option<SyncSender<Bytes>>,
    join_handle: Option<JoinHandle<Result<(), UploadError>>>,
}

impl ChunkedSink {
    pub fn send(&mut self, data: Bytes) -> Result<(), UploadError> {
        match &self.sender {
            Some(sender) => sender.send(data).map_err(|_| UploadError::Io {
                dst: "chunked-transfer".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "uploader thread gone"),
            }),
            None => Ok(()),
        }
    }

    /// Closes the channel and waits for the uploader thread to finish its request.
    pub fn close(&mut self) -> Result<(), UploadError> {
        self.sender.take();
        if let Some(handle) = self.join_handle.take() {
            return handle
                .join()
                .unwrap_or_else(|_| Err(UploadError::Io {
                    dst: "chunked-transfer".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "uploader thread panicked"),
                }));
        }
        Ok(())
    }
}

impl Drop for ChunkedSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Abstract destination for chunk and manifest bytes.
///
/// Implementations are expected to be cheap to clone/share (e.g. an `Arc`
/// around an HTTP client) since one instance is handed to every `Chunk`.
pub trait Uploader: Send + Sync {
    /// Uploads an in-memory buffer in one request, with the configured
    /// retry policy applied by the implementation for retriable statuses.
    fn upload_data(&self, data: Bytes, dst: &Path, headers: &[Header]) -> Result<(), UploadError>;

    /// Uploads the contents of a local file, used for buffered HTTP / object
    /// store chunk modes where bytes were staged to a temp file first.
    fn upload_local_file(&self, src: &Path, dst: &Path, headers: &[Header]) -> Result<(), UploadError>;

    /// Opens a long-lived chunked-transfer request; bytes written to the
    /// returned sink are streamed as they arrive.
    fn upload_chunked_transfer(&self, dst: &Path, headers: &[Header]) -> ChunkedSink;
}

/// An uploader that discards everything. Used for `ChunkDestination::None`/
/// `ManifestDestination::None` and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUploader;

impl Uploader for NullUploader {
    fn upload_data(&self, _data: Bytes, _dst: &Path, _headers: &[Header]) -> Result<(), UploadError> {
        Ok(())
    }

    fn upload_local_file(&self, _src: &Path, _dst: &Path, _headers: &[Header]) -> Result<(), UploadError> {
        Ok(())
    }

    fn upload_chunked_transfer(&self, _dst: &Path, _headers: &[Header]) -> ChunkedSink {
        let (tx, rx): (SyncSender<Bytes>, Receiver<Bytes>) = sync_channel(1);
        let handle = std::thread::spawn(move || {
            while rx.recv().is_ok() {}
            Ok(())
        });
        ChunkedSink {
            sender: Some(tx),
            join_handle: Some(handle),
        }
    }
}

/// Runs `attempt` under the linear retry policy described in the design
/// notes: HTTP 503 is retried up to `policy.max_retries` times with delay
/// `policy.delay_ms(retry_intent)`; any other failure is returned immediately.
///
/// `attempt` returns `Ok(())` on success, or `Err((status, err))` where
/// `status` is the HTTP status observed (use 0 for non-HTTP failures, which
/// are always treated as non-retriable).
pub fn upload_with_retries<F>(
    dst: &str,
    policy: &RetryPolicy,
    sleep: impl Fn(Duration),
    mut attempt: F,
) -> Result<(), UploadError>
where
    F: FnMut() -> Result<(), (u16, UploadError)>,
{
    let mut retry_intent = 0u32;
    loop {
        match attempt() {
            Ok(()) => return Ok(()),
            Err((503, err)) => {
                if retry_intent >= policy.max_retries {
                    tracing::error!(dst, retry_intent, "upload retries exhausted");
                    return Err(err);
                }
                let delay = policy.delay_ms(retry_intent);
                tracing::warn!(dst, retry_intent, delay_ms = delay, "retrying upload after 503");
                sleep(Duration::from_millis(delay));
                retry_intent += 1;
            }
            Err((status, err)) => {
                tracing::error!(dst, status, "non-retriable upload failure");
                return Err(err);
            }
        }
    }
}
