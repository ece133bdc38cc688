//! Streaming archive downloader
//!
//! Copies an HTTP body to disk through a `.part` sibling file and renames it
//! into place only once the transfer completed, so the destination path never
//! holds a truncated archive.

use async_trait::async_trait;
use bridge_traits::{
    archive::ArchiveDownloader,
    error::{BridgeError, Result},
    http::HttpClient,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// How long the server may stay silent before a download counts as stalled
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// [`ArchiveDownloader`] backed by an [`HttpClient`] byte stream
pub struct StreamingDownloader {
    http_client: Arc<dyn HttpClient>,
    idle_timeout: Duration,
}

impl StreamingDownloader {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Fail the download when opening the stream or any single read takes
    /// longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    fn stalled(&self) -> BridgeError {
        BridgeError::OperationFailed(format!(
            "Download stalled: no data for {:?}",
            self.idle_timeout
        ))
    }

    fn part_path(dest: &Path) -> PathBuf {
        let mut name = dest.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    async fn copy_to_part(
        &self,
        url: &str,
        part: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut reader = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            stream = tokio::time::timeout(
                self.idle_timeout,
                self.http_client.download_stream(url.to_string()),
            ) => stream.map_err(|_| self.stalled())??,
        };

        let file = fs::File::create(part).await?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
                read = tokio::time::timeout(self.idle_timeout, reader.read(&mut buffer)) => {
                    read.map_err(|_| self.stalled())??
                }
            };
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            written += read as u64;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl ArchiveDownloader for StreamingDownloader {
    #[instrument(skip(self, url, cancel), fields(dest = %dest.display()))]
    async fn download_to_path(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part = Self::part_path(dest);
        match self.copy_to_part(url, &part, cancel).await {
            Ok(bytes) => {
                fs::rename(&part, dest).await?;
                debug!(bytes, "Download complete");
                Ok(bytes)
            }
            Err(error) => {
                if let Err(cleanup) = fs::remove_file(&part).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(error = %cleanup, part = %part.display(), "Failed to remove partial download");
                    }
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use mockall::mock;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(
                &self,
                url: String,
            ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    /// Yields a prefix and then fails, like a connection dropped mid-body.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            self.sent = true;
            buf.put_slice(b"PK\x03\x04partial");
            Poll::Ready(Ok(()))
        }
    }

    /// Never produces data, like a server that stopped sending mid-body.
    struct StalledReader;

    impl AsyncRead for StalledReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_download_writes_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("staging").join("movie.zip");

        let mut mock = MockHttpClient::new();
        mock.expect_download_stream()
            .withf(|url| url == "https://dl.example.com/1.zip")
            .times(1)
            .returning(|_| Ok(Box::new(io::Cursor::new(b"archive-bytes".to_vec()))));

        let downloader = StreamingDownloader::new(Arc::new(mock));
        let written = downloader
            .download_to_path("https://dl.example.com/1.zip", &dest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
        assert!(!StreamingDownloader::part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.zip");

        let mut mock = MockHttpClient::new();
        mock.expect_download_stream()
            .returning(|_| Ok(Box::new(BrokenReader { sent: false })));

        let downloader = StreamingDownloader::new(Arc::new(mock));
        let result = downloader
            .download_to_path("https://dl.example.com/1.zip", &dest, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert!(!dest.exists());
        assert!(!StreamingDownloader::part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_unreachable_url_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.zip");

        let mut mock = MockHttpClient::new();
        mock.expect_download_stream().returning(|_| {
            Err(BridgeError::OperationFailed("HTTP error: 404 Not Found".to_string()))
        });

        let downloader = StreamingDownloader::new(Arc::new(mock));
        let result = downloader
            .download_to_path("https://dl.example.com/1.zip", &dest, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_stops() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.zip");

        let mut mock = MockHttpClient::new();
        mock.expect_download_stream()
            .returning(|_| Ok(Box::new(tokio::io::empty())));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let downloader = StreamingDownloader::new(Arc::new(mock));
        let result = downloader
            .download_to_path("https://dl.example.com/1.zip", &dest, &cancel)
            .await;

        assert!(matches!(result, Err(BridgeError::Cancelled)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_stalled_download_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.zip");

        let mut mock = MockHttpClient::new();
        mock.expect_download_stream()
            .returning(|_| Ok(Box::new(StalledReader)));

        let downloader =
            StreamingDownloader::new(Arc::new(mock)).with_idle_timeout(Duration::from_millis(50));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            downloader.download_to_path(
                "https://dl.example.com/1.zip",
                &dest,
                &CancellationToken::new(),
            ),
        )
        .await
        .expect("stalled download should give up on its own");

        assert!(matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg.starts_with("Download stalled")));
        assert!(!dest.exists());
        assert!(!StreamingDownloader::part_path(&dest).exists());
    }
}
