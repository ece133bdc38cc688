//! put.io API connector implementation
//!
//! Implements the `RemoteGateway` trait for put.io API v2.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{ArchiveJob, ArchiveJobId, FileId, RemoteFile, RemoteGateway};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::PutioError;
use crate::types::{ErrorResponse, FilesListResponse, PutioFile, ZipCreateResponse, ZipStatusResponse};

/// put.io API base URL
pub const PUTIO_API_BASE: &str = "https://api.put.io/v2";

/// Id of the account's root folder
const ROOT_FOLDER_ID: i64 = 0;

/// Per-request timeout handed to the HTTP client
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// put.io API connector
///
/// # Example
///
/// ```ignore
/// use provider_putio::PutioConnector;
/// use bridge_traits::storage::RemoteGateway;
///
/// let connector = PutioConnector::new(http_client, oauth_token);
/// let files = connector.list_root_files().await?;
/// ```
pub struct PutioConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// OAuth token issued by put.io
    oauth_token: String,

    /// API base URL, overridable for tests and proxies
    base_url: String,

    /// Backoff for throttled, failed or unreachable requests
    retry_policy: RetryPolicy,
}

impl PutioConnector {
    /// Create a new put.io connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `oauth_token` - OAuth token from the put.io account settings
    pub fn new(http_client: Arc<dyn HttpClient>, oauth_token: impl Into<String>) -> Self {
        Self {
            http_client,
            oauth_token: oauth_token.into(),
            base_url: PUTIO_API_BASE.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Point the connector at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn convert_file(file: PutioFile) -> RemoteFile {
        RemoteFile::new(FileId::from(file.id), file.name)
    }

    /// Turn a non-2xx response into a provider error, preferring the API's
    /// own message when the body carries one.
    fn api_error(response: &HttpResponse) -> PutioError {
        let message = response
            .json::<ErrorResponse>()
            .ok()
            .and_then(|body| body.error_message.or(body.error_type))
            .unwrap_or_else(|| response.text_lossy());

        match response.status {
            401 => PutioError::AuthenticationFailed(message),
            404 => PutioError::NotFound(message),
            status_code => PutioError::ApiError {
                status_code,
                message,
            },
        }
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            PutioError::ParseError(format!("Failed to parse {} response: {}", what, e)).into()
        })
    }

    /// Execute API request with retry logic
    ///
    /// Retries 429, 5xx and transport failures with exponential backoff; any
    /// other non-2xx status is returned immediately.
    #[instrument(skip(self, form), fields(url = %url))]
    async fn execute_with_retry(
        &self,
        method: HttpMethod,
        url: String,
        form: Option<&[(&str, &str)]>,
    ) -> Result<HttpResponse> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let mut request = HttpRequest::new(method, url.clone())
                .bearer_token(&self.oauth_token)
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);
            if let Some(fields) = form {
                request = request.form(fields);
            }

            attempt += 1;
            match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(
                            status = response.status,
                            attempts = attempt,
                            "API request failed after retries"
                        );
                        return Err(Self::api_error(&response).into());
                    }

                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        status = response.status,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    warn!(status = response.status, "API request rejected");
                    return Err(Self::api_error(&response).into());
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(error = %e, attempts = attempt, "API request failed after retries");
                        return Err(e);
                    }

                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for PutioConnector {
    #[instrument(skip(self))]
    async fn list_root_files(&self) -> Result<Vec<RemoteFile>> {
        let url = self.url(&format!("/files/list?parent_id={}", ROOT_FOLDER_ID));
        let response = self.execute_with_retry(HttpMethod::Get, url, None).await?;
        let list: FilesListResponse = Self::parse(&response, "files list")?;

        let files: Vec<RemoteFile> = list.files.into_iter().map(Self::convert_file).collect();
        debug!(count = files.len(), "Listed root folder");
        Ok(files)
    }

    #[instrument(skip(self))]
    async fn clean_stale_transfers(&self) -> Result<()> {
        let url = self.url("/transfers/clean");
        self.execute_with_retry(HttpMethod::Post, url, Some(&[]))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn create_archive(&self, file_id: &FileId) -> Result<ArchiveJobId> {
        let url = self.url("/zips/create");
        let response = self
            .execute_with_retry(HttpMethod::Post, url, Some(&[("file_ids", file_id.as_str())]))
            .await?;
        let created: ZipCreateResponse = Self::parse(&response, "zip create")?;

        info!(zip_id = created.zip_id, "Requested zip");
        Ok(ArchiveJobId::from(created.zip_id))
    }

    #[instrument(skip(self), fields(zip_id = %job_id))]
    async fn get_archive_status(&self, job_id: &ArchiveJobId) -> Result<ArchiveJob> {
        let url = self.url(&format!("/zips/{}", job_id));
        let response = self.execute_with_retry(HttpMethod::Get, url, None).await?;
        let status: ZipStatusResponse = Self::parse(&response, "zip status")?;

        if let Some(zip_status) = status.zip_status.as_deref() {
            if zip_status.eq_ignore_ascii_case("ERROR") {
                return Err(PutioError::ArchiveFailed {
                    zip_id: job_id.to_string(),
                    status: zip_status.to_string(),
                }
                .into());
            }
        }

        Ok(match status.url {
            Some(url) => ArchiveJob::ready(job_id.clone(), url),
            None => ArchiveJob::pending(job_id.clone()),
        })
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    async fn delete_remote_file(&self, file_id: &FileId) -> Result<()> {
        let url = self.url("/files/delete");
        self.execute_with_retry(HttpMethod::Post, url, Some(&[("file_ids", file_id.as_str())]))
            .await?;
        info!("Deleted remote file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use mockall::mock;
    use mockall::Sequence;
    use std::collections::HashMap;

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

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    fn connector(mock: MockHttpClient) -> PutioConnector {
        PutioConnector::new(Arc::new(mock), "test_token")
            .with_base_url("https://api.test/v2/")
            .with_retry_policy(fast_retry())
    }

    #[test]
    fn test_convert_file() {
        let file = PutioFile {
            id: 42,
            name: "Movie (2020)".to_string(),
            parent_id: Some(0),
            size: Some(1024),
            file_type: Some("FOLDER".to_string()),
        };

        let remote = PutioConnector::convert_file(file);
        assert_eq!(remote.id.as_str(), "42");
        assert_eq!(remote.name, "Movie (2020)");
    }

    #[tokio::test]
    async fn test_list_root_files_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Get
                    && request.url == "https://api.test/v2/files/list?parent_id=0"
                    && request.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer test_token")
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{
                        "files": [
                            {"id": 1, "name": "A", "parent_id": 0},
                            {"id": 2, "name": "B", "parent_id": 0}
                        ],
                        "status": "OK"
                    }"#,
                ))
            });

        let files = connector(mock_http).list_root_files().await.unwrap();
        assert_eq!(
            files,
            vec![RemoteFile::new("1", "A"), RemoteFile::new("2", "B")]
        );
    }

    #[tokio::test]
    async fn test_create_archive_posts_file_id() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "https://api.test/v2/zips/create"
                    && request.body.as_deref() == Some(&b"file_ids=77"[..])
            })
            .times(1)
            .returning(|_| Ok(response(200, r#"{"zip_id": 901, "status": "OK"}"#)));

        let job = connector(mock_http)
            .create_archive(&FileId::from(77_i64))
            .await
            .unwrap();
        assert_eq!(job.as_str(), "901");
    }

    #[tokio::test]
    async fn test_archive_status_pending_then_ready() {
        let mut seq = Sequence::new();
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|request| request.url == "https://api.test/v2/zips/901")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"url": false, "zip_status": "PROCESSING"}"#)));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"url": "https://zips.test/901.zip", "zip_status": "DONE"}"#,
                ))
            });

        let connector = connector(mock_http);
        let job_id = ArchiveJobId::from(901_i64);

        let pending = connector.get_archive_status(&job_id).await.unwrap();
        assert_eq!(pending.download_url, None);

        let ready = connector.get_archive_status(&job_id).await.unwrap();
        assert_eq!(ready.download_url.as_deref(), Some("https://zips.test/901.zip"));
    }

    #[tokio::test]
    async fn test_archive_status_error_is_reported() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(response(200, r#"{"url": false, "zip_status": "ERROR"}"#)));

        let result = connector(mock_http)
            .get_archive_status(&ArchiveJobId::from(5_i64))
            .await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg.contains("Zip 5")));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut seq = Sequence::new();
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(503, "unavailable")));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"status": "OK"}"#)));

        connector(mock_http)
            .delete_remote_file(&FileId::from(3_i64))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Ok(response(429, "slow down")));

        let result = connector(mock_http).clean_stale_transfers().await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let mut seq = Sequence::new();
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BridgeError::OperationFailed("Connection failed".to_string())));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"files": []}"#)));

        let files = connector(mock_http).list_root_files().await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                400,
                r#"{"error_message": "Invalid file id", "error_type": "BadRequest", "status_code": 400}"#,
            ))
        });

        let result = connector(mock_http).delete_remote_file(&FileId::from(9_i64)).await;
        assert!(
            matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg == "API error (status 400): Invalid file id")
        );
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                404,
                r#"{"error_message": "File not found", "error_type": "NotFound", "status_code": 404}"#,
            ))
        });

        let result = connector(mock_http).delete_remote_file(&FileId::from(9_i64)).await;
        assert!(matches!(result, Err(BridgeError::NotFound(ref msg)) if msg == "File not found"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(401, r#"{"error_type": "invalid_grant"}"#)));

        let result = connector(mock_http).list_root_files().await;
        assert!(
            matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg == "Authentication failed: invalid_grant")
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_parse_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(response(200, "<html>")));

        let result = connector(mock_http).create_archive(&FileId::from(1_i64)).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(ref msg)) if msg.starts_with("Parse error")));
    }
}
