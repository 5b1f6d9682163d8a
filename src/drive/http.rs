//! Drive v3 REST client
//!
//! Implements [`RemoteStore`] over HTTP. Content is streamed in both
//! directions: downloads are exposed as an `AsyncRead` over the response body,
//! uploads send a `multipart/related` body whose media part is read from the
//! source as the request goes out.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};

use super::client::{byte_source, ByteSource, RemoteStore};
use super::error::DriveError;
use super::types::{FileListPage, ListQuery, RemoteFile};
use crate::collaborators::auth::Authenticator;
use crate::config::DriveEndpoints;

/// Fields requested back from create calls
const CREATE_FIELDS: &str = "id,name,mimeType";

/// Read size when streaming an upload body
const UPLOAD_READ_CAPACITY: usize = 64 * 1024;

/// Longest server error body echoed into an error message
const MAX_ERROR_BODY: usize = 512;

/// Remote store speaking the Drive v3 REST contract
pub struct HttpRemoteStore {
    client: reqwest::Client,
    endpoints: DriveEndpoints,
    authenticator: Arc<dyn Authenticator>,
}

impl HttpRemoteStore {
    pub fn new(endpoints: DriveEndpoints, authenticator: Arc<dyn Authenticator>) -> Self {
        // No request timeout: transfers run until they finish or fail
        let client = reqwest::Client::builder()
            .user_agent(concat!("drivelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoints,
            authenticator,
        }
    }

    fn auth_header(&self) -> Result<String, DriveError> {
        self.authenticator
            .current_credential()
            .map(|c| c.authorization_header())
            .ok_or_else(|| DriveError::Auth("No signed-in account".to_string()))
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.endpoints.api_base.trim_end_matches('/'))
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/{}", self.files_url(), id)
    }

    fn upload_url(&self) -> String {
        format!("{}/files", self.endpoints.upload_base.trim_end_matches('/'))
    }

    /// Pass successful responses through, turn the rest into a [`DriveError`]
    async fn check(resp: Response, context: &str) -> Result<Response, DriveError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!("{} failed with HTTP {}", context, status);
        Err(status_error(status, &body, context))
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// Only 401 means the credential is bad. Drive also answers 403 for rate
/// limits, full quota and missing file permissions; those stay transport
/// errors with the server body attached.
pub fn status_error(status: StatusCode, body: &str, context: &str) -> DriveError {
    let detail = truncate_body(body);
    match status {
        StatusCode::UNAUTHORIZED => {
            DriveError::Auth(format!("{} rejected ({}): {}", context, status, detail))
        }
        StatusCode::NOT_FOUND => DriveError::NotFound(context.to_string()),
        _ => DriveError::Transport(format!("{} failed ({}): {}", context, status, detail)),
    }
}

fn truncate_body(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Opening and closing delimiters of a `multipart/related` upload body.
///
/// The media bytes go between the two parts.
pub fn multipart_envelope(boundary: &str, name: &str, mime_type: &str) -> (String, String) {
    let metadata = serde_json::json!({ "name": name, "mimeType": mime_type });
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
        b = boundary,
        m = metadata,
        t = mime_type,
    );
    let tail = format!("\r\n--{}--\r\n", boundary);
    (head, tail)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self, query: &ListQuery) -> Result<FileListPage, DriveError> {
        let auth = self.auth_header()?;
        let resp = self
            .client
            .get(self.files_url())
            .header(AUTHORIZATION, auth)
            .header(ACCEPT, "application/json")
            .query(&[
                ("pageSize", query.page_size.to_string()),
                ("fields", query.fields_selector()),
            ])
            .send()
            .await
            .map_err(|e| DriveError::Transport(format!("List request failed: {}", e)))?;

        let resp = Self::check(resp, "List files").await?;
        let page: FileListPage = resp
            .json()
            .await
            .map_err(|e| DriveError::Transport(format!("Parse list response failed: {}", e)))?;

        if let Some(ref token) = page.next_page_token {
            // Only the first page is used
            debug!("List has more pages (token {}), not following", token);
        }
        info!("Listed {} remote files", page.files.len());
        Ok(page)
    }

    async fn get(&self, id: &str) -> Result<ByteSource, DriveError> {
        let auth = self.auth_header()?;
        let resp = self
            .client
            .get(self.file_url(id))
            .header(AUTHORIZATION, auth)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| DriveError::Transport(format!("Download request failed: {}", e)))?;

        let resp = Self::check(resp, &format!("Download {}", id)).await?;
        let body = resp.bytes_stream().map_err(io::Error::other);
        Ok(byte_source(StreamReader::new(body)))
    }

    async fn create(
        &self,
        name: &str,
        mime_type: &str,
        content: ByteSource,
    ) -> Result<RemoteFile, DriveError> {
        let auth = self.auth_header()?;
        let boundary = format!("drivelink-{}", uuid::Uuid::new_v4().simple());
        let (head, tail) = multipart_envelope(&boundary, name, mime_type);

        let body = stream::once(async move { Ok::<Bytes, io::Error>(Bytes::from(head)) })
            .chain(ReaderStream::with_capacity(content, UPLOAD_READ_CAPACITY))
            .chain(stream::once(async move { Ok(Bytes::from(tail)) }));

        let resp = self
            .client
            .post(self.upload_url())
            .header(AUTHORIZATION, auth)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", CREATE_FIELDS)])
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| DriveError::Transport(format!("Upload request failed: {}", e)))?;

        let resp = Self::check(resp, &format!("Upload {}", name)).await?;
        let created: RemoteFile = resp
            .json()
            .await
            .map_err(|e| DriveError::Transport(format!("Parse upload response failed: {}", e)))?;
        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<(), DriveError> {
        let auth = self.auth_header()?;
        let resp = self
            .client
            .delete(self.file_url(id))
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| DriveError::Transport(format!("Delete request failed: {}", e)))?;

        Self::check(resp, &format!("Delete {}", id)).await?;
        info!("Deleted remote file {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::auth::StaticAuthenticator;

    fn store(auth: StaticAuthenticator) -> HttpRemoteStore {
        HttpRemoteStore::new(DriveEndpoints::default(), Arc::new(auth))
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "", "List files"),
            DriveError::Auth(_)
        ));
        assert!(status_error(StatusCode::NOT_FOUND, "", "Delete x").is_not_found());
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "busy", "Upload"),
            DriveError::Transport(msg) if msg.contains("busy")
        ));
    }

    #[test]
    fn test_forbidden_is_not_reauth() {
        let body = r#"{"error":{"errors":[{"reason":"storageQuotaExceeded"}],"code":403}}"#;
        let err = status_error(StatusCode::FORBIDDEN, body, "Upload notes.txt");
        assert!(!err.requires_reauth());
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("storageQuotaExceeded"));

        let err = status_error(StatusCode::FORBIDDEN, "userRateLimitExceeded", "List files");
        assert!(!err.requires_reauth());
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "é".repeat(1000);
        let err = status_error(StatusCode::BAD_GATEWAY, &body, "List files");
        assert!(err.to_string().len() < body.len());
    }

    #[test]
    fn test_urls() {
        let s = store(StaticAuthenticator::new("t"));
        assert_eq!(s.files_url(), "https://www.googleapis.com/drive/v3/files");
        assert_eq!(s.file_url("abc"), "https://www.googleapis.com/drive/v3/files/abc");
        assert_eq!(s.upload_url(), "https://www.googleapis.com/upload/drive/v3/files");
    }

    #[test]
    fn test_multipart_envelope() {
        let (head, tail) = multipart_envelope("XYZ", "notes.txt", "text/plain");
        assert!(head.starts_with("--XYZ\r\nContent-Type: application/json"));
        assert!(head.contains(r#""name":"notes.txt""#));
        assert!(head.ends_with("--XYZ\r\nContent-Type: text/plain\r\n\r\n"));
        assert_eq!(tail, "\r\n--XYZ--\r\n");
    }

    #[tokio::test]
    async fn test_signed_out_fails_before_network() {
        let s = store(StaticAuthenticator::signed_out());
        let err = s.list(&ListQuery::default()).await.unwrap_err();
        assert!(err.requires_reauth());
        assert!(matches!(s.delete("abc").await, Err(DriveError::Auth(_))));
    }
}
