//! Byte transport to pre-signed destinations.
//!
//! A transfer is one HTTP PUT of the staged bytes to the URL a grant named.
//! The transport does not retry: a signed URL may have expired by the time
//! a retry fires, so retrying is left to the caller, which can fetch a
//! fresh grant first.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from moving bytes to storage.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The request could not be sent or the connection failed
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The storage endpoint answered with a non-success status
    #[error("upload rejected with HTTP status {status}")]
    Status { status: u16 },
}

/// Moves one payload to a pre-signed destination.
#[async_trait]
pub trait ByteTransport: Send + Sync {
    async fn put(&self, url: &str, content_type: &str, body: Bytes) -> Result<(), TransferError>;
}

/// HTTP PUT transport backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing client and its connection pool and timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteTransport for HttpTransport {
    async fn put(&self, url: &str, content_type: &str, body: Bytes) -> Result<(), TransferError> {
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransferError::Status {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = TransferError::Status { status: 403 };
        assert_eq!(err.to_string(), "upload rejected with HTTP status 403");
    }
}
