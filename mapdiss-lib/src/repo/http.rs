//! HTTP repository implementation

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::RemoteResourceInfo;
use super::Repository;
use crate::error::RepoError;
use crate::geodata::ResourceType;

/// Default request timeout. The upstream transport would otherwise block
/// indefinitely on a stalled fetch.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shape of the repository's metadata endpoint payload.
#[derive(Debug, Deserialize)]
struct MetadataPayload {
    /// Resource modification time, RFC 3339.
    modified: DateTime<Utc>,
    /// Reported MIME type.
    mime: String,
}

/// Repository client speaking HTTP.
///
/// An identifier is dereferenced with a redirect-following `HEAD` request
/// to find the canonical resource URL; the resource's `/metadata`
/// endpoint then yields the modification time and MIME type as JSON.
///
/// # Example
///
/// ```ignore
/// use mapdiss_lib::repo::HttpRepository;
///
/// let repo = HttpRepository::builder()
///     .timeout(std::time::Duration::from_secs(10))
///     .build()?;
/// let info = repo.lookup("https://repo.example.org/resource/12345").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpRepository {
    client: Client,
}

impl HttpRepository {
    /// Creates a repository client with the default 30 s timeout.
    pub fn new() -> Result<Self, RepoError> {
        Self::builder().build()
    }

    /// Creates a builder for customizing the client.
    pub fn builder() -> HttpRepositoryBuilder {
        HttpRepositoryBuilder::default()
    }
}

/// Builder for [`HttpRepository`].
#[derive(Debug, Default)]
pub struct HttpRepositoryBuilder {
    timeout: Option<Duration>,
    client: Option<Client>,
}

impl HttpRepositoryBuilder {
    /// Sets the request timeout.
    ///
    /// Defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets a custom HTTP client. A client given here takes precedence
    /// over the builder's timeout.
    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the repository client.
    pub fn build(self) -> Result<HttpRepository, RepoError> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };
        Ok(HttpRepository { client })
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn lookup(&self, id: &str) -> Result<RemoteResourceInfo, RepoError> {
        // Follow redirects to find the real resource URL.
        let response = self.client.head(id).send().await?;
        let canonical = normalize_canonical(response.url().clone());
        debug!(id, canonical = %canonical, "resolved canonical location");

        let metadata_url = format!("{}/metadata", canonical);
        let response = self.client.get(&metadata_url).send().await?;
        if !response.status().is_success() {
            return Err(RepoError::metadata(metadata_url, response.status().as_u16()));
        }
        let payload: MetadataPayload = response
            .json()
            .await
            .map_err(|e| RepoError::parse(format!("invalid metadata payload: {e}")))?;

        let kind = ResourceType::from_mime(&payload.mime)
            .ok_or_else(|| RepoError::unsupported_format(&payload.mime))?;

        Ok(RemoteResourceInfo {
            modified_at: payload.modified,
            kind,
            location: canonical,
        })
    }

    async fn download(&self, location: &Url, dest: &Path) -> Result<u64, RepoError> {
        let response = self
            .client
            .get(location.clone())
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Strips a trailing `/metadata` segment from a redirect-resolved URL.
///
/// Following redirects on an identifier can land directly on the metadata
/// endpoint; the canonical resource URL is its parent.
fn normalize_canonical(url: Url) -> Url {
    match url.as_str().strip_suffix("/metadata") {
        Some(stripped) => Url::parse(stripped).unwrap_or(url),
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_canonical_strips_metadata_suffix() {
        let url = Url::parse("https://repo.example.org/resource/123/metadata").unwrap();
        assert_eq!(
            normalize_canonical(url).as_str(),
            "https://repo.example.org/resource/123"
        );
    }

    #[test]
    fn test_normalize_canonical_leaves_plain_urls() {
        let url = Url::parse("https://repo.example.org/resource/123").unwrap();
        assert_eq!(normalize_canonical(url.clone()), url);
    }

    #[test]
    fn test_metadata_payload_shape() {
        let payload: MetadataPayload =
            serde_json::from_str(r#"{"modified":"2023-04-01T12:30:00Z","mime":"image/tiff"}"#)
                .unwrap();
        assert_eq!(payload.mime, "image/tiff");
        assert_eq!(
            payload.modified,
            DateTime::parse_from_rfc3339("2023-04-01T12:30:00Z").unwrap()
        );
    }
}
