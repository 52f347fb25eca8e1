//! Ranged fetch of MKV headers

use super::{extract_tracks, MkvTracks, HEADER_PROBE_BYTES};
use crate::{Error, Result};
use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Downloads the first [`HEADER_PROBE_BYTES`] of a Matroska file and
/// extracts its track list
pub struct HeaderFetcher {
    client: Client,
}

impl HeaderFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// True for URLs the extractor handles
    pub fn is_mkv_url(url: &str) -> bool {
        url.to_ascii_lowercase().contains(".mkv")
    }

    /// Track list of the file at `url`; empty on any failure, and without a
    /// request at all when the URL is not an MKV file
    #[instrument(skip(self))]
    pub async fn fetch_tracks(&self, url: &str) -> MkvTracks {
        if !Self::is_mkv_url(url) {
            return MkvTracks::default();
        }

        match self.fetch_header(url).await {
            Ok(data) => extract_tracks(&data),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "MKV header fetch failed");
                MkvTracks::default()
            }
        }
    }

    /// Raw header prefix
    pub async fn fetch_header(&self, url: &str) -> Result<Bytes> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .get(parsed)
            .header(RANGE, format!("bytes=0-{}", HEADER_PROBE_BYTES - 1))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::MkvFetch {
                url: url.to_string(),
                source: e,
            })?;

        let mut data = response.bytes().await.map_err(|e| Error::MkvFetch {
            url: url.to_string(),
            source: e,
        })?;

        // Servers ignoring Range send the whole file
        data.truncate(HEADER_PROBE_BYTES);
        debug!(bytes = data.len(), "MKV header fetched");
        Ok(data)
    }
}

impl Default for HeaderFetcher {
    fn default() -> Self {
        Self::new()
    }
}
