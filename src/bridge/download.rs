//! Concurrent download of channel-hosted file attachments.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::activity::Attachment;
use crate::host::{Element, HttpSession, SessionError};

/// MIME type used when content sniffing finds nothing.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Name used for attachments that carry none.
const FALLBACK_NAME: &str = "attachment";

/// Fetches attachment download URLs and stores the bytes in the session.
#[derive(Debug, Clone)]
pub struct AttachmentDownloader {
    client: reqwest::Client,
}

impl AttachmentDownloader {
    /// Create a downloader with the given transport timeouts.
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self { client }
    }

    /// Download every attachment exposing a `downloadUrl` and persist it as
    /// an inline session element.
    ///
    /// Fetches run concurrently; results keep input order. Non-200 answers,
    /// empty bodies and transport failures drop that attachment only.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if a downloaded file cannot be persisted.
    pub async fn download_all(
        &self,
        session: &HttpSession,
        attachments: &[Attachment],
    ) -> Result<Vec<Element>, SessionError> {
        if attachments.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = attachments.iter().filter_map(|attachment| {
            let url = attachment.download_url()?;
            let name = attachment.name.as_deref().unwrap_or(FALLBACK_NAME);
            Some(self.fetch(name, url))
        });
        let downloaded = join_all(fetches).await;

        let mut elements = Vec::with_capacity(downloaded.len());
        for (name, bytes) in downloaded.into_iter().flatten() {
            let mime = infer::get(&bytes).map_or(FALLBACK_MIME, |kind| kind.mime_type());
            let file = session.persist_file(name, mime, &bytes).await?;
            elements.push(Element::from_persisted(&file));
        }
        debug!(
            session_id = session.id(),
            requested = attachments.len(),
            stored = elements.len(),
            "attachments downloaded"
        );
        Ok(elements)
    }

    async fn fetch<'a>(&self, name: &'a str, url: &str) -> Option<(&'a str, Vec<u8>)> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(file = name, error = %e, "attachment download failed");
                return None;
            }
        };
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(file = name, status = status.as_u16(), "attachment download rejected");
            return None;
        }
        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => {
                debug!(file = name, "attachment download returned no content");
                None
            }
            Ok(bytes) => Some((name, bytes.to_vec())),
            Err(e) => {
                warn!(file = name, error = %e, "attachment body read failed");
                None
            }
        }
    }
}
