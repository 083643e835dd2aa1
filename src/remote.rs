//! Fetching ToS documents from a channel's `tos.json` endpoint.

use crate::channel::Channel;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::RemoteMetadata;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use std::time::Duration;

/// Well-known ToS endpoint under a channel's base URL
pub const TOS_ENDPOINT: &str = "tos.json";

/// Source of published ToS documents
pub trait RemoteSource {
    /// Fetch the current ToS for `channel`.
    ///
    /// Fails with [`Error::Missing`] when the channel publishes no ToS (or is
    /// unreachable) and [`Error::Invalid`] when the document is malformed.
    fn fetch(&self, channel: &Channel) -> Result<RemoteMetadata>;
}

impl<R: RemoteSource + ?Sized> RemoteSource for &R {
    fn fetch(&self, channel: &Channel) -> Result<RemoteMetadata> {
        (**self).fetch(channel)
    }
}

pub fn endpoint_url(channel: &Channel) -> String {
    format!("{}/{TOS_ENDPOINT}", channel.base_url())
}

/// Single-attempt HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
}

impl HttpRemote {
    /// `request_timeout` bounds the whole request (connect, headers and body)
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        // no credentials are configured on this client: ToS must be public
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http {
                msg: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.connect_timeout, settings.request_timeout)
    }
}

impl RemoteSource for HttpRemote {
    fn fetch(&self, channel: &Channel) -> Result<RemoteMetadata> {
        let url = endpoint_url(channel);
        let missing = || Error::Missing {
            channel: channel.base_url(),
        };

        tracing::debug!(%url, "Fetching ToS");
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| {
                tracing::debug!(%url, error = %e, "ToS endpoint unreachable");
                missing()
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(%url, "Channel has no ToS");
            return Err(missing());
        }
        if !status.is_success() {
            tracing::warn!(%url, %status, "ToS endpoint returned an error");
            return Err(missing());
        }

        let body = response.text().map_err(|e| {
            tracing::debug!(%url, error = %e, "Failed to read ToS body");
            missing()
        })?;

        serde_json::from_str(&body).map_err(|e| Error::Invalid {
            channel: channel.base_url(),
            reason: e.to_string(),
        })
    }
}
