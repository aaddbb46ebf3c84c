//! services/api/src/adapters/reader.rs
//!
//! This module contains the adapter for the external markdown extraction
//! service (a Jina-Reader-compatible endpoint). It implements the
//! `MarkdownExtractor` port from the `core` crate.
//!
//! The remote contract is `GET {base}/{target_url}` returning the page as
//! markdown text. The request timeout bounds the only long-blocking call in
//! the system; no locks are held while it is in flight.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use ctxt_core::ports::{ExtractError, MarkdownExtractor};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `MarkdownExtractor` port against a
/// Jina-Reader-style HTTP service.
#[derive(Clone)]
pub struct JinaReaderAdapter {
    client: Client,
    base_url: String,
}

impl JinaReaderAdapter {
    /// Creates a new `JinaReaderAdapter` with a bounded per-request timeout.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

//=========================================================================================
// `MarkdownExtractor` Trait Implementation
//=========================================================================================

#[async_trait]
impl MarkdownExtractor for JinaReaderAdapter {
    async fn fetch_markdown(&self, url: &Url) -> Result<String, ExtractError> {
        let target = format!("{}/{}", self.base_url.trim_end_matches('/'), url);

        let response = self.client.get(&target).send().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::Timeout
            } else {
                ExtractError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::UpstreamStatus(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::Timeout
            } else {
                ExtractError::Transport(e.to_string())
            }
        })
    }
}
