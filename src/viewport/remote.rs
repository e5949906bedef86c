//! Backend persistence for remembered cameras.
//!
//! `GET|PUT {base}/workflows/viewports` with body `{ "viewports": [...] }`.
//! Base URLs are tried in order; the first success wins. Failures are not
//! retried beyond that list.

use std::future::Future;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::key::ViewportRecord;
use crate::error::RemoteError;

const VIEWPORTS_PATH: &str = "workflows/viewports";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewportEnvelope {
    #[serde(default)]
    pub viewports: Vec<ViewportRecord>,
}

/// Drops records that must never be persisted or applied.
pub fn persistable(records: Vec<ViewportRecord>) -> Vec<ViewportRecord> {
    records.into_iter().filter(|r| r.viewport().is_persistable()).collect()
}

#[derive(Clone, Debug)]
pub struct ViewportClient {
    http: reqwest::Client,
    endpoints: Vec<Url>,
}

fn endpoint_for(base: &str) -> Result<Url, RemoteError> {
    // Url::join replaces the last segment unless the base ends with '/'
    let normalized = format!("{}/", base.trim_end_matches('/'));
    let invalid = |source| RemoteError::InvalidUrl { url: base.to_string(), source };
    Url::parse(&normalized).map_err(invalid)?.join(VIEWPORTS_PATH).map_err(invalid)
}

impl ViewportClient {
    pub fn new<S: AsRef<str>>(candidates: &[S]) -> Result<Self, RemoteError> {
        Self::with_client(reqwest::Client::new(), candidates)
    }

    pub fn with_client<S: AsRef<str>>(http: reqwest::Client, candidates: &[S]) -> Result<Self, RemoteError> {
        if candidates.is_empty() {
            return Err(RemoteError::NoCandidates);
        }
        let endpoints = candidates.iter().map(|c| endpoint_for(c.as_ref())).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &[Url] { &self.endpoints }

    async fn first_success<T, F, Fut>(&self, cancel: &CancellationToken, attempt: F) -> Result<T, RemoteError>
    where
        F: Fn(Url) -> Fut,
        Fut: Future<Output = Result<T, reqwest::Error>>,
    {
        let mut last = String::new();
        for url in &self.endpoints {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                r = attempt(url.clone()) => r,
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) => {
                    log::warn!("viewport endpoint {url} failed: {e}");
                    last = e.to_string();
                }
            }
        }
        Err(RemoteError::Exhausted { attempts: self.endpoints.len(), last })
    }

    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<ViewportRecord>, RemoteError> {
        let envelope = self
            .first_success(cancel, |url| async move {
                self.http.get(url).send().await?.error_for_status()?.json::<ViewportEnvelope>().await
            })
            .await?;
        Ok(persistable(envelope.viewports))
    }

    pub async fn save(&self, records: &[ViewportRecord], cancel: &CancellationToken) -> Result<(), RemoteError> {
        let body = ViewportEnvelope { viewports: persistable(records.to_vec()) };
        self.first_success(cancel, |url| {
            let body = &body;
            async move {
                self.http.put(url).json(body).send().await?.error_for_status()?;
                Ok::<(), reqwest::Error>(())
            }
        })
        .await
    }
}
