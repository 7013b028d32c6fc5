//! Handles all interactions with the metadata/info service.
//!
//! Acquiring the next item is a two-step protocol: `GET <info-base>` returns a
//! pointer `{"url": ...}` to a per-item endpoint, and `GET <url>` returns
//! `{"result": {...}}` which is resolved into a `MediaDescriptor`. Both requests
//! go through the retry wrapper in `retry.rs`.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;

use crate::errors::FetchError;
use crate::model::{InfoEnvelope, InfoPointer, MediaDescriptor};
use crate::resolver::{self, ResolveOptions};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Source of info-service JSON documents.
#[async_trait]
pub trait InfoSource: Send + Sync {
    /// Fetches `url` and parses the body as JSON.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError>;
}

/// `InfoSource` backed by `reqwest`, retrying transport and status failures.
#[derive(Clone, Debug)]
pub struct HttpInfoSource {
    client: Client,
    retry: RetryPolicy,
}

impl HttpInfoSource {
    pub fn new(client: Client) -> Self {
        Self { client, retry: RetryPolicy::default() }
    }
}

#[async_trait]
impl InfoSource for HttpInfoSource {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let client = &self.client;
        let response = retry_with_backoff(&self.retry, url, |_| async move {
            let response = client.get(url).send().await.map_err(FetchError::from)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus { status, url: url.to_string() });
            }
            Ok::<_, FetchError>(response)
        })
        .await?;
        // Body decoding is not retried: a malformed document will not get better.
        let value = response.json::<serde_json::Value>().await?;
        Ok(value)
    }
}

/// Runs the two-step protocol and resolves the result.
///
/// `Ok(None)` means the item was fetched but could not be resolved (no usable
/// file name). Protocol violations (`url` or `result` missing) are errors.
#[must_use = "fetching the next item can fail; the Result must be handled"]
pub async fn fetch_descriptor(
    source: &dyn InfoSource,
    info_base: &str,
    options: ResolveOptions,
) -> Result<Option<MediaDescriptor>, FetchError> {
    let pointer: InfoPointer = serde_json::from_value(source.get_json(info_base).await?)?;
    let item_url = pointer
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(FetchError::MissingField("url"))?;
    debug!("Info pointer resolved to {}", item_url);

    let envelope: InfoEnvelope = serde_json::from_value(source.get_json(&item_url).await?)?;
    let record = envelope.result.ok_or(FetchError::MissingField("result"))?;
    Ok(resolver::resolve(&item_url, &record, options))
}

/// Like `fetch_descriptor`, but every failure collapses into `None`.
///
/// Used wherever "no item available" is an ordinary outcome: the cycle falls
/// back to its penalty delay and the prefetcher leaves its slot empty.
pub async fn acquire_descriptor(
    source: &dyn InfoSource,
    info_base: &str,
    options: ResolveOptions,
) -> Option<MediaDescriptor> {
    match fetch_descriptor(source, info_base, options).await {
        Ok(Some(descriptor)) => {
            info!("Next item: {} ({:?})", descriptor.media_url, descriptor.kind);
            Some(descriptor)
        }
        Ok(None) => {
            warn!("Info record could not be resolved to a media address");
            None
        }
        Err(e) => {
            warn!("Failed to acquire next item from {}: {}", info_base, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaKind;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapSource {
        docs: HashMap<String, serde_json::Value>,
        requested: Mutex<Vec<String>>,
    }

    impl MapSource {
        fn new(docs: &[(&str, serde_json::Value)]) -> Self {
            Self {
                docs: docs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InfoSource for MapSource {
        async fn get_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.docs.get(url).cloned().ok_or(FetchError::MissingField("test document"))
        }
    }

    #[tokio::test]
    async fn two_step_protocol_resolves_item() {
        let source = MapSource::new(&[
            ("http://svc/info/", json!({ "url": "http://svc/item/42" })),
            ("http://svc/item/42", json!({ "result": { "name": "photo.HEIC" } })),
        ]);
        let d = fetch_descriptor(&source, "http://svc/info/", ResolveOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.kind, MediaKind::StillImage);
        assert_eq!(d.media_url, "http://svc/pgapi/gallery/content/photo.HEIC/1080");
        assert_eq!(
            *source.requested.lock().unwrap(),
            vec!["http://svc/info/".to_string(), "http://svc/item/42".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_url_is_an_error() {
        let source = MapSource::new(&[("http://svc/info/", json!({ "other": 1 }))]);
        let err = fetch_descriptor(&source, "http://svc/info/", ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingField("url")));
    }

    #[tokio::test]
    async fn missing_result_collapses_to_none() {
        let source = MapSource::new(&[
            ("http://svc/info/", json!({ "url": "http://svc/item/1" })),
            ("http://svc/item/1", json!({ "error": "gone" })),
        ]);
        let descriptor =
            acquire_descriptor(&source, "http://svc/info/", ResolveOptions::default()).await;
        assert!(descriptor.is_none());
    }
}
