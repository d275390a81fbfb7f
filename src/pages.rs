use crate::config::Config;
use crate::export::ExportError;
use crate::http::{self, RetryPolicy};
use crate::rate::RateLimitTracker;
use crate::validate::PageRules;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

/// Pagination metadata of the incremental (stream style) export.
/// The export is done when the server flags the end of the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMeta {
    #[serde(default)]
    pub end_of_stream: bool,
    pub after_cursor: Option<String>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

/// Pagination metadata of cursor-paginated list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorMeta {
    pub has_more: bool,
    pub after_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Links {
    pub next: Option<String>,
}

/// Envelope around `CursorMeta` as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorEnvelope {
    pub meta: CursorMeta,
    #[serde(default)]
    pub links: Option<Links>,
}

/// One fetched page: the typed items plus pagination metadata.
/// Immutable once constructed.
#[derive(Debug)]
pub struct Page<T, M> {
    pub items: Vec<T>,
    pub meta: M,
}

/// Fetches one page at a time: GET, rate-budget refresh, shape validation,
/// typed decode. Failures that saw response headers refresh the budget
/// before the error is re-raised, so the next attempt waits correctly.
pub struct PageFetcher<'a> {
    pub client: &'a Client,
    pub cfg: &'a Config,
    pub tracker: &'a RateLimitTracker,
    pub retry: &'a RetryPolicy,
}

impl PageFetcher<'_> {
    pub async fn fetch<T, M>(&self, url: &Url, rules: &PageRules) -> Result<Page<T, M>, ExportError>
    where
        T: DeserializeOwned,
        M: DeserializeOwned,
    {
        debug!("fetching page {}", url);
        let response = match http::get_json(self.client, self.cfg, url, self.retry).await {
            Ok(r) => r,
            Err(e) => {
                if let Some(headers) = e.response_headers() {
                    self.tracker.update_from_headers(headers);
                }
                return Err(e.into());
            }
        };
        self.tracker.update_from_headers(&response.headers);

        if !rules.is_valid_page(&response.body) {
            return Err(ExportError::InvalidPage {
                url: url.to_string(),
                detail: rules.explain_invalid_page(&response.body),
            });
        }

        let items_value = response
            .body
            .get(rules.array_field)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        let items: Vec<T> =
            serde_json::from_value(items_value).map_err(|e| ExportError::InvalidPage {
                url: url.to_string(),
                detail: format!("items in \"{}\" failed to decode: {}", rules.array_field, e),
            })?;
        let meta: M =
            serde_json::from_value(response.body).map_err(|e| ExportError::InvalidPage {
                url: url.to_string(),
                detail: format!("pagination metadata failed to decode: {}", e),
            })?;

        debug!("fetched {} items from {}", items.len(), url.path());
        Ok(Page { items, meta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_meta_decodes_with_defaults() {
        let body = json!({"tickets": [], "after_cursor": null});
        let meta: StreamMeta = serde_json::from_value(body).unwrap();
        assert!(!meta.end_of_stream);
        assert!(meta.after_cursor.is_none());
        assert!(meta.end_time.is_none());
    }

    #[test]
    fn cursor_envelope_requires_meta() {
        let body = json!({"users": []});
        assert!(serde_json::from_value::<CursorEnvelope>(body).is_err());

        let body = json!({"users": [], "meta": {"has_more": true, "after_cursor": "abc"}});
        let envelope: CursorEnvelope = serde_json::from_value(body).unwrap();
        assert!(envelope.meta.has_more);
        assert_eq!(envelope.meta.after_cursor.as_deref(), Some("abc"));
    }
}
