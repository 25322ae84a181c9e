use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::data::Item;
use crate::effects::http::HttpClient;
use crate::error::{ProviderError, Result};

/// Signed, time-limited URL for one item's ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadTicket {
    #[serde(rename = "g")]
    pub url: String,

    #[serde(rename = "s", default)]
    pub size: u64,
}

#[derive(Deserialize)]
struct Listing {
    #[serde(rename = "f")]
    items: Vec<Item>,
}

/// The two provider API calls the downloader makes, scoped to one shared folder.
#[derive(Debug)]
pub struct Provider {
    api_url: String,
    folder_id: String,
    sequence: AtomicU64,
}

impl Provider {
    pub fn new(api_url: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            folder_id: folder_id.into(),
            sequence: AtomicU64::new(rand::random::<u32>() as u64),
        }
    }

    fn endpoint(&self) -> String {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}/cs?id={id}&n={}", self.api_url, self.folder_id)
    }

    /// List every node of the shared folder.
    pub async fn list_folder<H: HttpClient>(&self, client: &H, timeout: Duration) -> Result<Vec<Item>> {
        let body = json!([{ "a": "f", "c": 1, "r": 1 }]);
        let value = self.call(client, &body, timeout).await?;
        let listing: Listing =
            serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(listing.items)
    }

    /// Ask for a signed download URL for `item_id`.
    pub async fn request_download_url<H: HttpClient>(
        &self,
        client: &H,
        item_id: &str,
        timeout: Duration,
    ) -> Result<DownloadTicket> {
        let body = json!([{ "a": "g", "g": 1, "ssl": 0, "n": item_id }]);
        let value = self.call(client, &body, timeout).await?;
        let ticket: DownloadTicket =
            serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(ticket)
    }

    async fn call<H: HttpClient>(&self, client: &H, body: &Value, timeout: Duration) -> Result<Value> {
        let url = self.endpoint();
        trace!(%url, "provider request");
        let response = client.post_json(&url, body, timeout).await.map_err(ProviderError::from)?;
        Ok(unwrap_response(response)?)
    }
}

/// The first element of a batched response, or the provider error it carries.
///
/// Errors come either as a bare negative integer or as a negative integer in place of the
/// element. An element may also be an object with an `"e"` error field.
pub fn unwrap_response(value: Value) -> std::result::Result<Value, ProviderError> {
    let first = match value {
        Value::Array(mut elements) if !elements.is_empty() => elements.swap_remove(0),
        Value::Array(_) => return Err(ProviderError::Malformed("empty response".into())),
        other => other,
    };

    if let Some(code) = first.as_i64() {
        return Err(ProviderError::from_code(code));
    }
    if let Some(code) = first.get("e").and_then(Value::as_i64) {
        return Err(ProviderError::from_code(code));
    }
    if first.is_object() {
        Ok(first)
    } else {
        Err(ProviderError::Malformed(format!("unexpected element {first}")))
    }
}
