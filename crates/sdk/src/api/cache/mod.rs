use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{
    http::HttpClient,
    types::{ApiError, ApiResult},
};

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSummary {
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
}

/// An item to store. `expires_in` is in seconds; the service default applies
/// when unset. `add` stores only if the key is absent, `replace` only if it
/// is present; the two are mutually exclusive.
#[derive(Debug, Clone, Default)]
pub struct Item {
    pub value: String,
    pub expires_in: Option<u64>,
    pub add: bool,
    pub replace: bool,
}

impl Item {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            ..Self::default()
        }
    }
}

/// An item as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheItem {
    #[serde(default)]
    pub cache: Option<String>,
    pub key: String,
    pub value: String,
}

#[derive(Serialize)]
struct PutItemRequest<'a> {
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    add: bool,
    #[serde(skip_serializing_if = "is_false")]
    replace: bool,
}

#[derive(Serialize)]
struct IncrementRequest {
    amount: i64,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Key-value cache endpoints, all rooted at `caches/...`.
#[derive(Clone)]
pub struct CacheApi {
    client: Arc<HttpClient>,
}

impl CacheApi {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub async fn list(&self, page: u32, per_page: u32) -> ApiResult<Vec<CacheSummary>> {
        self.client
            .get_with_query(
                &["caches"],
                &[
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                ],
            )
            .await
    }

    pub async fn put(&self, cache: &str, key: &str, item: &Item) -> ApiResult<()> {
        if item.add && item.replace {
            return Err(ApiError::InvalidArgument(
                "a cache item cannot set both `add` and `replace`".to_string(),
            ));
        }

        self.client
            .put_status(
                &["caches", cache, "items", key],
                Some(&PutItemRequest {
                    body: &item.value,
                    expires_in: item.expires_in,
                    add: item.add,
                    replace: item.replace,
                }),
            )
            .await
    }

    pub async fn get(&self, cache: &str, key: &str) -> ApiResult<CacheItem> {
        self.client.get(&["caches", cache, "items", key]).await
    }

    /// Adds `amount` (which may be negative) to a numeric item.
    pub async fn increment(&self, cache: &str, key: &str, amount: i64) -> ApiResult<()> {
        self.client
            .post_status(
                &["caches", cache, "items", key],
                Some(&IncrementRequest { amount }),
            )
            .await
    }

    pub async fn delete(&self, cache: &str, key: &str) -> ApiResult<()> {
        self.client
            .delete_status(&["caches", cache, "items", key])
            .await
    }
}
