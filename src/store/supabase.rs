//! Supabase (PostgREST) implementation of the store traits.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use url::Url;

use super::error::StoreError;
use super::types::{decode_ids, CacheRow, WriteOutcome};
use super::{CacheWriter, DeltaSource};
use crate::types::DeckId;

/// Rows per page when scanning tables for the fallback discovery.
const SCAN_PAGE_SIZE: usize = 1000;

/// Connection and naming details for the Supabase project.
#[derive(Clone)]
pub struct SupabaseConfig {
    pub base_url: Url,
    pub api_key: String,
    pub rpc_function: String,
    pub cache_table: String,
    pub results_table: String,
    /// Compute the delta client-side when the RPC call fails.
    pub discovery_fallback: bool,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("rpc_function", &self.rpc_function)
            .field("cache_table", &self.cache_table)
            .field("results_table", &self.results_table)
            .field("discovery_fallback", &self.discovery_fallback)
            .finish()
    }
}

impl SupabaseConfig {
    pub(crate) fn rest_url(&self, path: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Map an insert response status to a write outcome.
/// `None` means the write failed.
pub(crate) fn write_outcome(status: u16) -> Option<WriteOutcome> {
    match status {
        200 | 201 | 204 => Some(WriteOutcome::Written),
        409 => Some(WriteOutcome::AlreadyExists),
        _ => None,
    }
}

/// Identifiers in `results` but not in `cached`, first occurrence order,
/// at most `limit` of them.
pub(crate) fn missing_from(results: Vec<DeckId>, cached: &HashSet<DeckId>, limit: usize) -> Vec<DeckId> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|id| !cached.contains(id) && seen.insert(*id))
        .take(limit)
        .collect()
}

pub struct SupabaseStore {
    client: Client,
    config: SupabaseConfig,
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.api_key)?;
        api_key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn rpc_missing_ids(&self, limit: u32) -> Result<Vec<DeckId>, StoreError> {
        let url = self
            .config
            .rest_url(&format!("rpc/{}", self.config.rpc_function));
        tracing::debug!(limit, "Calling RPC {}", self.config.rpc_function);

        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "max_results": limit }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Rpc {
                function: self.config.rpc_function.clone(),
                status: status.as_u16(),
                body,
            });
        }
        decode_ids(&body)
    }

    /// Read the whole `deck_id` column of a table, page by page.
    async fn scan_ids(&self, table: &str) -> Result<Vec<DeckId>, StoreError> {
        let url = self.config.rest_url(table);
        let mut ids = Vec::new();
        let mut offset = 0usize;

        loop {
            let resp = self
                .client
                .get(&url)
                .query(&[
                    ("select", "deck_id".to_string()),
                    ("order", "deck_id.asc".to_string()),
                    ("limit", SCAN_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(StoreError::Scan {
                    table: table.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
            let page = decode_ids(&body)?;
            let page_len = page.len();
            ids.extend(page);
            if page_len < SCAN_PAGE_SIZE {
                break;
            }
            offset += SCAN_PAGE_SIZE;
        }

        Ok(ids)
    }

    async fn scan_missing_ids(&self, limit: u32) -> Result<Vec<DeckId>, StoreError> {
        let results = self.scan_ids(&self.config.results_table).await?;
        let cached: HashSet<DeckId> = self
            .scan_ids(&self.config.cache_table)
            .await?
            .into_iter()
            .collect();
        tracing::debug!(
            results = results.len(),
            cached = cached.len(),
            "Computed delta from table scans"
        );
        Ok(missing_from(results, &cached, limit as usize))
    }
}

#[async_trait]
impl DeltaSource for SupabaseStore {
    async fn missing_ids(&self, limit: u32) -> Result<Vec<DeckId>, StoreError> {
        match self.rpc_missing_ids(limit).await {
            Ok(ids) => Ok(ids),
            Err(e) if self.config.discovery_fallback => {
                tracing::warn!("{}; falling back to table scan", e);
                self.scan_missing_ids(limit).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CacheWriter for SupabaseStore {
    async fn write(&self, row: &CacheRow) -> Result<WriteOutcome, StoreError> {
        let url = self.config.rest_url(&self.config.cache_table);
        let resp = self
            .client
            .post(url)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await?;
        let status = resp.status().as_u16();
        match write_outcome(status) {
            Some(outcome) => Ok(outcome),
            None => Err(StoreError::Write {
                deck_id: row.deck_id.0,
                status,
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}
