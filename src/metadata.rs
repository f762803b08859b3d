use crate::error::MarketError;
use crate::id::TokenId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The recognized off-chain content-addressing scheme
pub const CONTENT_SCHEME: &str = "ipfs://";

/// Default bound on a single metadata fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a metadata cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveState {
    /// A fetch is in flight
    Pending,
    /// The descriptor was fetched and parsed
    Resolved,
    /// The URI was unrecognized, or the fetch/parse failed
    Failed,
}

/// The off-chain JSON descriptor of an edition, as far as the view needs it.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Content address of the artwork itself
    #[serde(default, alias = "image")]
    pub artifact_uri: Option<String>,
}

/// Soft-state record of one resolution attempt.
///
/// Absence or failure never blocks ledger correctness, only degrades the
/// view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub token_id: TokenId,
    pub uri: String,
    pub document: Option<MetadataDocument>,
    pub fetched_at: DateTime<Utc>,
    pub state: ResolveState,
}

impl ResolvedMetadata {
    fn pending(token_id: TokenId, uri: &str) -> Self {
        Self {
            token_id,
            uri: uri.to_string(),
            document: None,
            fetched_at: Utc::now(),
            state: ResolveState::Pending,
        }
    }

    fn resolved(token_id: TokenId, uri: &str, document: MetadataDocument) -> Self {
        Self {
            token_id,
            uri: uri.to_string(),
            document: Some(document),
            fetched_at: Utc::now(),
            state: ResolveState::Resolved,
        }
    }

    fn failed(token_id: TokenId, uri: &str) -> Self {
        Self {
            token_id,
            uri: uri.to_string(),
            document: None,
            fetched_at: Utc::now(),
            state: ResolveState::Failed,
        }
    }
}

/// Fetch-by-address service for off-chain content.
///
/// Implementations may be slow or failing; the resolver bounds every call
/// with its own timeout and treats errors as soft failures.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the raw bytes behind a content address
    async fn fetch(&self, uri: &str) -> anyhow::Result<Vec<u8>>;
}

/// Resolves token metadata with caching and graceful degradation.
///
/// Resolved entries are cached for the life of the resolver (metadata URIs
/// are immutable per token id). Failures are returned but never cached, so a
/// later call retries. Resolution is idempotent and safe to retry.
pub struct MetadataResolver {
    fetcher: Arc<dyn ContentFetcher>,
    cache: Mutex<HashMap<TokenId, ResolvedMetadata>>,
    fetch_timeout: Duration,
}

impl MetadataResolver {
    pub fn new(fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the per-fetch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// The cached entry for a token, if any, without fetching
    pub fn peek(&self, token_id: TokenId) -> Option<ResolvedMetadata> {
        self.cache.lock().unwrap().get(&token_id).cloned()
    }

    /// The cached, successfully resolved entry for a token.
    ///
    /// For callers that need the descriptor rather than a degraded view;
    /// everything else should go through `resolve` and tolerate `Failed`.
    pub fn resolved(&self, token_id: TokenId) -> Result<ResolvedMetadata, MarketError> {
        match self.peek(token_id) {
            Some(entry) if entry.state == ResolveState::Resolved => Ok(entry),
            _ => Err(MarketError::MetadataUnavailable(token_id)),
        }
    }

    /// Resolve the descriptor behind `uri` for `token_id`.
    ///
    /// Returns a `Failed` entry immediately for URIs outside the recognized
    /// scheme, and after a bounded time for fetch, timeout or parse
    /// problems. Never raises: callers treat `Failed` as "no metadata
    /// available".
    pub async fn resolve(&self, token_id: TokenId, uri: &str) -> ResolvedMetadata {
        if let Some(entry) = self.peek(token_id) {
            if entry.state == ResolveState::Resolved {
                return entry;
            }
        }

        if !uri.starts_with(CONTENT_SCHEME) {
            debug!("token {}: unrecognized metadata uri {}", token_id, uri);
            return ResolvedMetadata::failed(token_id, uri);
        }

        // Mark the fetch in flight so concurrent readers can observe it
        self.cache
            .lock()
            .unwrap()
            .insert(token_id, ResolvedMetadata::pending(token_id, uri));

        let outcome = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(uri)).await;
        let entry = match outcome {
            Ok(Ok(bytes)) => match serde_json::from_slice::<MetadataDocument>(&bytes) {
                Ok(document) => ResolvedMetadata::resolved(token_id, uri, document),
                Err(e) => {
                    warn!("token {}: metadata parse failed: {}", token_id, e);
                    ResolvedMetadata::failed(token_id, uri)
                }
            },
            Ok(Err(e)) => {
                warn!("token {}: metadata fetch failed: {}", token_id, e);
                ResolvedMetadata::failed(token_id, uri)
            }
            Err(_) => {
                warn!(
                    "token {}: metadata fetch timed out after {:?}",
                    token_id, self.fetch_timeout
                );
                ResolvedMetadata::failed(token_id, uri)
            }
        };

        let mut cache = self.cache.lock().unwrap();
        if entry.state == ResolveState::Resolved {
            cache.insert(token_id, entry.clone());
        } else {
            // Drop the pending marker so the next resolve retries
            cache.remove(&token_id);
        }
        entry
    }

    /// Resolve a batch concurrently.
    ///
    /// Fetches run in parallel, each bounded by the per-fetch timeout; one
    /// stalled or failing item cannot delay the others beyond its own bound.
    /// Results come back in input order.
    pub async fn resolve_many(&self, items: &[(TokenId, String)]) -> Vec<ResolvedMetadata> {
        let futures = items
            .iter()
            .map(|(token_id, uri)| self.resolve(*token_id, uri));
        futures::future::join_all(futures).await
    }
}
