//! Collaborators on the database side of the sync: the delta source that
//! reports which decks are missing from the cache, and the cache writer.

pub mod error;
pub mod supabase;
pub mod types;

use async_trait::async_trait;

use crate::types::DeckId;

pub use error::StoreError;
pub use supabase::{SupabaseConfig, SupabaseStore};
pub use types::{CacheRow, WriteOutcome};

/// Source of "in the results table but not in the cache" identifiers.
#[async_trait]
pub trait DeltaSource: Send + Sync {
    /// Up to `limit` missing identifiers. No ordering is promised; an empty
    /// result means the cache is fully synced.
    async fn missing_ids(&self, limit: u32) -> Result<Vec<DeckId>, StoreError>;
}

/// Idempotent writer for cache rows.
#[async_trait]
pub trait CacheWriter: Send + Sync {
    /// Insert one row. A uniqueness conflict is `Ok(AlreadyExists)`.
    async fn write(&self, row: &CacheRow) -> Result<WriteOutcome, StoreError>;
}
