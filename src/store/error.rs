//! Error types for the cache store and delta source.

use thiserror::Error;

/// Errors talking to the Supabase REST API.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The request never completed.
    #[error("Supabase request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The missing-IDs procedure answered with a non-success status.
    #[error("RPC {function} failed with status {status}: {body}")]
    Rpc {
        function: String,
        status: u16,
        body: String,
    },

    /// Paging through a table for the fallback discovery failed.
    #[error("Reading {table} failed with status {status}: {body}")]
    Scan {
        table: String,
        status: u16,
        body: String,
    },

    /// Inserting a cache row failed for a reason other than a conflict.
    #[error("Writing deck {deck_id} failed with status {status}: {body}")]
    Write {
        deck_id: u64,
        status: u16,
        body: String,
    },

    /// A response body did not have any of the accepted shapes.
    #[error("Unexpected response shape: {0}")]
    Decode(String),
}
