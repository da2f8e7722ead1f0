//! Provider token storage
//!
//! Durable mapping from user id to the latest known provider token triple.
//! `TokenStore` is the contract the session orchestrator depends on;
//! `FileTokenStore` is the JSON-file engine used by the gateway.
//!
//! Write semantics:
//! - `upsert` inserts or fully replaces a record (last writer wins)
//! - `update_tokens` replaces only the triple and never creates a record

pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{FileTokenStore, UserRecord};

use provider::ProviderTokenTriple;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `TokenStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Keyed store of provider token triples.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Load the triple for `user_id`; `Error::NotFound` if no record exists.
    fn get<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, ProviderTokenTriple>;

    /// Insert or fully replace the record for `user_id`. Idempotent.
    fn upsert<'a>(
        &'a self,
        user_id: &'a str,
        email: &'a str,
        tokens: ProviderTokenTriple,
    ) -> StoreFuture<'a, ()>;

    /// Replace the triple of an existing record; `Error::NotFound` otherwise.
    fn update_tokens<'a>(
        &'a self,
        user_id: &'a str,
        tokens: ProviderTokenTriple,
    ) -> StoreFuture<'a, ()>;
}
