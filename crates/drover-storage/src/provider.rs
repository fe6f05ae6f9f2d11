//! The StoreProvider trait and object store error mapping.

use std::sync::Arc;

use object_store::ObjectStore;

use drover_core::error::DroverError;
use drover_core::Result;

/// Hands out an [`ObjectStore`] handle scoped to one container.
///
/// A [`Session`](crate::Session) asks for the handle once per operation and
/// reuses it for every request that operation makes, so a recursive list or
/// delete runs over a single authenticated client.
pub trait StoreProvider: Send + Sync {
    /// The store for `container`.
    fn store(&self, container: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Classify an `object_store` error against the path it concerned.
///
/// Not-found and permission failures get their own variants; everything
/// else is passed through as a transport error with the original source.
pub(crate) fn map_store_error(path: &str, err: object_store::Error) -> DroverError {
    match err {
        object_store::Error::NotFound { .. } => DroverError::not_found(path),
        e @ (object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. }) => DroverError::access(path, e),
        other => DroverError::transport(format!("Object store request failed for {path}"), other),
    }
}
