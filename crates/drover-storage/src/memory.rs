//! In-process object store provider for tests and dry runs.
//!
//! [`MemoryStoreProvider`] keeps one `InMemory` store per container name.
//! Containers spring into existence on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use object_store::memory::InMemory;
use object_store::ObjectStore;

use drover_core::error::DroverError;
use drover_core::Result;

use crate::provider::StoreProvider;

/// A [`StoreProvider`] whose buckets live in memory.
///
/// Cloning the provider shares the buckets.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreProvider {
    buckets: Arc<Mutex<HashMap<String, Arc<InMemory>>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn store(&self, container: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut buckets = self.buckets.lock().map_err(|e| DroverError::Internal {
            message: format!("Memory store lock poisoned: {e}"),
        })?;
        let store = buckets
            .entry(container.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()));
        Ok(Arc::clone(store) as Arc<dyn ObjectStore>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::path::Path as ObjectPath;

    #[tokio::test]
    async fn test_buckets_are_shared_and_isolated() {
        let provider = MemoryStoreProvider::new();
        let a = provider.store("a").unwrap();
        a.put(&ObjectPath::from("k"), "v".into()).await.unwrap();

        let again = provider.clone().store("a").unwrap();
        assert!(again.head(&ObjectPath::from("k")).await.is_ok());

        let b = provider.store("b").unwrap();
        assert!(b.head(&ObjectPath::from("k")).await.is_err());
    }
}
