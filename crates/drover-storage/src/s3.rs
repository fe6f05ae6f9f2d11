//! S3-compatible object store provider.
//!
//! [`S3StoreProvider`] builds an `object_store` S3 client per bucket using
//! the standard AWS environment for credentials. An endpoint override
//! supports MinIO and other S3-compatible services.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::{BackoffConfig, ObjectStore, RetryConfig};
use tracing::debug;

use drover_core::config::{DroverConfig, RetryPolicy};
use drover_core::error::DroverError;
use drover_core::Result;

use crate::provider::StoreProvider;

/// A [`StoreProvider`] backed by S3.
///
/// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and friends are read from
/// the environment; region and retry behaviour come from [`DroverConfig`].
#[derive(Debug, Clone)]
pub struct S3StoreProvider {
    region: String,
    endpoint: Option<String>,
    retry: RetryConfig,
}

impl S3StoreProvider {
    /// Create a provider for the configured region and retry policy.
    pub fn new(config: &DroverConfig) -> Self {
        Self {
            region: config.region.clone(),
            endpoint: None,
            retry: retry_config(&config.retry),
        }
    }

    /// Send requests to a custom S3-compatible endpoint (plain HTTP allowed).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl StoreProvider for S3StoreProvider {
    fn store(&self, container: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(container)
            .with_region(&self.region)
            .with_retry(self.retry.clone());

        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            DroverError::transport(format!("Failed to create S3 client for bucket {container}"), e)
        })?;

        debug!(bucket = %container, region = %self.region, "S3 store ready");
        Ok(Arc::new(store))
    }
}

/// Translate Drover's retry policy into the store client's own retry layer.
fn retry_config(policy: &RetryPolicy) -> RetryConfig {
    RetryConfig {
        max_retries: policy.max_attempts.saturating_sub(1) as usize,
        backoff: BackoffConfig {
            init_backoff: policy.initial_backoff,
            max_backoff: policy.max_backoff,
            base: 2.0,
        },
        ..Default::default()
    }
}
