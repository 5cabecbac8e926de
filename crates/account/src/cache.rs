//! Short-lived deployed-status cache.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use keyway_core::ProviderError;
use tokio::time::Instant;
use tracing::debug;

use crate::chain::DeploymentOracle;

/// Default entry lifetime.
pub const DEFAULT_DEPLOYMENT_TTL: Duration = Duration::from_secs(30);

/// Address to deployed-status map whose entries expire after a fixed TTL.
#[derive(Debug)]
pub struct DeploymentCache {
    ttl: Duration,
    entries: Mutex<HashMap<Address, (bool, Instant)>>,
}

impl Default for DeploymentCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEPLOYMENT_TTL)
    }
}

impl DeploymentCache {
    /// Empty cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// The cached status, if present and not expired.
    pub fn get(&self, address: &Address) -> Option<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(address) {
            Some((deployed, stored_at)) if stored_at.elapsed() < self.ttl => Some(*deployed),
            Some(_) => {
                entries.remove(address);
                None
            }
            None => None,
        }
    }

    /// Records a status.
    pub fn insert(&self, address: Address, deployed: bool) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, (deployed, Instant::now()));
    }

    /// Drops the entry for `address`. Call after any operation that may deploy it.
    pub fn invalidate(&self, address: &Address) {
        if self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(address).is_some() {
            debug!(%address, "invalidated deployment status");
        }
    }
}

/// A [`DeploymentOracle`] that consults a [`DeploymentCache`] before `inner`.
#[derive(Debug)]
pub struct CachedDeploymentOracle<O> {
    inner: O,
    cache: DeploymentCache,
}

impl<O> CachedDeploymentOracle<O> {
    /// Wraps `inner` with `cache`.
    pub const fn new(inner: O, cache: DeploymentCache) -> Self {
        Self { inner, cache }
    }

    /// The underlying cache, for invalidation.
    pub const fn cache(&self) -> &DeploymentCache {
        &self.cache
    }

    /// Shorthand for `cache().invalidate(address)`.
    pub fn invalidate(&self, address: &Address) {
        self.cache.invalidate(address);
    }
}

#[async_trait]
impl<O: DeploymentOracle> DeploymentOracle for CachedDeploymentOracle<O> {
    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError> {
        if let Some(deployed) = self.cache.get(&address) {
            return Ok(deployed);
        }
        let deployed = self.inner.is_deployed(address).await?;
        self.cache.insert(address, deployed);
        Ok(deployed)
    }
}
