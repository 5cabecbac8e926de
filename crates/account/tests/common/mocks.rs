/// Reusable mock implementations of the chain collaborators
use alloy_primitives::{Address, U256, aliases::U192};
use async_trait::async_trait;
use keyway_account::{AccountIdentity, DeploymentOracle, FactoryReader, NonceSource};
use keyway_core::ProviderError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Factory reader returning a fixed answer or failing
#[derive(Clone, Default)]
pub struct MockFactoryReader {
    /// Address to return; `None` makes every call fail
    response: Arc<Mutex<Option<Address>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockFactoryReader {
    pub fn returning(address: Address) -> Self {
        let mock = Self::default();
        *mock.response.lock().unwrap() = Some(address);
        mock
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl FactoryReader for MockFactoryReader {
    async fn get_address(
        &self,
        _factory: Address,
        _identity: &AccountIdentity,
    ) -> Result<Address, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        self.response
            .lock()
            .unwrap()
            .ok_or_else(|| ProviderError::new("getAddress", "execution reverted"))
    }
}

/// Nonce source with per-sender nonces
#[derive(Clone, Default)]
pub struct MockNonceSource {
    nonces: Arc<Mutex<HashMap<Address, U256>>>,
    requests: Arc<Mutex<Vec<(Address, Address, U192)>>>,
    fail_next: Arc<Mutex<bool>>,
}

impl MockNonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nonce(self, sender: Address, nonce: u64) -> Self {
        self.nonces.lock().unwrap().insert(sender, U256::from(nonce));
        self
    }

    pub fn fail_next(self) -> Self {
        *self.fail_next.lock().unwrap() = true;
        self
    }

    pub fn requests(&self) -> Vec<(Address, Address, U192)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NonceSource for MockNonceSource {
    async fn get_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError> {
        self.requests.lock().unwrap().push((entry_point, sender, key));
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(ProviderError::new("getNonce", "connection refused"));
        }
        Ok(self.nonces.lock().unwrap().get(&sender).copied().unwrap_or_default())
    }
}

/// Deployment oracle backed by a set of deployed addresses
#[derive(Clone, Default)]
pub struct MockDeploymentOracle {
    deployed: Arc<Mutex<Vec<Address>>>,
    queries: Arc<Mutex<usize>>,
}

impl MockDeploymentOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&self, address: Address) {
        self.deployed.lock().unwrap().push(address);
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl DeploymentOracle for MockDeploymentOracle {
    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError> {
        *self.queries.lock().unwrap() += 1;
        Ok(self.deployed.lock().unwrap().contains(&address))
    }
}
