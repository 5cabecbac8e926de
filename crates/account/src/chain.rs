//! On-chain collaborators: nonce source, factory reader, deployed-status oracle.
//!
//! Each is a trait so the builder and deriver can be driven by mocks; the
//! provider-backed implementations live here too.

use alloy_primitives::{Address, B256, Bytes, U256, aliases::U192};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use keyway_core::ProviderError;
use tracing::debug;

use crate::contracts::{IAccountFactory, IEntryPoint};

/// P-256 public key coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    /// Affine x.
    pub x: B256,
    /// Affine y.
    pub y: B256,
}

/// Inputs that determine an account address.
///
/// Accounts without a passkey use zero coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountIdentity {
    /// Passkey coordinates, if the account has one.
    pub public_key: Option<PublicKey>,
    /// Owner key address.
    pub owner: Address,
    /// Caller-chosen salt.
    pub salt: U256,
}

impl AccountIdentity {
    /// Coordinates as passed to the factory; zeros when there is no passkey.
    pub fn coordinates(&self) -> (B256, B256) {
        self.public_key.map_or((B256::ZERO, B256::ZERO), |k| (k.x, k.y))
    }
}

/// Reads the account nonce from the EntryPoint.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Next nonce for `sender` in namespace `key`.
    async fn get_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError>;
}

/// Asks the factory for the counterfactual address.
#[async_trait]
pub trait FactoryReader: Send + Sync {
    /// `factory.getAddress(x, y, owner, salt)`.
    async fn get_address(
        &self,
        factory: Address,
        identity: &AccountIdentity,
    ) -> Result<Address, ProviderError>;
}

/// Tells whether an address has contract code.
#[async_trait]
pub trait DeploymentOracle: Send + Sync {
    /// `true` if `address` has code.
    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError>;
}

#[async_trait]
impl NonceSource for RootProvider {
    async fn get_nonce(
        &self,
        entry_point: Address,
        sender: Address,
        key: U192,
    ) -> Result<U256, ProviderError> {
        let input = IEntryPoint::getNonceCall { sender, key }.abi_encode();
        let tx = TransactionRequest::default().to(entry_point).input(Bytes::from(input).into());
        let output = self.call(tx).await.map_err(|e| ProviderError::new("getNonce", e))?;
        let nonce = IEntryPoint::getNonceCall::abi_decode_returns(&output)
            .map_err(|e| ProviderError::new("getNonce", e))?;
        debug!(%sender, %nonce, "fetched nonce");
        Ok(nonce)
    }
}

#[async_trait]
impl FactoryReader for RootProvider {
    async fn get_address(
        &self,
        factory: Address,
        identity: &AccountIdentity,
    ) -> Result<Address, ProviderError> {
        let (x, y) = identity.coordinates();
        let input = IAccountFactory::getAddressCall { x, y, owner: identity.owner, salt: identity.salt }
            .abi_encode();
        let tx = TransactionRequest::default().to(factory).input(Bytes::from(input).into());
        let output = self.call(tx).await.map_err(|e| ProviderError::new("getAddress", e))?;
        IAccountFactory::getAddressCall::abi_decode_returns(&output)
            .map_err(|e| ProviderError::new("getAddress", e))
    }
}

#[async_trait]
impl DeploymentOracle for RootProvider {
    async fn is_deployed(&self, address: Address) -> Result<bool, ProviderError> {
        let code = self.get_code_at(address).await.map_err(|e| ProviderError::new("getCode", e))?;
        Ok(!code.is_empty())
    }
}

/// Connects to the chain RPC over HTTP.
pub fn connect(rpc_url: url::Url) -> RootProvider {
    RootProvider::new_http(rpc_url)
}
