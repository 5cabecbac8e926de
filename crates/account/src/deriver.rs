//! Counterfactual account address derivation.
//!
//! The factory is asked first. Its answer is only trusted when it is not
//! anomalous and, when creation bytecode is configured, agrees with the local
//! CREATE2 computation. A failing or anomalous factory falls back to the local
//! value.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address, B256, Bytes, keccak256};
use alloy_sol_types::SolValue;
use keyway_core::DerivationError;
use tracing::{debug, warn};

use crate::chain::{AccountIdentity, FactoryReader};

/// Factory deployment parameters needed for local derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryConfig {
    /// Factory contract.
    pub factory: Address,
    /// Creation bytecode of the contract the factory deploys via CREATE2.
    pub creation_code: Option<Bytes>,
    /// ABI-encoded constructor arguments appended to the creation bytecode.
    pub constructor_args: Bytes,
}

impl FactoryConfig {
    /// Constructor arguments of an ERC-1967 proxy: `(implementation, "")`.
    pub fn erc1967_proxy_args(implementation: Address) -> Bytes {
        Bytes::from((implementation, Bytes::new()).abi_encode_params())
    }

    /// `keccak256(creationCode ++ constructorArgs)`.
    pub fn init_code_hash(&self) -> Result<B256, DerivationError> {
        let code = self.creation_code.as_ref().ok_or(DerivationError::MissingCreationCode)?;
        let mut init_code = Vec::with_capacity(code.len() + self.constructor_args.len());
        init_code.extend_from_slice(code);
        init_code.extend_from_slice(&self.constructor_args);
        Ok(keccak256(init_code))
    }
}

/// `keccak256(abi.encode(x, y, owner, salt))`.
pub fn final_salt(identity: &AccountIdentity) -> B256 {
    let (x, y) = identity.coordinates();
    keccak256((x, y, identity.owner, identity.salt).abi_encode())
}

/// Derives and caches account addresses.
#[derive(Debug)]
pub struct AddressDeriver<F> {
    config: FactoryConfig,
    reader: F,
    cache: Mutex<HashMap<AccountIdentity, Address>>,
}

impl<F: FactoryReader> AddressDeriver<F> {
    /// New deriver reading from `reader`.
    pub fn new(config: FactoryConfig, reader: F) -> Self {
        Self { config, reader, cache: Mutex::new(HashMap::new()) }
    }

    /// The factory configuration.
    pub const fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// CREATE2 address computed without touching the chain.
    pub fn compute_local(&self, identity: &AccountIdentity) -> Result<Address, DerivationError> {
        let init_code_hash = self.config.init_code_hash()?;
        Ok(self.config.factory.create2(final_salt(identity), init_code_hash))
    }

    /// Resolves the address for `identity`, using the cache when possible.
    pub async fn derive_address(&self, identity: &AccountIdentity) -> Result<Address, DerivationError> {
        if let Some(address) = self.cached(identity) {
            return Ok(address);
        }

        let address = self.reconcile(identity).await?;
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(*identity, address);
        Ok(address)
    }

    fn cached(&self, identity: &AccountIdentity) -> Option<Address> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(identity).copied()
    }

    async fn reconcile(&self, identity: &AccountIdentity) -> Result<Address, DerivationError> {
        let factory = self.config.factory;
        let on_chain = self.reader.get_address(factory, identity).await;
        let local = self.compute_local(identity);

        match (on_chain, local) {
            (Ok(returned), local) if returned == factory || returned.is_zero() => {
                warn!(%factory, %returned, owner = %identity.owner, "factory returned anomalous address");
                local.map_err(|_| DerivationError::FactoryAnomaly { factory, returned })
            }
            (Ok(on_chain), Ok(local)) if on_chain == local => Ok(on_chain),
            (Ok(on_chain), Ok(local)) => {
                warn!(%on_chain, %local, owner = %identity.owner, "factory and local derivation disagree");
                Err(DerivationError::Mismatch { on_chain, local })
            }
            (Ok(on_chain), Err(_)) => {
                debug!(%on_chain, "no creation bytecode configured, using factory address");
                Ok(on_chain)
            }
            (Err(err), Ok(local)) => {
                warn!(error = %err, %local, "factory read failed, using local derivation");
                Ok(local)
            }
            (Err(err), Err(_)) => Err(err.into()),
        }
    }
}
