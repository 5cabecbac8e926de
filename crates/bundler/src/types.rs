//! Relay response shapes.

use alloy_primitives::{Address, B256, U256};
use keyway_core::RpcUserOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of `eth_getUserOperationReceipt` for an included operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// Operation hash.
    pub user_op_hash: B256,
    /// EntryPoint that executed the operation.
    pub entry_point: Address,
    /// The account.
    pub sender: Address,
    /// Nonce the operation consumed.
    pub nonce: U256,
    /// Sponsor, when one paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Wei charged to the account or paymaster.
    pub actual_gas_cost: U256,
    /// Gas used, including pre-verification.
    pub actual_gas_used: U256,
    /// `false` when the account's execution reverted.
    pub success: bool,
    /// Revert data or message reported by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Logs emitted during execution, undecoded.
    #[serde(default)]
    pub logs: Vec<Value>,
    /// The bundle transaction that carried the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<BundleTransaction>,
}

impl UserOperationReceipt {
    /// Hash of the bundle transaction, when the relay reported it.
    pub fn transaction_hash(&self) -> Option<B256> {
        self.receipt.as_ref().map(|r| r.transaction_hash)
    }
}

/// The subset of the bundle transaction receipt this client reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransaction {
    /// Bundle transaction hash.
    pub transaction_hash: B256,
    /// Block the bundle landed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<B256>,
    /// Number of that block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U256>,
}

/// Result of `eth_getUserOperationByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationLookup {
    /// The operation as the relay stores it.
    pub user_operation: RpcUserOperation,
    /// EntryPoint it was submitted to.
    pub entry_point: Address,
    /// Inclusion block; `None` while pending.
    #[serde(default)]
    pub block_number: Option<U256>,
    /// Inclusion block hash; `None` while pending.
    #[serde(default)]
    pub block_hash: Option<B256>,
    /// Bundle transaction; `None` while pending.
    #[serde(default)]
    pub transaction_hash: Option<B256>,
}

/// One fee tier of a relay gas price quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrice {
    /// Fee cap per gas, in wei.
    pub max_fee_per_gas: U256,
    /// Tip per gas, in wei.
    pub max_priority_fee_per_gas: U256,
}

/// Result of the vendor `*_getUserOperationGasPrice` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    /// Cheapest tier.
    pub slow: GasPrice,
    /// Default tier.
    pub standard: GasPrice,
    /// Highest tier.
    pub fast: GasPrice,
}
