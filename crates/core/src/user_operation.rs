//! ERC-4337 user operation in its packed (EntryPoint v0.7+) form, the relay
//! wire schema, and the operation hash the EntryPoint assigns to it.

use alloy_primitives::{Address, B256, Bytes, U256, address, keccak256};
use alloy_sol_types::{SolValue, sol};
use serde::{Deserialize, Serialize};

use crate::codec::{
    self, FactoryCall, PaymasterFields, join_deployment_payload, join_paymaster_payload,
    pack_pair, quantity, split_deployment_payload, split_paymaster_payload, unpack_pair,
};
use crate::error::EncodingError;

/// Canonical EntryPoint v0.7 deployment.
pub const ENTRY_POINT_V07: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Canonical EntryPoint v0.8 deployment.
pub const ENTRY_POINT_V08: Address = address!("0x4337084D9E255Ff0702461CF8895CE9E3b5Ff108");

/// Type string hashed into the v0.8 EIP-712 struct hash.
pub const USEROP_TYPEHASH: &str = "PackedUserOperation(address sender,uint256 nonce,bytes initCode,bytes callData,bytes32 accountGasLimits,uint256 preVerificationGas,bytes32 gasFees,bytes paymasterAndData)";

/// EIP-712 domain type string.
pub const EIP712_DOMAIN_TYPEHASH: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const DOMAIN_NAME: &str = "ERC4337";
const DOMAIN_VERSION: &str = "1";

sol! {
    struct PackedUserOperationTyped {
        bytes32 typeHash;
        address sender;
        uint256 nonce;
        bytes32 initCodeHash;
        bytes32 callDataHash;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 paymasterAndDataHash;
    }

    struct DomainSeparatorData {
        bytes32 typeHash;
        bytes32 nameHash;
        bytes32 versionHash;
        uint256 chainId;
        address verifyingContract;
    }
}

/// EntryPoint release the operation is addressed to. Only the hash differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// `keccak256(abi.encode(keccak256(packed), entryPoint, chainId))`.
    #[default]
    #[serde(rename = "v0.7")]
    V07,
    /// EIP-712 typed data hash with domain `ERC4337`/`1`.
    #[serde(rename = "v0.8")]
    V08,
}

impl EntryPointVersion {
    /// The canonical deployment of this release.
    pub const fn canonical_address(self) -> Address {
        match self {
            Self::V07 => ENTRY_POINT_V07,
            Self::V08 => ENTRY_POINT_V08,
        }
    }
}

impl std::str::FromStr for EntryPointVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('v') {
            "0.7" => Ok(Self::V07),
            "0.8" => Ok(Self::V08),
            other => Err(format!("unsupported entry point version: {other}")),
        }
    }
}

/// The authorized-action record, with gas and fee fields packed as the
/// EntryPoint stores them.
///
/// Built with an empty signature, then signed once with [`Self::with_signature`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account.
    pub sender: Address,
    /// Key namespace in the upper 192 bits, sequence in the lower 64.
    pub nonce: U256,
    /// Deployment payload: factory address followed by factory calldata. Empty
    /// unless this operation deploys the account.
    pub init_code: Bytes,
    /// What the account executes.
    pub call_data: Bytes,
    /// `verificationGasLimit` (high) and `callGasLimit` (low).
    pub account_gas_limits: B256,
    /// Gas paid to the relay for overhead outside the EntryPoint's metering.
    pub pre_verification_gas: U256,
    /// `maxPriorityFeePerGas` (high) and `maxFeePerGas` (low).
    pub gas_fees: B256,
    /// Paymaster payload. Empty when the account pays for itself.
    pub paymaster_and_data: Bytes,
    /// Variant-dependent signature bytes.
    pub signature: Bytes,
}

impl UserOperation {
    /// Gas for the account's validation step.
    pub fn verification_gas_limit(&self) -> u128 {
        unpack_pair(self.account_gas_limits).0
    }

    /// Gas for the account's execution step.
    pub fn call_gas_limit(&self) -> u128 {
        unpack_pair(self.account_gas_limits).1
    }

    /// Tip per gas.
    pub fn max_priority_fee_per_gas(&self) -> u128 {
        unpack_pair(self.gas_fees).0
    }

    /// Fee cap per gas.
    pub fn max_fee_per_gas(&self) -> u128 {
        unpack_pair(self.gas_fees).1
    }

    /// Replaces both gas limits.
    pub fn set_gas_limits(
        &mut self,
        verification_gas_limit: U256,
        call_gas_limit: U256,
    ) -> Result<(), EncodingError> {
        self.account_gas_limits = pack_pair(verification_gas_limit, call_gas_limit)?;
        Ok(())
    }

    /// Replaces both fee fields.
    pub fn set_fees(
        &mut self,
        max_priority_fee_per_gas: U256,
        max_fee_per_gas: U256,
    ) -> Result<(), EncodingError> {
        self.gas_fees = pack_pair(max_priority_fee_per_gas, max_fee_per_gas)?;
        Ok(())
    }

    /// Whether this operation deploys its account.
    pub fn deploys_account(&self) -> bool {
        !self.init_code.is_empty()
    }

    /// Attaches the final signature.
    pub fn with_signature(self, signature: Bytes) -> Self {
        Self { signature, ..self }
    }

    /// Hash the EntryPoint assigns to this operation. Excludes the signature.
    pub fn hash(&self, entry_point: Address, chain_id: u64, version: EntryPointVersion) -> B256 {
        match version {
            EntryPointVersion::V07 => {
                let packed = (
                    self.sender,
                    self.nonce,
                    keccak256(&self.init_code),
                    keccak256(&self.call_data),
                    self.account_gas_limits,
                    self.pre_verification_gas,
                    self.gas_fees,
                    keccak256(&self.paymaster_and_data),
                )
                    .abi_encode();
                keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
            }
            EntryPointVersion::V08 => {
                let struct_hash = keccak256(self.typed_struct().abi_encode());
                to_typed_data_hash(compute_domain_separator(chain_id, entry_point), struct_hash)
            }
        }
    }

    fn typed_struct(&self) -> PackedUserOperationTyped {
        PackedUserOperationTyped {
            typeHash: keccak256(USEROP_TYPEHASH.as_bytes()),
            sender: self.sender,
            nonce: self.nonce,
            initCodeHash: keccak256(&self.init_code),
            callDataHash: keccak256(&self.call_data),
            accountGasLimits: self.account_gas_limits,
            preVerificationGas: self.pre_verification_gas,
            gasFees: self.gas_fees,
            paymasterAndDataHash: keccak256(&self.paymaster_and_data),
        }
    }

    /// Converts to the relay wire schema: packed fields unpacked, payloads split.
    pub fn to_rpc(&self) -> Result<RpcUserOperation, EncodingError> {
        let factory = split_deployment_payload(&self.init_code)?;
        let paymaster = split_paymaster_payload(&self.paymaster_and_data)?;
        let (verification_gas_limit, call_gas_limit) = unpack_pair(self.account_gas_limits);
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_pair(self.gas_fees);

        Ok(RpcUserOperation {
            sender: self.sender,
            nonce: self.nonce,
            factory: factory.as_ref().map(|f| f.factory),
            factory_data: factory.map(|f| f.data).filter(|d| !d.is_empty()),
            call_data: self.call_data.clone(),
            call_gas_limit: U256::from(call_gas_limit),
            verification_gas_limit: U256::from(verification_gas_limit),
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas: U256::from(max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(max_priority_fee_per_gas),
            paymaster: paymaster.as_ref().map(|p| p.paymaster),
            paymaster_verification_gas_limit: paymaster
                .as_ref()
                .map(|p| U256::from(p.verification_gas_limit)),
            paymaster_post_op_gas_limit: paymaster.as_ref().map(|p| U256::from(p.post_op_gas_limit)),
            paymaster_data: paymaster.map(|p| p.data).filter(|d| !d.is_empty()),
            signature: self.signature.clone(),
        })
    }
}

/// User operation as relays accept it over JSON-RPC.
///
/// Absent optional fields are omitted from the JSON object entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUserOperation {
    /// The smart account.
    pub sender: Address,
    /// Account nonce.
    #[serde(with = "quantity")]
    pub nonce: U256,
    /// Factory deploying the account, if this operation deploys it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    /// Factory calldata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    /// What the account executes.
    pub call_data: Bytes,
    /// Gas for execution.
    #[serde(with = "quantity")]
    pub call_gas_limit: U256,
    /// Gas for validation.
    #[serde(with = "quantity")]
    pub verification_gas_limit: U256,
    /// Relay overhead gas.
    #[serde(with = "quantity")]
    pub pre_verification_gas: U256,
    /// Fee cap per gas.
    #[serde(with = "quantity")]
    pub max_fee_per_gas: U256,
    /// Tip per gas.
    #[serde(with = "quantity")]
    pub max_priority_fee_per_gas: U256,
    /// Paymaster sponsoring the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    /// Gas for the paymaster's validation.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::option")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Gas for the paymaster's post-operation hook.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "quantity::option")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    /// Paymaster-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    /// Signature bytes.
    pub signature: Bytes,
}

impl TryFrom<RpcUserOperation> for UserOperation {
    type Error = EncodingError;

    fn try_from(op: RpcUserOperation) -> Result<Self, Self::Error> {
        let factory = op.factory.map(|factory| FactoryCall {
            factory,
            data: op.factory_data.clone().unwrap_or_default(),
        });
        let paymaster = match op.paymaster {
            Some(paymaster) => Some(PaymasterFields {
                paymaster,
                verification_gas_limit: codec::to_u128(
                    "paymasterVerificationGasLimit",
                    op.paymaster_verification_gas_limit.unwrap_or_default(),
                )?,
                post_op_gas_limit: codec::to_u128(
                    "paymasterPostOpGasLimit",
                    op.paymaster_post_op_gas_limit.unwrap_or_default(),
                )?,
                data: op.paymaster_data.clone().unwrap_or_default(),
            }),
            None => None,
        };

        Ok(Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: join_deployment_payload(factory.as_ref()),
            call_data: op.call_data,
            account_gas_limits: pack_pair(op.verification_gas_limit, op.call_gas_limit)?,
            pre_verification_gas: op.pre_verification_gas,
            gas_fees: pack_pair(op.max_priority_fee_per_gas, op.max_fee_per_gas)?,
            paymaster_and_data: join_paymaster_payload(paymaster.as_ref()),
            signature: op.signature,
        })
    }
}

/// Gas values returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimate {
    /// Relay overhead gas.
    pub pre_verification_gas: U256,
    /// Validation gas.
    pub verification_gas_limit: U256,
    /// Execution gas.
    pub call_gas_limit: U256,
    /// Paymaster validation gas, when a paymaster is involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    /// Paymaster post-operation gas, when a paymaster is involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// `keccak256(abi.encode(EIP712_DOMAIN_TYPEHASH, keccak256("ERC4337"), keccak256("1"), chainId, entryPoint))`.
pub fn compute_domain_separator(chain_id: u64, entry_point: Address) -> B256 {
    let data = DomainSeparatorData {
        typeHash: keccak256(EIP712_DOMAIN_TYPEHASH.as_bytes()),
        nameHash: keccak256(DOMAIN_NAME.as_bytes()),
        versionHash: keccak256(DOMAIN_VERSION.as_bytes()),
        chainId: U256::from(chain_id),
        verifyingContract: entry_point,
    };
    keccak256(data.abi_encode())
}

/// `keccak256(0x19 0x01 ++ domainSeparator ++ structHash)`.
pub fn to_typed_data_hash(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut enc = [0u8; 66];
    enc[0] = 0x19;
    enc[1] = 0x01;
    enc[2..34].copy_from_slice(domain_separator.as_slice());
    enc[34..66].copy_from_slice(struct_hash.as_slice());
    keccak256(enc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{b256, bytes};
    use std::str::FromStr;

    fn sample_operation() -> UserOperation {
        let mut op = UserOperation {
            sender: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            nonce: U256::from(1),
            init_code: bytes!("2222222222222222222222222222222222222222abcdef"),
            call_data: bytes!("b61d27f6"),
            pre_verification_gas: U256::from(0x186a0),
            paymaster_and_data: Bytes::new(),
            signature: bytes!("01"),
            ..Default::default()
        };
        op.set_gas_limits(U256::from(0x1e8480), U256::from(0x2dc6c0)).unwrap();
        op.set_fees(U256::from(0x3b9aca00), U256::from(0x77359400)).unwrap();
        op
    }

    #[test]
    fn test_packed_accessors_unpack_both_halves() {
        let op = sample_operation();
        assert_eq!(op.verification_gas_limit(), 0x1e8480);
        assert_eq!(op.call_gas_limit(), 0x2dc6c0);
        assert_eq!(op.max_priority_fee_per_gas(), 0x3b9aca00);
        assert_eq!(op.max_fee_per_gas(), 0x77359400);
    }

    #[test]
    fn test_wire_schema_unpacks_and_splits() {
        let rpc = sample_operation().to_rpc().unwrap();
        let json = serde_json::to_value(&rpc).unwrap();

        assert_eq!(json["nonce"], "0x1");
        assert_eq!(json["factory"], "0x2222222222222222222222222222222222222222");
        assert_eq!(json["factoryData"], "0xabcdef");
        assert_eq!(json["callGasLimit"], "0x2dc6c0");
        assert_eq!(json["verificationGasLimit"], "0x1e8480");
        assert_eq!(json["preVerificationGas"], "0x186a0");
        assert_eq!(json["maxFeePerGas"], "0x77359400");
        assert_eq!(json["maxPriorityFeePerGas"], "0x3b9aca00");
        for absent in [
            "paymaster",
            "paymasterData",
            "paymasterVerificationGasLimit",
            "paymasterPostOpGasLimit",
        ] {
            assert!(json.get(absent).is_none(), "{absent} should be omitted");
        }
    }

    #[test]
    fn test_wire_schema_omits_factory_for_deployed_accounts() {
        let op = UserOperation { init_code: Bytes::new(), ..sample_operation() };
        let json = serde_json::to_value(op.to_rpc().unwrap()).unwrap();
        assert!(json.get("factory").is_none());
        assert!(json.get("factoryData").is_none());
    }

    #[test]
    fn test_wire_schema_converts_back_to_packed_form() {
        let mut op = sample_operation();
        op.paymaster_and_data = join_paymaster_payload(Some(&PaymasterFields {
            paymaster: address!("3333333333333333333333333333333333333333"),
            verification_gas_limit: 0x186a0,
            post_op_gas_limit: 0x27100,
            data: bytes!("fafb"),
        }));
        let json = serde_json::to_string(&op.to_rpc().unwrap()).unwrap();
        let parsed: RpcUserOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(UserOperation::try_from(parsed).unwrap(), op);
    }

    #[test]
    fn test_should_deserialize_relay_payload() {
        const TEST_PACKED_USER_OPERATION: &str = r#"
        {
        "sender": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        "nonce": "0x1",
        "factory": "0x2222222222222222222222222222222222222222",
        "factoryData": "0xabcdef1234560000000000000000000000000000000000000000000000000000",
        "callData": "0xb61d27f600000000000000000000000000000000000000000000000000000000000000c8",
        "callGasLimit": "0x2dc6c0",
        "verificationGasLimit": "0x1e8480",
        "preVerificationGas": "0x186a0",
        "maxFeePerGas": "0x77359400",
        "maxPriorityFeePerGas": "0x3b9aca00",
        "paymaster": "0x3333333333333333333333333333333333333333",
        "paymasterVerificationGasLimit": "0x186a0",
        "paymasterPostOpGasLimit": "0x27100",
        "paymasterData": "0xfafb00000000000000000000000000000000000000000000000000000000000064",
        "signature": "0xa3c5f1b90014e68abbbdc42e4b77b9accc0b7e1c5d0b5bcde1a47ba8faba00ff55c9a7de12e98b731766e35f6c51ab25c9b58cc0e7c4a33f25e75c51c6ad3c3a"
        }
    "#;
        let rpc: RpcUserOperation = serde_json::from_str(TEST_PACKED_USER_OPERATION).unwrap();
        let op = UserOperation::try_from(rpc).unwrap();
        assert_eq!(
            op.sender,
            Address::from_str("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap()
        );
        assert_eq!(op.call_gas_limit(), 0x2dc6c0);
        assert_eq!(op.verification_gas_limit(), 0x1e8480);
        assert_eq!(&op.init_code[..20], address!("2222222222222222222222222222222222222222").as_slice());
        assert_eq!(op.paymaster_and_data.len(), 52 + 33);
    }

    #[test]
    fn test_should_reject_incomplete_relay_payload() {
        const TEST_INVALID_USER_OPERATION: &str = r#"
        {
            "sender": "0x1111111111111111111111111111111111111111",
            "nonce": "0x0",
            "callGasLimit": "0x5208"
        }
    "#;
        assert!(serde_json::from_str::<RpcUserOperation>(TEST_INVALID_USER_OPERATION).is_err());
    }

    #[test]
    fn test_gas_estimate_parses_hex_quantities() {
        let estimate: UserOperationGasEstimate = serde_json::from_str(
            r#"{"preVerificationGas":"0xb5c8","verificationGasLimit":"0x5f5e1","callGasLimit":"0x3e80"}"#,
        )
        .unwrap();
        assert_eq!(estimate.pre_verification_gas, U256::from(0xb5c8));
        assert_eq!(estimate.verification_gas_limit, U256::from(0x5f5e1));
        assert_eq!(estimate.call_gas_limit, U256::from(0x3e80));
        assert_eq!(estimate.paymaster_verification_gas_limit, None);
    }

    #[test]
    fn test_hash_ignores_the_signature() {
        let op = sample_operation();
        let resigned = op.clone().with_signature(bytes!("deadbeef"));
        for version in [EntryPointVersion::V07, EntryPointVersion::V08] {
            assert_eq!(
                op.hash(ENTRY_POINT_V07, 8453, version),
                resigned.hash(ENTRY_POINT_V07, 8453, version)
            );
        }
    }

    #[test]
    fn test_hash_binds_chain_and_entry_point() {
        let op = sample_operation();
        let base = op.hash(ENTRY_POINT_V07, 8453, EntryPointVersion::V07);
        assert_ne!(base, op.hash(ENTRY_POINT_V07, 1, EntryPointVersion::V07));
        assert_ne!(base, op.hash(ENTRY_POINT_V08, 8453, EntryPointVersion::V07));
        assert_ne!(base, op.hash(ENTRY_POINT_V07, 8453, EntryPointVersion::V08));
    }

    #[test]
    fn test_domain_separator_matches_manual_encoding() {
        let mut manual = Vec::new();
        manual.extend_from_slice(keccak256(EIP712_DOMAIN_TYPEHASH.as_bytes()).as_slice());
        manual.extend_from_slice(keccak256(b"ERC4337").as_slice());
        manual.extend_from_slice(keccak256(b"1").as_slice());
        manual.extend_from_slice(&U256::from(8453).to_be_bytes::<32>());
        manual.extend_from_slice(B256::left_padding_from(ENTRY_POINT_V08.as_slice()).as_slice());
        assert_eq!(compute_domain_separator(8453, ENTRY_POINT_V08), keccak256(manual));
    }

    #[test]
    fn test_typed_data_hash_prefixes_eip191_version_byte() {
        let domain = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        let inner = b256!("0x2222222222222222222222222222222222222222222222222222222222222222");
        let mut manual = vec![0x19, 0x01];
        manual.extend_from_slice(domain.as_slice());
        manual.extend_from_slice(inner.as_slice());
        assert_eq!(to_typed_data_hash(domain, inner), keccak256(manual));
    }

    #[test]
    fn test_entry_point_versions_parse() {
        assert_eq!("v0.7".parse::<EntryPointVersion>().unwrap(), EntryPointVersion::V07);
        assert_eq!("0.8".parse::<EntryPointVersion>().unwrap(), EntryPointVersion::V08);
        assert!("0.6".parse::<EntryPointVersion>().is_err());
    }
}
