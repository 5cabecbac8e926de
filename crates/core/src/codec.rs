//! Fixed-width field packing and wire quantity helpers.
//!
//! EntryPoint v0.7+ packs two 128-bit values into one `bytes32` slot
//! (`accountGasLimits`, `gasFees`) and concatenates addresses with trailing
//! calldata (`initCode`, `paymasterAndData`). The functions here are the only
//! place those layouts are produced or taken apart.

use alloy_primitives::{Address, B256, Bytes, I256, U256};

use crate::error::EncodingError;

/// Length of the address prefix of a deployment or paymaster payload.
pub const ADDRESS_LEN: usize = 20;

/// Fixed prefix of a non-empty paymaster payload: address + two 16-byte gas limits.
pub const PAYMASTER_PREFIX_LEN: usize = ADDRESS_LEN + 16 + 16;

/// Packs two 128-bit values into one 32-byte field, `high` in the upper half.
///
/// Fails if either value is `>= 2^128`.
pub fn pack_pair(high: U256, low: U256) -> Result<B256, EncodingError> {
    let high = to_u128("high", high)?;
    let low = to_u128("low", low)?;
    Ok(pack_u128_pair(high, low))
}

/// Infallible form of [`pack_pair`] for values already known to fit.
pub fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(&high.to_be_bytes());
    packed[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(packed)
}

/// Exact inverse of [`pack_pair`]: returns `(high, low)`.
pub fn unpack_pair(packed: B256) -> (u128, u128) {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&packed[..16]);
    low.copy_from_slice(&packed[16..]);
    (u128::from_be_bytes(high), u128::from_be_bytes(low))
}

/// Narrows `value` to 128 bits, naming `field` in the error.
pub fn to_u128(field: &'static str, value: U256) -> Result<u128, EncodingError> {
    u128::try_from(value).map_err(|_| EncodingError::ValueOutOfRange { field, value })
}

/// Renders `value` as a `0x`-prefixed hex quantity with no leading zero nibbles.
///
/// Zero is rendered as `0x0`.
pub fn to_minimal_hex_quantity(value: U256) -> String {
    if value.is_zero() {
        return "0x0".to_string();
    }
    let digits = hex::encode(value.to_be_bytes_trimmed_vec());
    format!("0x{}", digits.trim_start_matches('0'))
}

/// Signed entry point to [`to_minimal_hex_quantity`]; negative values are rejected.
pub fn signed_to_hex_quantity(value: I256) -> Result<String, EncodingError> {
    if value.is_negative() {
        return Err(EncodingError::NegativeQuantity(value));
    }
    Ok(to_minimal_hex_quantity(value.into_raw()))
}

/// Factory address and calldata carried by a deployment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryCall {
    /// Factory contract the EntryPoint calls to create the account.
    pub factory: Address,
    /// Calldata for that call.
    pub data: Bytes,
}

/// Splits a deployment payload into factory address and factory calldata.
///
/// An empty payload means "no deployment" and yields `None`.
pub fn split_deployment_payload(payload: &[u8]) -> Result<Option<FactoryCall>, EncodingError> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < ADDRESS_LEN {
        return Err(EncodingError::PayloadTooShort {
            field: "deployment payload",
            len: payload.len(),
            min: ADDRESS_LEN,
        });
    }
    let (factory, data) = payload.split_at(ADDRESS_LEN);
    Ok(Some(FactoryCall {
        factory: Address::from_slice(factory),
        data: Bytes::copy_from_slice(data),
    }))
}

/// Inverse of [`split_deployment_payload`].
pub fn join_deployment_payload(call: Option<&FactoryCall>) -> Bytes {
    call.map_or_else(Bytes::new, |call| {
        let mut buf = Vec::with_capacity(ADDRESS_LEN + call.data.len());
        buf.extend_from_slice(call.factory.as_slice());
        buf.extend_from_slice(&call.data);
        Bytes::from(buf)
    })
}

/// Parts of a paymaster payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterFields {
    /// Paymaster contract.
    pub paymaster: Address,
    /// Gas for the paymaster's validation step.
    pub verification_gas_limit: u128,
    /// Gas for the paymaster's post-operation step.
    pub post_op_gas_limit: u128,
    /// Paymaster-specific data, typically its signature over the operation.
    pub data: Bytes,
}

/// Splits `paymaster(20) ++ verificationGas(16) ++ postOpGas(16) ++ data`.
///
/// An empty payload means the account pays for itself and yields `None`.
pub fn split_paymaster_payload(payload: &[u8]) -> Result<Option<PaymasterFields>, EncodingError> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < PAYMASTER_PREFIX_LEN {
        return Err(EncodingError::PayloadTooShort {
            field: "paymaster payload",
            len: payload.len(),
            min: PAYMASTER_PREFIX_LEN,
        });
    }
    let (gas, data) = payload[ADDRESS_LEN..].split_at(32);
    let (verification_gas_limit, post_op_gas_limit) = unpack_pair(B256::from_slice(gas));
    Ok(Some(PaymasterFields {
        paymaster: Address::from_slice(&payload[..ADDRESS_LEN]),
        verification_gas_limit,
        post_op_gas_limit,
        data: Bytes::copy_from_slice(data),
    }))
}

/// Inverse of [`split_paymaster_payload`].
pub fn join_paymaster_payload(fields: Option<&PaymasterFields>) -> Bytes {
    fields.map_or_else(Bytes::new, |fields| {
        let mut buf = Vec::with_capacity(PAYMASTER_PREFIX_LEN + fields.data.len());
        buf.extend_from_slice(fields.paymaster.as_slice());
        buf.extend_from_slice(
            pack_u128_pair(fields.verification_gas_limit, fields.post_op_gas_limit).as_slice(),
        );
        buf.extend_from_slice(&fields.data);
        Bytes::from(buf)
    })
}

/// Serde adapters that write integers as minimal hex quantities.
pub mod quantity {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::to_minimal_hex_quantity;

    /// Serializes a quantity.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_minimal_hex_quantity(*value))
    }

    /// Deserializes a hex or decimal quantity.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        U256::deserialize(deserializer)
    }

    /// Same adapters for optional quantities.
    pub mod option {
        use alloy_primitives::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serializes an optional quantity; `None` is written as `null`.
        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes an optional quantity.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<U256>::deserialize(deserializer)
        }
    }
}
