//! Error taxonomy shared by every stage of the operation pipeline.
//!
//! Each stage owns one error type. [`Error`] wraps them so callers can use `?`
//! across stages, and [`crate::classifier::classify`] reduces any of them to a
//! [`crate::classifier::ClassifiedError`].

use std::time::Duration;

use alloy_primitives::{Address, B256, I256, U256};
use serde_json::Value;

/// Malformed packing or unpacking input. Programmer error, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// A value that must fit in one 16-byte half of a packed field did not.
    #[error("{field} value {value} does not fit in 128 bits")]
    ValueOutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: U256,
    },
    /// Quantities on the wire are unsigned.
    #[error("negative quantity {0} cannot be encoded")]
    NegativeQuantity(I256),
    /// A concatenated payload is shorter than its fixed-width prefix.
    #[error("{field} is {len} bytes, expected at least {min}")]
    PayloadTooShort {
        /// Name of the payload.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Minimum length of a non-empty payload.
        min: usize,
    },
}

/// Bad signing input. Fatal; the caller has to sign again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// DER structure did not match `SEQUENCE { INTEGER r, INTEGER s }`.
    #[error("malformed DER signature: {0}")]
    Malformed(String),
    /// `"challenge":"` is absent from clientDataJSON.
    #[error("clientDataJSON does not contain a \"challenge\" member")]
    ChallengeNotFound,
    /// `"type":"` is absent from clientDataJSON.
    #[error("clientDataJSON does not contain a \"type\" member")]
    TypeNotFound,
    /// A length or offset does not fit the 2-byte slot reserved for it.
    #[error("{field} is {value}, which does not fit in 16 bits")]
    FieldTooLarge {
        /// Name of the length or offset.
        field: &'static str,
        /// The rejected value.
        value: usize,
    },
    /// Owner signatures are raw 65-byte `r || s || v`.
    #[error("owner signature must be 65 bytes, got {0}")]
    InvalidOwnerSignatureLength(usize),
    /// Credential material could not be decoded from its external representation.
    #[error("invalid {encoding} credential: {reason}")]
    InvalidCredential {
        /// The representation that was being decoded.
        encoding: &'static str,
        /// Decoder message.
        reason: String,
    },
    /// The signing collaborator failed.
    #[error("signer failed: {0}")]
    Signer(String),
}

/// Failure of an on-chain read against the chain RPC (not the relay).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct ProviderError {
    /// The read that failed, e.g. `getNonce`.
    pub operation: &'static str,
    /// Transport or ABI decoding message.
    pub message: String,
}

impl ProviderError {
    /// Wraps any displayable error as the failure of `operation`.
    pub fn new(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self { operation, message: err.to_string() }
    }
}

/// Counterfactual address derivation could not produce a trustworthy address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    /// The local computation needs the account creation bytecode.
    #[error("account creation bytecode is not configured")]
    MissingCreationCode,
    /// The factory returned something that cannot be an account address and
    /// there is no local computation to fall back on.
    #[error("factory {factory} returned anomalous address {returned}")]
    FactoryAnomaly {
        /// Factory that was queried.
        factory: Address,
        /// What it returned.
        returned: Address,
    },
    /// On-chain and local computations disagree.
    #[error("factory returned {on_chain} but local computation gives {local}")]
    Mismatch {
        /// Value returned by the factory.
        on_chain: Address,
        /// Value computed from the configured bytecode.
        local: Address,
    },
    /// The factory read failed and there is no local computation to fall back on.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The builder was asked for an operation that cannot be valid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Deployment payload requested for an account that already has code.
    #[error("account {0} is already deployed")]
    AlreadyDeployed(Address),
    /// The account has no code and the operation does not deploy it.
    #[error("account {0} is not deployed and the operation does not deploy it")]
    NotDeployed(Address),
    /// `executeBatch` with no calls.
    #[error("batch call has no calls")]
    EmptyBatch,
    /// Packing a gas or fee field failed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// Reading the nonce or deployment status failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Resolving the sender address failed.
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Which part of the transport failed before a JSON-RPC response arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request exceeded its deadline.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// Anything else below the HTTP layer.
    Other,
}

/// Failure talking to the relay.
///
/// Request-level variants keep the method and raw params so the failure can be
/// replayed offline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BundlerError {
    /// No HTTP response was received.
    #[error("{method}: transport error ({kind:?}): {message}")]
    Transport {
        /// JSON-RPC method.
        method: String,
        /// Raw request params.
        params: Value,
        /// Transport failure class.
        kind: TransportErrorKind,
        /// Underlying error message.
        message: String,
    },
    /// The relay answered with a non-success HTTP status.
    #[error("{method}: HTTP status {status}: {body}")]
    Http {
        /// JSON-RPC method.
        method: String,
        /// Raw request params.
        params: Value,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The relay answered with a JSON-RPC error object.
    #[error("{method}: RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC method.
        method: String,
        /// Raw request params.
        params: Value,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
        /// Optional error data.
        data: Option<Value>,
    },
    /// The response could not be decoded.
    #[error("{method}: invalid response: {message}")]
    InvalidResponse {
        /// JSON-RPC method.
        method: String,
        /// Raw request params.
        params: Value,
        /// Decoder message.
        message: String,
    },
    /// The operation was included but its execution failed.
    #[error("user operation {user_op_hash} was included but reverted{}", suffix(": ", .reason.as_deref()))]
    Reverted {
        /// Hash of the operation.
        user_op_hash: B256,
        /// Revert reason reported in the receipt.
        reason: Option<String>,
    },
    /// No receipt within the poll timeout. The operation may still land.
    #[error("no receipt for user operation {user_op_hash} after {waited:?}{}", suffix(", last error: ", .last_error.as_deref()))]
    Timeout {
        /// Hash of the operation.
        user_op_hash: B256,
        /// How long the poll loop waited.
        waited: Duration,
        /// Last transport error seen while polling.
        last_error: Option<Box<BundlerError>>,
    },
    /// The relay does not serve the configured EntryPoint.
    #[error("relay does not support entry point {entry_point} (supported: {supported:?})")]
    UnsupportedEntryPoint {
        /// Configured EntryPoint.
        entry_point: Address,
        /// What the relay reported.
        supported: Vec<Address>,
    },
    /// The operation could not be converted to the wire schema.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl BundlerError {
    /// The JSON-RPC method of request-level failures.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Transport { method, .. }
            | Self::Http { method, .. }
            | Self::Rpc { method, .. }
            | Self::InvalidResponse { method, .. } => Some(method),
            Self::Reverted { .. }
            | Self::Timeout { .. }
            | Self::UnsupportedEntryPoint { .. }
            | Self::Encoding(_) => None,
        }
    }
}

fn suffix<T: std::fmt::Display + ?Sized>(prefix: &str, detail: Option<&T>) -> String {
    detail.map(|d| format!("{prefix}{d}")).unwrap_or_default()
}

/// Any error produced by the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// See [`EncodingError`].
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// See [`SignatureError`].
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// See [`DerivationError`].
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    /// See [`BuildError`].
    #[error(transparent)]
    Build(#[from] BuildError),
    /// See [`BundlerError`].
    #[error(transparent)]
    Bundler(#[from] BundlerError),
    /// See [`ProviderError`].
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
