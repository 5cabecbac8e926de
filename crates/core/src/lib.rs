//! Core primitives for passkey-controlled ERC-4337 accounts: field packing,
//! the user operation model, signature encoding and error classification.

pub mod classifier;
pub mod codec;
pub mod error;
pub mod logger;
pub mod signature;
pub mod user_operation;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classifier::{ClassifiedError, ErrorKind, classify, classify_bundler};
pub use error::{
    BuildError, BundlerError, DerivationError, EncodingError, Error, ProviderError,
    SignatureError, TransportErrorKind,
};
pub use signature::{
    ChallengeSigner, CredentialInput, DualFactorSigner, LocalOwnerSigner, SignatureScheme,
    SigningMaterial, WebAuthnAssertion, encode_signature,
};
pub use user_operation::{
    ENTRY_POINT_V07, ENTRY_POINT_V08, EntryPointVersion, RpcUserOperation, UserOperation,
    UserOperationGasEstimate,
};
