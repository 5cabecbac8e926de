//! Reduces any pipeline error to a kind, a retryable flag and a remediation hint.
//!
//! Classification is total: every input maps to some [`ClassifiedError`], and
//! nothing in this module can fail.

use std::fmt;

use crate::error::{BuildError, BundlerError, DerivationError, Error, SignatureError};

/// Failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Packing or unpacking input was invalid.
    Encoding,
    /// Signing material could not be encoded.
    InvalidSigningInput,
    /// The account address could not be derived.
    AddressDerivation,
    /// The requested operation cannot be built.
    InvalidOperation,
    /// Transport failure: timeout, refused connection, dropped stream.
    Network,
    /// The relay is throttling us.
    RateLimited,
    /// The relay is down or overloaded.
    RelayUnavailable,
    /// The relay rejected the request shape.
    InvalidRequest,
    /// The relay answered with something we could not decode.
    InvalidResponse,
    /// The account or paymaster cannot cover the prefund.
    InsufficientFunds,
    /// Signature rejected during validation.
    InvalidSignature,
    /// Nonce rejected during validation.
    InvalidNonce,
    /// Paymaster rejected or misconfigured.
    PaymasterRejected,
    /// Deployment payload failed or is missing.
    AccountDeployment,
    /// A gas limit is too low or values overflow.
    GasLimit,
    /// Validity window is not current.
    ValidityWindow,
    /// Any other validation rejection.
    ValidationRejected,
    /// Included on-chain but execution failed.
    Reverted,
    /// No receipt before the poll deadline. Outcome unknown.
    ReceiptTimeout,
    /// Nothing matched.
    Unknown,
}

impl ErrorKind {
    /// Whether the same request may succeed if sent again unchanged.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::RelayUnavailable)
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encoding => "encoding",
            Self::InvalidSigningInput => "invalid_signing_input",
            Self::AddressDerivation => "address_derivation",
            Self::InvalidOperation => "invalid_operation",
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::RelayUnavailable => "relay_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidResponse => "invalid_response",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidNonce => "invalid_nonce",
            Self::PaymasterRejected => "paymaster_rejected",
            Self::AccountDeployment => "account_deployment",
            Self::GasLimit => "gas_limit",
            Self::ValidityWindow => "validity_window",
            Self::ValidationRejected => "validation_rejected",
            Self::Reverted => "reverted",
            Self::ReceiptTimeout => "receipt_timeout",
            Self::Unknown => "unknown",
        }
    }

    /// What the caller should do about it.
    pub const fn hint(self) -> &'static str {
        match self {
            Self::Encoding => "a gas, fee or payload field is out of range; fix the input values",
            Self::InvalidSigningInput => "the signing material is malformed; request a new signature",
            Self::AddressDerivation => "configure the account creation bytecode or check the factory address",
            Self::InvalidOperation => "check whether the account is deployed and that the intent is not empty",
            Self::Network => "transient network failure; retry shortly",
            Self::RateLimited => "the relay is rate limiting; back off and retry",
            Self::RelayUnavailable => "the relay is unavailable; retry later or switch relays",
            Self::InvalidRequest => "the relay rejected the request; check the operation fields and entry point",
            Self::InvalidResponse => "the relay returned an unexpected response; check the relay URL and version",
            Self::InsufficientFunds => "fund the account or paymaster deposit to cover the prefund",
            Self::InvalidSignature => "re-sign the operation; make sure the signature matches the account's signer and is low-s",
            Self::InvalidNonce => "fetch the current nonce and rebuild the operation",
            Self::PaymasterRejected => "the paymaster refused to sponsor; check its data, deposit and signature",
            Self::AccountDeployment => "check the deployment payload: attach it only for undeployed accounts",
            Self::GasLimit => "re-estimate gas and raise the limits",
            Self::ValidityWindow => "the signature validity window is not current; re-sign with a fresh window",
            Self::ValidationRejected => "the entry point rejected the operation during validation",
            Self::Reverted => "the call reverted on-chain; inspect the target call",
            Self::ReceiptTimeout => "the operation may still land; query its receipt before resubmitting",
            Self::Unknown => "unrecognized failure; inspect the message",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reduced to what a caller can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    /// Category.
    pub kind: ErrorKind,
    /// Short human-readable message.
    pub message: String,
    /// Whether retrying unchanged may succeed.
    pub retryable: bool,
    /// Remediation hint.
    pub hint: &'static str,
    /// EntryPoint validation code found in the message, e.g. `AA24`.
    pub validation_code: Option<String>,
}

impl ClassifiedError {
    /// Classification of `kind` with the kind's default retryability and hint.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            hint: kind.hint(),
            validation_code: None,
        }
    }

    fn with_code(mut self, code: Option<String>) -> Self {
        self.validation_code = code;
        self
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.kind, self.message, self.hint)
    }
}

/// Classifies any pipeline error.
pub fn classify(error: &Error) -> ClassifiedError {
    match error {
        Error::Encoding(e) => ClassifiedError::new(ErrorKind::Encoding, e.to_string()),
        Error::Signature(e) => classify_signature(e),
        Error::Derivation(e) => classify_derivation(e),
        Error::Build(e) => classify_build(e),
        Error::Bundler(e) => classify_bundler(e),
        Error::Provider(e) => ClassifiedError::new(ErrorKind::Network, e.to_string()),
    }
}

fn classify_signature(error: &SignatureError) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::InvalidSigningInput, error.to_string())
}

fn classify_derivation(error: &DerivationError) -> ClassifiedError {
    match error {
        DerivationError::Provider(e) => ClassifiedError::new(ErrorKind::Network, e.to_string()),
        other => ClassifiedError::new(ErrorKind::AddressDerivation, other.to_string()),
    }
}

fn classify_build(error: &BuildError) -> ClassifiedError {
    match error {
        BuildError::Encoding(e) => ClassifiedError::new(ErrorKind::Encoding, e.to_string()),
        BuildError::Provider(e) => ClassifiedError::new(ErrorKind::Network, e.to_string()),
        BuildError::Derivation(e) => classify_derivation(e),
        other => ClassifiedError::new(ErrorKind::InvalidOperation, other.to_string()),
    }
}

/// Classifies a relay failure.
pub fn classify_bundler(error: &BundlerError) -> ClassifiedError {
    let message = error.to_string();
    match error {
        BundlerError::Transport { .. } => ClassifiedError::new(ErrorKind::Network, message),
        BundlerError::Http { status, body, .. } => classify_http(*status, body, message),
        BundlerError::Rpc { code, message: rpc_message, data, .. } => {
            let text = match data {
                Some(data) => format!("{rpc_message} {data}"),
                None => rpc_message.clone(),
            };
            let classified = classify_message(Some(*code), &text);
            ClassifiedError { message, ..classified }
        }
        BundlerError::InvalidResponse { .. } => {
            ClassifiedError::new(ErrorKind::InvalidResponse, message)
        }
        BundlerError::Reverted { .. } => ClassifiedError::new(ErrorKind::Reverted, message),
        BundlerError::Timeout { .. } => ClassifiedError::new(ErrorKind::ReceiptTimeout, message),
        BundlerError::UnsupportedEntryPoint { .. } => {
            ClassifiedError::new(ErrorKind::InvalidRequest, message)
        }
        BundlerError::Encoding(_) => ClassifiedError::new(ErrorKind::Encoding, message),
    }
}

fn classify_http(status: u16, body: &str, message: String) -> ClassifiedError {
    match status {
        429 => ClassifiedError::new(ErrorKind::RateLimited, message),
        408 => ClassifiedError::new(ErrorKind::Network, message),
        502..=504 => ClassifiedError::new(ErrorKind::RelayUnavailable, message),
        500 if find_validation_code(body).is_some() || contains_ignore_case(body, "revert") => {
            ClassifiedError { message, ..classify_message(None, body) }
        }
        500..=599 => ClassifiedError::new(ErrorKind::RelayUnavailable, message),
        400..=499 => ClassifiedError::new(ErrorKind::InvalidRequest, message),
        _ => ClassifiedError { message, ..classify_message(None, body) },
    }
}

/// Classifies raw error text and an optional JSON-RPC error code.
///
/// An EntryPoint validation code in the text wins over the RPC code, which
/// wins over keyword matching.
pub fn classify_message(code: Option<i64>, message: &str) -> ClassifiedError {
    let validation_code = find_validation_code(message);
    let kind = validation_code
        .as_deref()
        .map(kind_for_validation_code)
        .or_else(|| code.and_then(kind_for_rpc_code))
        .unwrap_or_else(|| kind_for_text(message));
    ClassifiedError::new(kind, message).with_code(validation_code)
}

/// Finds the first `AA` + two digits token that is not part of a longer word.
pub fn find_validation_code(message: &str) -> Option<String> {
    let bytes = message.as_bytes();
    (0..bytes.len().saturating_sub(3)).find_map(|i| {
        let token = &bytes[i..i + 4];
        let starts_word = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        let ends_word = bytes.get(i + 4).is_none_or(|b| !b.is_ascii_alphanumeric());
        (starts_word
            && ends_word
            && token[..2] == *b"AA"
            && token[2].is_ascii_digit()
            && token[3].is_ascii_digit())
        .then(|| String::from_utf8_lossy(token).into_owned())
    })
}

fn kind_for_validation_code(code: &str) -> ErrorKind {
    match code {
        "AA10" | "AA13" | "AA14" | "AA15" | "AA20" => ErrorKind::AccountDeployment,
        "AA21" | "AA31" | "AA51" => ErrorKind::InsufficientFunds,
        "AA22" | "AA32" => ErrorKind::ValidityWindow,
        "AA24" => ErrorKind::InvalidSignature,
        "AA25" => ErrorKind::InvalidNonce,
        "AA26" | "AA36" | "AA40" | "AA41" | "AA94" | "AA95" => ErrorKind::GasLimit,
        "AA30" | "AA33" | "AA34" | "AA93" => ErrorKind::PaymasterRejected,
        "AA50" => ErrorKind::Reverted,
        _ => ErrorKind::ValidationRejected,
    }
}

fn kind_for_rpc_code(code: i64) -> Option<ErrorKind> {
    let kind = match code {
        -32500 | -32502 | -32505 | -32506 => ErrorKind::ValidationRejected,
        -32501 | -32504 => ErrorKind::PaymasterRejected,
        -32503 => ErrorKind::ValidityWindow,
        -32005 => ErrorKind::RateLimited,
        -32507 => ErrorKind::InvalidSignature,
        -32521 => ErrorKind::Reverted,
        -32602 | -32600 | -32601 => ErrorKind::InvalidRequest,
        _ => return None,
    };
    Some(kind)
}

fn kind_for_text(message: &str) -> ErrorKind {
    const RULES: &[(&[&str], ErrorKind)] = &[
        (&["rate limit", "too many requests", "throttl"], ErrorKind::RateLimited),
        (
            &["timed out", "timeout", "connection refused", "econnrefused", "connection reset", "network error"],
            ErrorKind::Network,
        ),
        (&["service unavailable", "bad gateway"], ErrorKind::RelayUnavailable),
        (&["insufficient funds", "prefund", "deposit too low"], ErrorKind::InsufficientFunds),
        (&["invalid signature", "signature error"], ErrorKind::InvalidSignature),
        (&["nonce"], ErrorKind::InvalidNonce),
        (&["paymaster"], ErrorKind::PaymasterRejected),
        (&["execution reverted", "reverted"], ErrorKind::Reverted),
    ];
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| contains_ignore_case(message, n)))
        .map_or(ErrorKind::Unknown, |(_, kind)| *kind)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}
