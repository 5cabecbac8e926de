//! Fixtures shared by the workspace's tests.

use alloy_primitives::{Address, B256, Bytes, U256, address, bytes};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::hazmat::PrehashSigner};
use sha2::{Digest, Sha256};

use crate::codec::pack_u128_pair;
use crate::error::SignatureError;
use crate::signature::{ChallengeSigner, SignatureScheme, SigningMaterial, WebAuthnAssertion};
use crate::user_operation::UserOperation;

/// Origin written into generated clientDataJSON.
pub const TEST_ORIGIN: &str = "http://localhost";

/// Minimal DER encoder for `(r, s)`, adding sign padding where needed.
pub fn der_encode_signature(r: &[u8], s: &[u8]) -> Vec<u8> {
    fn integer(value: &[u8]) -> Vec<u8> {
        let start = value.iter().position(|b| *b != 0).unwrap_or(value.len() - 1);
        let trimmed = &value[start..];
        let mut out = vec![0x02];
        if trimmed[0] & 0x80 != 0 {
            out.push(trimmed.len() as u8 + 1);
            out.push(0);
        } else {
            out.push(trimmed.len() as u8);
        }
        out.extend_from_slice(trimmed);
        out
    }

    let body = [integer(r), integer(s)].concat();
    let mut der = vec![0x30, body.len() as u8];
    der.extend_from_slice(&body);
    der
}

/// clientDataJSON for a `webauthn.get` ceremony over `challenge`.
pub fn client_data_json(challenge: B256) -> String {
    format!(
        r#"{{"type":"webauthn.get","challenge":"{}","origin":"{TEST_ORIGIN}","crossOrigin":false}}"#,
        URL_SAFE_NO_PAD.encode(challenge.as_slice())
    )
}

/// Software P-256 key standing in for a platform authenticator.
#[derive(Debug, Clone)]
pub struct TestPasskey {
    signing_key: SigningKey,
}

impl TestPasskey {
    /// Key from a fixed secret scalar.
    pub fn new(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret.into()).expect("valid P-256 scalar");
        Self { signing_key }
    }

    /// The verifying half.
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Uncompressed public key coordinates `(x, y)`.
    pub fn coordinates(&self) -> (B256, B256) {
        let point = self.verifying_key().to_encoded_point(false);
        (
            B256::from_slice(point.x().expect("uncompressed point")),
            B256::from_slice(point.y().expect("uncompressed point")),
        )
    }

    /// DER signature over a 32-byte prehash. Not normalized.
    pub fn sign_der(&self, prehash: B256) -> Vec<u8> {
        let signature: Signature =
            self.signing_key.sign_prehash(prehash.as_slice()).expect("signing succeeds");
        let (r, s) = signature.split_bytes();
        der_encode_signature(&r, &s)
    }

    /// Full WebAuthn assertion over `challenge`, signed the way an authenticator does:
    /// `sha256(authenticatorData ++ sha256(clientDataJSON))`.
    pub fn assert(&self, challenge: B256) -> WebAuthnAssertion {
        let mut authenticator_data = vec![0u8; 37];
        authenticator_data[..32].copy_from_slice(&Sha256::digest(b"localhost"));
        authenticator_data[32] = 0x05;
        let client_data_json = client_data_json(challenge);

        let mut hasher = Sha256::new();
        hasher.update(&authenticator_data);
        hasher.update(Sha256::digest(client_data_json.as_bytes()));
        let message = B256::from_slice(&hasher.finalize());

        WebAuthnAssertion {
            authenticator_data: Bytes::from(authenticator_data),
            client_data_json: Bytes::from(client_data_json.into_bytes()),
            signature: Bytes::from(self.sign_der(message)),
        }
    }
}

#[async_trait]
impl ChallengeSigner for TestPasskey {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Passkey
    }

    async fn sign_challenge(&self, challenge: B256) -> Result<SigningMaterial, SignatureError> {
        Ok(SigningMaterial::Passkey(self.assert(challenge)))
    }
}

/// Account used across fixtures.
pub const TEST_SENDER: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

/// Unsigned operation for a deployed account with plausible gas values.
pub fn sample_user_operation() -> UserOperation {
    UserOperation {
        sender: TEST_SENDER,
        nonce: U256::from(5),
        init_code: Bytes::new(),
        call_data: bytes!("b61d27f6"),
        account_gas_limits: pack_u128_pair(150_000, 200_000),
        pre_verification_gas: U256::from(50_000),
        gas_fees: pack_u128_pair(1_000_000_000, 2_000_000_000),
        paymaster_and_data: Bytes::new(),
        signature: Bytes::new(),
    }
}
