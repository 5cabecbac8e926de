//! Signature encodings accepted by the account's validator.
//!
//! Three layouts exist, selected by the signing material:
//!
//! - owner-only: the raw 65-byte `r || s || v` ECDSA signature;
//! - passkey: the compact WebAuthn encoding
//!   `len(authData) u16 ++ authData ++ clientDataJSON ++ challengeOffset u16 ++ typeOffset u16 ++ r ++ s`;
//! - passkey and owner: the passkey layout followed by the 65-byte owner signature.
//!
//! Passkey signatures arrive DER-encoded and are always reduced to low-s form.

use alloy_primitives::{Address, B256, Bytes, U256, uint};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::debug;

use crate::error::SignatureError;

/// Order of the P-256 group.
pub const P256_N: U256 =
    uint!(0xFFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551_U256);

/// `P256_N / 2`. Canonical signatures have `s <= P256_HALF_N`.
pub const P256_HALF_N: U256 =
    uint!(0x7FFFFFFF800000007FFFFFFFFFFFFFFFDE737D56D38BCF4279DCE5617E3192A8_U256);

/// Length of a raw owner ECDSA signature.
pub const OWNER_SIGNATURE_LEN: usize = 65;

const CHALLENGE_KEY: &[u8] = br#""challenge":""#;
const TYPE_KEY: &[u8] = br#""type":""#;

const DER_SEQUENCE: u8 = 0x30;
const DER_INTEGER: u8 = 0x02;

/// Decodes a DER `SEQUENCE { INTEGER r, INTEGER s }` into fixed-width `(r, s)`,
/// with `s` reduced to its low form.
pub fn decode_der_signature(der: &[u8]) -> Result<(B256, B256), SignatureError> {
    let mut reader = DerReader { buf: der, pos: 0 };
    reader.expect_tag(DER_SEQUENCE)?;
    reader.read_length()?;
    let r = reader.read_integer("r")?;
    let s = reader.read_integer("s")?;
    let r = scalar_in_range("r", r)?;
    let s = scalar_in_range("s", s)?;

    let s = normalize_s(s);
    Ok((B256::from(r.to_be_bytes::<32>()), B256::from(s.to_be_bytes::<32>())))
}

/// Signature scalars live in `[1, n)`.
fn scalar_in_range(name: &str, value: B256) -> Result<U256, SignatureError> {
    let value = U256::from_be_bytes(value.0);
    if value.is_zero() || value >= P256_N {
        return Err(SignatureError::Malformed(format!("{name} is outside [1, n)")));
    }
    Ok(value)
}

/// Replaces `s` with `n - s` when `s` is in the upper half of the group order.
pub fn normalize_s(s: U256) -> U256 {
    if s > P256_HALF_N { P256_N - s } else { s }
}

struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl DerReader<'_> {
    fn next_byte(&mut self) -> Result<u8, SignatureError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| SignatureError::Malformed(format!("truncated at byte {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    fn expect_tag(&mut self, tag: u8) -> Result<(), SignatureError> {
        let found = self.next_byte()?;
        if found != tag {
            return Err(SignatureError::Malformed(format!(
                "expected tag {tag:#04x} at byte {}, found {found:#04x}",
                self.pos - 1
            )));
        }
        Ok(())
    }

    /// Short form, or long form with one length byte (`0x81`).
    fn read_length(&mut self) -> Result<usize, SignatureError> {
        match self.next_byte()? {
            len @ 0..=0x7f => Ok(len as usize),
            0x81 => Ok(self.next_byte()? as usize),
            other => Err(SignatureError::Malformed(format!("unsupported length byte {other:#04x}"))),
        }
    }

    fn read_integer(&mut self, name: &str) -> Result<B256, SignatureError> {
        self.expect_tag(DER_INTEGER)?;
        let len = self.read_length()?;
        let end = self.pos + len;
        let mut value = self.buf.get(self.pos..end).ok_or_else(|| {
            SignatureError::Malformed(format!("{name} declares {len} bytes past end of input"))
        })?;
        self.pos = end;

        if let [0, rest @ ..] = value {
            value = rest;
        }
        if value.is_empty() || value.len() > 32 {
            return Err(SignatureError::Malformed(format!(
                "{name} is {} bytes after sign padding",
                value.len()
            )));
        }
        Ok(B256::left_padding_from(value))
    }
}

/// A WebAuthn assertion as returned by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnAssertion {
    /// Raw authenticator data.
    pub authenticator_data: Bytes,
    /// clientDataJSON as UTF-8 bytes, exactly as signed.
    pub client_data_json: Bytes,
    /// DER-encoded P-256 signature.
    pub signature: Bytes,
}

impl WebAuthnAssertion {
    /// Builds an assertion from credential material in any accepted representation.
    pub fn from_credentials(
        authenticator_data: CredentialInput,
        client_data_json: CredentialInput,
        signature: CredentialInput,
    ) -> Result<Self, SignatureError> {
        Ok(Self {
            authenticator_data: normalize_credential(authenticator_data)?,
            client_data_json: normalize_credential(client_data_json)?,
            signature: normalize_credential(signature)?,
        })
    }
}

/// Encodes a passkey assertion in the compact WebAuthn layout, optionally
/// followed by a 65-byte owner signature.
pub fn encode_webauthn(
    assertion: &WebAuthnAssertion,
    owner_signature: Option<&[u8]>,
) -> Result<Bytes, SignatureError> {
    let (r, s) = decode_der_signature(&assertion.signature)?;
    encode_webauthn_parts(
        &assertion.authenticator_data,
        &assertion.client_data_json,
        r,
        s,
        owner_signature,
    )
}

fn encode_webauthn_parts(
    authenticator_data: &[u8],
    client_data_json: &[u8],
    r: B256,
    s: B256,
    owner_signature: Option<&[u8]>,
) -> Result<Bytes, SignatureError> {
    let challenge_offset =
        find(client_data_json, CHALLENGE_KEY).ok_or(SignatureError::ChallengeNotFound)?;
    let type_offset = find(client_data_json, TYPE_KEY).ok_or(SignatureError::TypeNotFound)?;

    let auth_len = to_u16("authenticatorData length", authenticator_data.len())?;
    let challenge_offset = to_u16("challenge offset", challenge_offset)?;
    let type_offset = to_u16("type offset", type_offset)?;

    if let Some(owner) = owner_signature {
        check_owner_signature(owner)?;
    }

    let mut out = Vec::with_capacity(
        2 + authenticator_data.len()
            + client_data_json.len()
            + 4
            + 64
            + owner_signature.map_or(0, <[u8]>::len),
    );
    out.extend_from_slice(&auth_len.to_be_bytes());
    out.extend_from_slice(authenticator_data);
    out.extend_from_slice(client_data_json);
    out.extend_from_slice(&challenge_offset.to_be_bytes());
    out.extend_from_slice(&type_offset.to_be_bytes());
    out.extend_from_slice(r.as_slice());
    out.extend_from_slice(s.as_slice());
    if let Some(owner) = owner_signature {
        out.extend_from_slice(owner);
    }
    Ok(Bytes::from(out))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn to_u16(field: &'static str, value: usize) -> Result<u16, SignatureError> {
    u16::try_from(value).map_err(|_| SignatureError::FieldTooLarge { field, value })
}

fn check_owner_signature(signature: &[u8]) -> Result<(), SignatureError> {
    if signature.len() != OWNER_SIGNATURE_LEN {
        return Err(SignatureError::InvalidOwnerSignatureLength(signature.len()));
    }
    Ok(())
}

/// What a signing collaborator produced for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningMaterial {
    /// Raw 65-byte owner signature.
    Owner(Bytes),
    /// Passkey assertion alone.
    Passkey(WebAuthnAssertion),
    /// Passkey assertion plus owner signature.
    PasskeyAndOwner {
        /// The passkey assertion.
        assertion: WebAuthnAssertion,
        /// Raw 65-byte owner signature.
        owner_signature: Bytes,
    },
}

impl SigningMaterial {
    /// The layout this material encodes to.
    pub const fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Owner(_) => SignatureScheme::Owner,
            Self::Passkey(_) => SignatureScheme::Passkey,
            Self::PasskeyAndOwner { .. } => SignatureScheme::PasskeyAndOwner,
        }
    }
}

/// Produces the final signature bytes for `material`.
pub fn encode_signature(material: &SigningMaterial) -> Result<Bytes, SignatureError> {
    let encoded = match material {
        SigningMaterial::Owner(signature) => {
            check_owner_signature(signature)?;
            signature.clone()
        }
        SigningMaterial::Passkey(assertion) => encode_webauthn(assertion, None)?,
        SigningMaterial::PasskeyAndOwner { assertion, owner_signature } => {
            encode_webauthn(assertion, Some(owner_signature))?
        }
    };
    debug!(scheme = ?material.scheme(), len = encoded.len(), "encoded signature");
    Ok(encoded)
}

/// Signature layout, known before signing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Owner key only.
    #[default]
    Owner,
    /// Passkey only.
    Passkey,
    /// Passkey and owner key.
    PasskeyAndOwner,
}

impl SignatureScheme {
    /// Placeholder of the right size and shape for gas estimation.
    pub fn dummy_signature(self) -> Bytes {
        let mut owner = [0xffu8; OWNER_SIGNATURE_LEN];
        owner[64] = 0x1c;

        let passkey = |owner: Option<&[u8]>| {
            let mut authenticator_data = [0u8; 37];
            authenticator_data[..32].fill(0x49);
            authenticator_data[32] = 0x05;
            let client_data_json = format!(
                r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://keyway.invalid","crossOrigin":false}}"#,
                URL_SAFE_NO_PAD.encode([0xffu8; 32])
            );
            let r = B256::repeat_byte(0xff);
            let s = B256::from(P256_HALF_N.to_be_bytes::<32>());
            encode_webauthn_parts(&authenticator_data, client_data_json.as_bytes(), r, s, owner)
                .unwrap_or_default()
        };

        match self {
            Self::Owner => Bytes::copy_from_slice(&owner),
            Self::Passkey => passkey(None),
            Self::PasskeyAndOwner => passkey(Some(&owner)),
        }
    }
}

impl std::str::FromStr for SignatureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "passkey" => Ok(Self::Passkey),
            "passkey-and-owner" | "2fa" => Ok(Self::PasskeyAndOwner),
            other => Err(format!("unknown signature scheme: {other}")),
        }
    }
}

/// Credential bytes in one of the representations callers hand us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialInput {
    /// Hex string, with or without `0x`.
    Hex(String),
    /// Base64url, padded or not, as WebAuthn APIs return it.
    Base64Url(String),
    /// Already raw bytes.
    Bytes(Vec<u8>),
}

impl From<Vec<u8>> for CredentialInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for CredentialInput {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Converts any accepted credential representation to raw bytes.
pub fn normalize_credential(input: CredentialInput) -> Result<Bytes, SignatureError> {
    match input {
        CredentialInput::Hex(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(&s);
            hex::decode(digits).map(Bytes::from).map_err(|e| SignatureError::InvalidCredential {
                encoding: "hex",
                reason: e.to_string(),
            })
        }
        CredentialInput::Base64Url(s) => URL_SAFE_NO_PAD
            .decode(s.trim_end_matches('='))
            .map(Bytes::from)
            .map_err(|e| SignatureError::InvalidCredential {
                encoding: "base64url",
                reason: e.to_string(),
            }),
        CredentialInput::Bytes(bytes) => Ok(Bytes::from(bytes)),
    }
}

/// A signing collaborator: given the 32-byte challenge, returns signing material.
#[async_trait]
pub trait ChallengeSigner: Send + Sync {
    /// Layout of the material this signer returns.
    fn scheme(&self) -> SignatureScheme;

    /// Signs `challenge`.
    async fn sign_challenge(&self, challenge: B256) -> Result<SigningMaterial, SignatureError>;
}

/// Owner key held in process. Signs the EIP-191 message of the challenge.
#[derive(Debug, Clone)]
pub struct LocalOwnerSigner {
    signer: PrivateKeySigner,
}

impl LocalOwnerSigner {
    /// Wraps an existing key.
    pub const fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Parses a hex private key.
    pub fn from_hex(key: &str) -> Result<Self, SignatureError> {
        key.parse::<PrivateKeySigner>()
            .map(Self::new)
            .map_err(|e| SignatureError::InvalidCredential { encoding: "private key", reason: e.to_string() })
    }

    /// Address of the owner key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Raw 65-byte signature over `challenge`.
    pub async fn sign_raw(&self, challenge: B256) -> Result<Bytes, SignatureError> {
        let signature = self
            .signer
            .sign_message(challenge.as_slice())
            .await
            .map_err(|e| SignatureError::Signer(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

#[async_trait]
impl ChallengeSigner for LocalOwnerSigner {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Owner
    }

    async fn sign_challenge(&self, challenge: B256) -> Result<SigningMaterial, SignatureError> {
        self.sign_raw(challenge).await.map(SigningMaterial::Owner)
    }
}

/// Combines a passkey signer and an owner key into the two-factor layout.
#[derive(Debug, Clone)]
pub struct DualFactorSigner<P> {
    passkey: P,
    owner: LocalOwnerSigner,
}

impl<P> DualFactorSigner<P> {
    /// Pairs `passkey` with `owner`.
    pub const fn new(passkey: P, owner: LocalOwnerSigner) -> Self {
        Self { passkey, owner }
    }
}

#[async_trait]
impl<P: ChallengeSigner> ChallengeSigner for DualFactorSigner<P> {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::PasskeyAndOwner
    }

    async fn sign_challenge(&self, challenge: B256) -> Result<SigningMaterial, SignatureError> {
        let assertion = match self.passkey.sign_challenge(challenge).await? {
            SigningMaterial::Passkey(assertion) => assertion,
            other => {
                return Err(SignatureError::Signer(format!(
                    "passkey signer returned {:?} material",
                    other.scheme()
                )));
            }
        };
        let owner_signature = self.owner.sign_raw(challenge).await?;
        Ok(SigningMaterial::PasskeyAndOwner { assertion, owner_signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestPasskey, der_encode_signature};
    use alloy_primitives::{b256, keccak256};

    const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn high_s() -> U256 {
        P256_N - U256::from(0x1234_5678u64)
    }

    #[test]
    fn test_curve_constants_are_consistent() {
        assert_eq!(P256_HALF_N, P256_N >> 1);
    }

    #[test]
    fn test_decodes_fixed_width_der() {
        let r = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        let s = b256!("0x2222222222222222222222222222222222222222222222222222222222222222");
        let der = der_encode_signature(r.as_slice(), s.as_slice());
        assert_eq!(&der[..4], &[0x30, 0x44, 0x02, 0x20]);
        assert_eq!(decode_der_signature(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_high_s_is_replaced_by_its_complement() {
        let r = B256::repeat_byte(0x11);
        let s = high_s();
        let der = der_encode_signature(r.as_slice(), &s.to_be_bytes::<32>());
        // 0xff.. high bit forces a sign-padding zero
        assert_eq!(der[37], 0x21);

        let (_, decoded_s) = decode_der_signature(&der).unwrap();
        assert_eq!(U256::from_be_bytes(decoded_s.0), P256_N - s);
        assert_eq!(U256::from_be_bytes(decoded_s.0), U256::from(0x1234_5678u64));
    }

    #[test]
    fn test_unpadded_high_bit_s_is_normalized() {
        let r = B256::repeat_byte(0x11);
        let s = high_s();
        let mut der = vec![0x30, 0x44, 0x02, 0x20];
        der.extend_from_slice(r.as_slice());
        der.extend_from_slice(&[0x02, 0x20]);
        der.extend_from_slice(&s.to_be_bytes::<32>());

        let (decoded_r, decoded_s) = decode_der_signature(&der).unwrap();
        assert_eq!(decoded_r, r);
        assert_eq!(U256::from_be_bytes(decoded_s.0), P256_N - s);
    }

    #[test]
    fn test_scalars_outside_the_group_are_rejected() {
        let r = B256::repeat_byte(0x11);
        for s in [U256::MAX, P256_N, U256::ZERO] {
            let der = der_encode_signature(r.as_slice(), &s.to_be_bytes::<32>());
            assert!(
                matches!(decode_der_signature(&der), Err(SignatureError::Malformed(_))),
                "s = {s:#x} should be rejected"
            );
        }

        let s = U256::from(7u8).to_be_bytes::<32>();
        let der = der_encode_signature(&P256_N.to_be_bytes::<32>(), &s);
        assert!(matches!(decode_der_signature(&der), Err(SignatureError::Malformed(_))));

        let der = der_encode_signature(r.as_slice(), &(P256_N - U256::from(1u8)).to_be_bytes::<32>());
        let (_, decoded_s) = decode_der_signature(&der).unwrap();
        assert_eq!(U256::from_be_bytes(decoded_s.0), U256::from(1u8));
    }

    #[test]
    fn test_both_forms_of_a_signature_decode_identically() {
        let r = B256::repeat_byte(0x42);
        let low = U256::from(0xabcdefu64);
        let high = P256_N - low;
        let a = decode_der_signature(&der_encode_signature(r.as_slice(), &low.to_be_bytes::<32>()));
        let b = decode_der_signature(&der_encode_signature(r.as_slice(), &high.to_be_bytes::<32>()));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn test_half_order_is_left_alone() {
        assert_eq!(normalize_s(P256_HALF_N), P256_HALF_N);
        assert_eq!(normalize_s(P256_HALF_N + U256::from(1u8)), P256_HALF_N);
    }

    #[test]
    fn test_short_integers_are_left_padded() {
        let der = [0x30, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07];
        let (r, s) = decode_der_signature(&der).unwrap();
        assert_eq!(U256::from_be_bytes(r.0), U256::from(5u8));
        assert_eq!(U256::from_be_bytes(s.0), U256::from(7u8));
    }

    #[test]
    fn test_malformed_der_is_rejected() {
        let cases: &[&[u8]] = &[
            &[],
            &[0x31, 0x06, 0x02, 0x01, 0x05, 0x02, 0x01, 0x07],
            &[0x30, 0x06, 0x03, 0x01, 0x05, 0x02, 0x01, 0x07],
            &[0x30, 0x06, 0x02, 0x01, 0x05, 0x04, 0x01, 0x07],
            &[0x30, 0x06, 0x02, 0x05, 0x05],
            &[0x30, 0x04, 0x02, 0x00, 0x02, 0x00],
        ];
        for der in cases {
            assert!(
                matches!(decode_der_signature(der), Err(SignatureError::Malformed(_))),
                "{der:02x?} should be rejected"
            );
        }

        let mut oversized = vec![0x30, 0x46, 0x02, 0x22, 0x00, 0x01];
        oversized.extend_from_slice(&[0x11; 32]);
        oversized.extend_from_slice(&[0x02, 0x01, 0x01]);
        assert!(matches!(decode_der_signature(&oversized), Err(SignatureError::Malformed(_))));
    }

    #[test]
    fn test_real_p256_signature_verifies_after_normalization() {
        use p256::ecdsa::{Signature, signature::hazmat::PrehashVerifier};

        let passkey = TestPasskey::new([7u8; 32]);
        let digest = keccak256(b"keyway");
        for _ in 0..4 {
            let der = passkey.sign_der(digest);
            let (r, s) = decode_der_signature(&der).unwrap();
            assert!(U256::from_be_bytes(s.0) <= P256_HALF_N);

            let sig = Signature::from_scalars(r.0, s.0).unwrap();
            passkey.verifying_key().verify_prehash(digest.as_slice(), &sig).unwrap();
        }
    }

    #[test]
    fn test_owner_only_signature_is_passed_through_verbatim() {
        let raw = Bytes::from(vec![0xab; 65]);
        let encoded = encode_signature(&SigningMaterial::Owner(raw.clone())).unwrap();
        assert_eq!(encoded, raw);
        assert_eq!(encoded.len(), 65);

        assert_eq!(
            encode_signature(&SigningMaterial::Owner(Bytes::from(vec![0xab; 64]))),
            Err(SignatureError::InvalidOwnerSignatureLength(64))
        );
    }

    #[test]
    fn test_compact_webauthn_layout() {
        let passkey = TestPasskey::new([3u8; 32]);
        let challenge = keccak256(b"challenge");
        let assertion = passkey.assert(challenge);
        let (r, s) = decode_der_signature(&assertion.signature).unwrap();

        let encoded = encode_webauthn(&assertion, None).unwrap();
        let auth = &assertion.authenticator_data;
        let client = &assertion.client_data_json;

        assert_eq!(u16::from_be_bytes([encoded[0], encoded[1]]) as usize, auth.len());
        assert_eq!(&encoded[2..2 + auth.len()], &auth[..]);
        let client_end = 2 + auth.len() + client.len();
        assert_eq!(&encoded[2 + auth.len()..client_end], &client[..]);

        let challenge_offset = u16::from_be_bytes([encoded[client_end], encoded[client_end + 1]]);
        let type_offset = u16::from_be_bytes([encoded[client_end + 2], encoded[client_end + 3]]);
        assert!(client[challenge_offset as usize..].starts_with(br#""challenge":""#));
        assert!(client[type_offset as usize..].starts_with(br#""type":""#));
        assert_eq!(type_offset, 1);

        assert_eq!(&encoded[client_end + 4..client_end + 36], r.as_slice());
        assert_eq!(&encoded[client_end + 36..client_end + 68], s.as_slice());
        assert_eq!(encoded.len(), client_end + 68);
    }

    #[test]
    fn test_dual_factor_appends_owner_signature() {
        let assertion = TestPasskey::new([3u8; 32]).assert(B256::ZERO);
        let owner = Bytes::from(vec![0xcd; 65]);
        let single = encode_webauthn(&assertion, None).unwrap();
        let dual = encode_signature(&SigningMaterial::PasskeyAndOwner {
            assertion,
            owner_signature: owner.clone(),
        })
        .unwrap();
        assert_eq!(&dual[..single.len()], &single[..]);
        assert_eq!(&dual[single.len()..], &owner[..]);
    }

    #[test]
    fn test_missing_client_data_members_are_errors() {
        let mut assertion = TestPasskey::new([3u8; 32]).assert(B256::ZERO);
        assertion.client_data_json = Bytes::from_static(br#"{"type":"webauthn.get","origin":"x"}"#);
        assert_eq!(encode_webauthn(&assertion, None), Err(SignatureError::ChallengeNotFound));

        assertion.client_data_json = Bytes::from_static(br#"{"challenge":"abc","origin":"x"}"#);
        assert_eq!(encode_webauthn(&assertion, None), Err(SignatureError::TypeNotFound));
    }

    #[test]
    fn test_oversized_authenticator_data_is_rejected() {
        let mut assertion = TestPasskey::new([3u8; 32]).assert(B256::ZERO);
        assertion.authenticator_data = Bytes::from(vec![0u8; 70_000]);
        assert!(matches!(
            encode_webauthn(&assertion, None),
            Err(SignatureError::FieldTooLarge { value: 70_000, .. })
        ));
    }

    #[test]
    fn test_dummy_signatures_have_the_layout_of_real_ones() {
        assert_eq!(SignatureScheme::Owner.dummy_signature().len(), 65);

        let passkey = SignatureScheme::Passkey.dummy_signature();
        assert_eq!(u16::from_be_bytes([passkey[0], passkey[1]]), 37);
        let tail = &passkey[passkey.len() - 68..];
        assert_eq!(u16::from_be_bytes([tail[2], tail[3]]), 1);
        assert_eq!(&tail[36..], &P256_HALF_N.to_be_bytes::<32>());

        let dual = SignatureScheme::PasskeyAndOwner.dummy_signature();
        assert_eq!(&dual[..passkey.len()], &passkey[..]);
        assert_eq!(dual.len(), passkey.len() + 65);
    }

    #[test]
    fn test_credentials_normalize_from_every_representation() {
        let expected = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
        for input in [
            CredentialInput::Hex("0xdeadbeef".into()),
            CredentialInput::Hex("DEADBEEF".into()),
            CredentialInput::Base64Url("3q2-7w".into()),
            CredentialInput::Base64Url("3q2-7w==".into()),
            CredentialInput::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
        ] {
            assert_eq!(normalize_credential(input.clone()).unwrap(), expected, "{input:?}");
        }
        assert!(matches!(
            normalize_credential(CredentialInput::Hex("0xzz".into())),
            Err(SignatureError::InvalidCredential { encoding: "hex", .. })
        ));
        assert!(matches!(
            normalize_credential(CredentialInput::Base64Url("***".into())),
            Err(SignatureError::InvalidCredential { encoding: "base64url", .. })
        ));
    }

    #[tokio::test]
    async fn test_local_owner_signs_eip191_challenge() {
        let owner = LocalOwnerSigner::from_hex(OWNER_KEY).unwrap();
        let challenge = keccak256(b"user operation");
        let material = owner.sign_challenge(challenge).await.unwrap();
        let SigningMaterial::Owner(raw) = material else { panic!("expected owner material") };
        assert_eq!(raw.len(), 65);
        assert!(raw[64] == 27 || raw[64] == 28);

        let signature = alloy_primitives::Signature::try_from(&raw[..]).unwrap();
        let recovered = signature.recover_address_from_msg(challenge.as_slice()).unwrap();
        assert_eq!(recovered, owner.address());
    }

    #[tokio::test]
    async fn test_dual_factor_signer_combines_both_keys() {
        let owner = LocalOwnerSigner::from_hex(OWNER_KEY).unwrap();
        let signer = DualFactorSigner::new(TestPasskey::new([5u8; 32]), owner);
        let material = signer.sign_challenge(B256::repeat_byte(1)).await.unwrap();
        assert_eq!(material.scheme(), SignatureScheme::PasskeyAndOwner);
        let encoded = encode_signature(&material).unwrap();

        let owner_part = &encoded[encoded.len() - 65..];
        let signature = alloy_primitives::Signature::try_from(owner_part).unwrap();
        let recovered = signature.recover_address_from_msg([1u8; 32]).unwrap();
        assert_eq!(recovered, LocalOwnerSigner::from_hex(OWNER_KEY).unwrap().address());
    }
}
