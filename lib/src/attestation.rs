// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Attestation and object policy verification
//!
//! Card responses are only trusted once the attestation signature over
//! `TAG_1..TAG_5` verifies and the object attributes match the expected
//! class, origin and policy.

use log::{debug, warn};
use p256::{
    ecdsa::{signature::Verifier, Signature as P256Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
};

use nfc_wallet_apdu::prelude::*;

use crate::{error::Violation, Error};

/// Verify a signature over `message` with the provided public key
///
/// P-256 keys are accepted as SEC1 points or DER SubjectPublicKeyInfo with DER
/// (or fixed 64 byte) signatures over SHA-256, Ed25519 keys as 32 raw bytes.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8], curve: Curve) -> bool {
    match curve {
        Curve::NistP256 => match AttestationKey::parse(public_key) {
            Ok(k) => k.verify(message, signature),
            Err(_) => false,
        },
        Curve::Ed25519 => {
            let (k, s) = match (<[u8; 32]>::try_from(public_key), <[u8; 64]>::try_from(signature)) {
                (Ok(k), Ok(s)) => (k, s),
                _ => return false,
            };

            let k = match ed25519_dalek::VerifyingKey::from_bytes(&k) {
                Ok(k) => k,
                Err(_) => return false,
            };

            k.verify_strict(message, &ed25519_dalek::Signature::from_bytes(&s))
                .is_ok()
        }
    }
}

/// Card attestation key (P-256)
#[derive(Clone, Debug, PartialEq)]
pub struct AttestationKey(VerifyingKey);

impl AttestationKey {
    /// Parse a key from SEC1 or DER SubjectPublicKeyInfo encoding
    pub fn parse(b: &[u8]) -> Result<Self, Violation> {
        if let Ok(k) = VerifyingKey::from_sec1_bytes(b) {
            return Ok(Self(k));
        }

        VerifyingKey::from_public_key_der(b)
            .map(Self)
            .map_err(|_| Violation::AttestationKey)
    }

    /// Verify a DER or fixed-size signature over the provided message
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let s = match P256Signature::from_der(signature) {
            Ok(s) => s,
            Err(_) => match P256Signature::from_slice(signature) {
                Ok(s) => s,
                Err(_) => return false,
            },
        };

        self.0.verify(message, &s).is_ok()
    }
}

impl From<VerifyingKey> for AttestationKey {
    fn from(k: VerifyingKey) -> Self {
        Self(k)
    }
}

/// Verify a payload's attestation signature, returning `TAG_1` on success
pub fn verify_payload<'a>(
    payload: &SecureObjectPayload<'a>,
    key: &AttestationKey,
) -> Result<&'a [u8], Error> {
    let value = payload.require(Tag::Tag1)?;
    let signature = payload.tag6.ok_or(Violation::Attestation)?;

    let message = payload.signed_message_vec();

    match key.verify(&message, signature) {
        true => Ok(value),
        false => {
            warn!("Attestation signature verification failed");
            Err(Violation::Attestation.into())
        }
    }
}

/// Parse and self-verify an attestation key object, the key in `TAG_1`
/// must verify its own attestation signature
pub fn verify_attestation_key(payload: &SecureObjectPayload) -> Result<AttestationKey, Error> {
    let value = payload.require(Tag::Tag1)?;
    let key = AttestationKey::parse(value)?;

    match verify_payload(payload, &key) {
        Ok(_) => Ok(key),
        Err(Error::Trust(_)) => Err(Violation::AttestationKey.into()),
        Err(e) => Err(e),
    }
}

/// Validate the attributes of an address key object
pub fn validate_address(attrs: &SecureObjectAttributes) -> Result<(), Violation> {
    debug!("Validating address attributes: {:?}", attrs);

    if attrs.object_class != OBJECT_CLASS_KEY {
        return Err(Violation::ObjectClass);
    }
    if attrs.origin != ORIGIN_GENERATED {
        return Err(Violation::Origin);
    }
    if attrs.authentication_indicator == AUTH_INDICATOR_AUTH_OBJECT {
        return Err(Violation::AuthIndicator);
    }
    if attrs.policy != ADDRESS_POLICY {
        return Err(Violation::AddressPolicy);
    }

    Ok(())
}

/// Validate an asset object, returning the asset identifier
pub fn validate_asset(
    attrs: &SecureObjectAttributes,
    value: &[u8],
    chain: &Chain,
) -> Result<[u8; ASSET_ID_LEN], Violation> {
    debug!("Validating asset attributes: {:?}", attrs);

    if attrs.policy != ASSET_POLICY {
        return Err(Violation::AssetPolicy);
    }

    match value.split_first() {
        Some((tag, asset)) if *tag == chain.tag() => {
            <[u8; ASSET_ID_LEN]>::try_from(asset).map_err(|_| Violation::ChainTag)
        }
        _ => Err(Violation::ChainTag),
    }
}

#[cfg(test)]
mod test {
    use ed25519_dalek::Signer as _;
    use p256::{ecdsa::SigningKey, pkcs8::EncodePublicKey};
    use rand_core::OsRng;

    use super::*;

    struct Signed {
        key: SigningKey,
        fields: Vec<Vec<u8>>,
        signature: Vec<u8>,
    }

    fn signed_payload() -> Signed {
        let key = SigningKey::random(&mut OsRng);
        let fields = vec![
            vec![0x11; 44],
            vec![0x22; 24],
            vec![0x33; 4],
            vec![0x44; 16],
            vec![0x55; 18],
        ];

        let message: Vec<u8> = fields.iter().flatten().copied().collect();
        let signature: P256Signature = p256::ecdsa::signature::Signer::sign(&key, &message);

        Signed {
            key,
            fields,
            signature: signature.to_der().as_bytes().to_vec(),
        }
    }

    fn payload<'a>(fields: &'a [Vec<u8>], signature: &'a [u8]) -> SecureObjectPayload<'a> {
        SecureObjectPayload {
            tag1: Some(&fields[0]),
            tag2: Some(&fields[1]),
            tag3: Some(&fields[2]),
            tag4: Some(&fields[3]),
            tag5: Some(&fields[4]),
            tag6: Some(signature),
        }
    }

    #[test]
    fn verify_attested_payload() {
        let s = signed_payload();
        let k = AttestationKey::from(*s.key.verifying_key());

        let p = payload(&s.fields, &s.signature);
        assert_eq!(verify_payload(&p, &k).unwrap(), &s.fields[0][..]);
    }

    #[test]
    fn reject_mutated_payload() {
        let s = signed_payload();
        let k = AttestationKey::from(*s.key.verifying_key());

        // Any single byte change in signed fields fails
        for f in 0..s.fields.len() {
            for i in [0, s.fields[f].len() - 1] {
                let mut fields = s.fields.clone();
                fields[f][i] ^= 0x80;

                let p = payload(&fields, &s.signature);
                assert!(
                    matches!(verify_payload(&p, &k), Err(Error::Trust(Violation::Attestation))),
                    "mutation in field {f} byte {i} accepted"
                );
            }
        }

        // As does a change to the signature
        let mut signature = s.signature.clone();
        let n = signature.len() - 1;
        signature[n] ^= 0x01;

        let p = payload(&s.fields, &signature);
        assert!(verify_payload(&p, &k).is_err());
    }

    #[test]
    fn key_encodings() {
        let s = signed_payload();
        let vk = s.key.verifying_key();
        let message: Vec<u8> = s.fields.iter().flatten().copied().collect();

        let sec1 = vk.to_encoded_point(false);
        let spki = vk.to_public_key_der().unwrap();

        for k in [sec1.as_bytes(), spki.as_bytes()] {
            assert!(verify_signature(k, &message, &s.signature, Curve::NistP256));
            assert!(!verify_signature(k, &message[1..], &s.signature, Curve::NistP256));
        }

        assert!(!verify_signature(&[0x04; 12], &message, &s.signature, Curve::NistP256));
    }

    #[test]
    fn ed25519_signatures() {
        let k = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let m = b"hello";
        let s = k.sign(m).to_bytes();

        let pk = k.verifying_key().to_bytes();
        assert!(verify_signature(&pk, m, &s, Curve::Ed25519));
        assert!(!verify_signature(&pk, b"hellp", &s, Curve::Ed25519));
        assert!(!verify_signature(&pk[..31], m, &s, Curve::Ed25519));
    }

    #[test]
    fn self_verify_attestation_key() {
        let key = SigningKey::random(&mut OsRng);
        let der = key.verifying_key().to_public_key_der().unwrap();

        let fields = vec![
            der.as_bytes().to_vec(),
            vec![0x22; 24],
            vec![],
            vec![0x44; 16],
            vec![0x55; 18],
        ];
        let message: Vec<u8> = fields.iter().flatten().copied().collect();

        let good: P256Signature = p256::ecdsa::signature::Signer::sign(&key, &message);
        let good = good.to_der();
        let p = payload(&fields, good.as_bytes());
        assert!(verify_attestation_key(&p).is_ok());

        let other = SigningKey::random(&mut OsRng);
        let bad: P256Signature = p256::ecdsa::signature::Signer::sign(&other, &message);
        let bad = bad.to_der();
        let p = payload(&fields, bad.as_bytes());
        assert!(matches!(
            verify_attestation_key(&p),
            Err(Error::Trust(Violation::AttestationKey))
        ));
    }

    fn attrs(class: u8, indicator: u8, policy: &[u8], origin: u8) -> SecureObjectAttributes<'_> {
        SecureObjectAttributes {
            object_id: SOLANA.id,
            object_class: class,
            authentication_indicator: indicator,
            auth_counter: 0,
            auth_id: [0; 4],
            max_auth_attempts: 0,
            policy,
            origin,
        }
    }

    #[test]
    fn address_attributes() {
        let ok = attrs(OBJECT_CLASS_KEY, AUTH_INDICATOR_NOT_SET, &ADDRESS_POLICY, ORIGIN_GENERATED);
        assert_eq!(validate_address(&ok), Ok(()));

        let tests = [
            (attrs(OBJECT_CLASS_BINARY, 0x01, &ADDRESS_POLICY, 0x02), Violation::ObjectClass),
            (attrs(OBJECT_CLASS_KEY, 0x01, &ADDRESS_POLICY, 0x01), Violation::Origin),
            (attrs(OBJECT_CLASS_KEY, 0x02, &ADDRESS_POLICY, 0x02), Violation::AuthIndicator),
            (attrs(OBJECT_CLASS_KEY, 0x01, &ASSET_POLICY, 0x02), Violation::AddressPolicy),
            (attrs(OBJECT_CLASS_KEY, 0x01, &ADDRESS_POLICY[..8], 0x02), Violation::AddressPolicy),
        ];

        for (a, v) in tests {
            assert_eq!(validate_address(&a), Err(v));
        }
    }

    #[test]
    fn asset_attributes() {
        let a = attrs(OBJECT_CLASS_BINARY, 0x01, &ASSET_POLICY, 0x01);

        let mut value = [0u8; 33];
        value[0] = SOLANA.tag();
        value[1..].copy_from_slice(&SOLANA.native_asset);
        assert_eq!(validate_asset(&a, &value, &SOLANA), Ok(SOLANA.native_asset));

        value[0] = 0x02;
        assert_eq!(validate_asset(&a, &value, &SOLANA), Err(Violation::ChainTag));
        assert_eq!(validate_asset(&a, &[], &SOLANA), Err(Violation::ChainTag));

        let b = attrs(OBJECT_CLASS_BINARY, 0x01, &ADDRESS_POLICY, 0x01);
        assert_eq!(validate_asset(&b, &value, &SOLANA), Err(Violation::AssetPolicy));
    }
}
