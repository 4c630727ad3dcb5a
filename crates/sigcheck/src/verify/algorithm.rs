//! Signature algorithms named by envelope `algorithm` identifiers.
//!
//! Identifiers follow JWS naming. ECDSA signatures are the fixed-size
//! `r || s` encoding, not ASN.1 DER.

use std::fmt;

use rsa::pkcs8::DecodePublicKey;
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier;

use crate::error::{VerifyError, VerifyResult};

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Es256,
    Es384,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    EdDsa,
}

impl Algorithm {
    pub const ALL: [Algorithm; 9] = [
        Self::Es256,
        Self::Es384,
        Self::Rs256,
        Self::Rs384,
        Self::Rs512,
        Self::Ps256,
        Self::Ps384,
        Self::Ps512,
        Self::EdDsa,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::EdDsa => "EdDSA",
        }
    }

    /// Verify `signature` over `content` with the key in `spki_der`.
    pub(crate) fn verify(
        self,
        spki_der: &[u8],
        content: &[u8],
        signature: &[u8],
    ) -> VerifyResult<()> {
        match self {
            Self::Es256 => {
                let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                    .map_err(|e| self.bad_key(e))?;
                let sig = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| malformed(self, e))?;
                check(self, &key, content, &sig)
            }
            Self::Es384 => {
                let key = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                    .map_err(|e| self.bad_key(e))?;
                let sig = p384::ecdsa::Signature::from_slice(signature)
                    .map_err(|e| malformed(self, e))?;
                check(self, &key, content, &sig)
            }
            Self::Rs256 => {
                let key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pkcs1v15_signature(self, signature)?)
            }
            Self::Rs384 => {
                let key = rsa::pkcs1v15::VerifyingKey::<Sha384>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pkcs1v15_signature(self, signature)?)
            }
            Self::Rs512 => {
                let key = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pkcs1v15_signature(self, signature)?)
            }
            Self::Ps256 => {
                let key = rsa::pss::VerifyingKey::<Sha256>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pss_signature(self, signature)?)
            }
            Self::Ps384 => {
                let key = rsa::pss::VerifyingKey::<Sha384>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pss_signature(self, signature)?)
            }
            Self::Ps512 => {
                let key = rsa::pss::VerifyingKey::<Sha512>::new(rsa_key(self, spki_der)?);
                check(self, &key, content, &pss_signature(self, signature)?)
            }
            Self::EdDsa => {
                let key = ed25519_dalek::VerifyingKey::from_public_key_der(spki_der)
                    .map_err(|e| self.bad_key(e))?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| malformed(self, e))?;
                check(self, &key, content, &sig)
            }
        }
    }

    fn bad_key(self, e: impl fmt::Display) -> VerifyError {
        VerifyError::InvalidPublicKey {
            algorithm: self.name().to_string(),
            reason: e.to_string(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn rsa_key(algorithm: Algorithm, spki_der: &[u8]) -> VerifyResult<rsa::RsaPublicKey> {
    rsa::RsaPublicKey::from_public_key_der(spki_der).map_err(|e| algorithm.bad_key(e))
}

fn check<S, V: Verifier<S>>(
    algorithm: Algorithm,
    key: &V,
    content: &[u8],
    signature: &S,
) -> VerifyResult<()> {
    key.verify(content, signature).map_err(|_| mismatch(algorithm))
}

fn pkcs1v15_signature(
    algorithm: Algorithm,
    signature: &[u8],
) -> VerifyResult<rsa::pkcs1v15::Signature> {
    rsa::pkcs1v15::Signature::try_from(signature).map_err(|e| malformed(algorithm, e))
}

fn pss_signature(algorithm: Algorithm, signature: &[u8]) -> VerifyResult<rsa::pss::Signature> {
    rsa::pss::Signature::try_from(signature).map_err(|e| malformed(algorithm, e))
}

fn malformed(algorithm: Algorithm, e: impl fmt::Display) -> VerifyError {
    VerifyError::SignatureMismatch {
        reason: format!("malformed {} signature: {}", algorithm, e),
    }
}

fn mismatch(algorithm: Algorithm) -> VerifyError {
    VerifyError::SignatureMismatch {
        reason: format!("{} verification failed", algorithm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePublicKey;
    use signature::Signer;

    #[test]
    fn test_names_round_trip() {
        for alg in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(alg.name()), Some(alg));
        }
        assert_eq!(Algorithm::from_name("es256"), None);
        assert_eq!(Algorithm::from_name("HS256"), None);
    }

    #[test]
    fn test_es256_verify() {
        let sk = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let spki = sk.verifying_key().to_public_key_der().unwrap();
        let sig: p256::ecdsa::Signature = sk.sign(b"payload");

        assert!(Algorithm::Es256
            .verify(spki.as_bytes(), b"payload", &sig.to_bytes())
            .is_ok());

        let err = Algorithm::Es256
            .verify(spki.as_bytes(), b"tampered", &sig.to_bytes())
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_ecdsa_der_signature_is_rejected() {
        let sk = p256::ecdsa::SigningKey::from_slice(&[9u8; 32]).unwrap();
        let spki = sk.verifying_key().to_public_key_der().unwrap();
        let sig: p256::ecdsa::Signature = sk.sign(b"payload");

        let err = Algorithm::Es256
            .verify(spki.as_bytes(), b"payload", sig.to_der().as_bytes())
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_eddsa_verify() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let spki = sk.verifying_key().to_public_key_der().unwrap();
        let sig = sk.sign(b"payload");

        assert!(Algorithm::EdDsa
            .verify(spki.as_bytes(), b"payload", &sig.to_bytes())
            .is_ok());
    }

    #[test]
    fn test_key_type_mismatch() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let spki = sk.verifying_key().to_public_key_der().unwrap();

        let err = Algorithm::Es256
            .verify(spki.as_bytes(), b"payload", &[0u8; 64])
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidPublicKey { .. }));

        let err = Algorithm::Rs256
            .verify(spki.as_bytes(), b"payload", &[0u8; 256])
            .unwrap_err();
        assert!(matches!(err, VerifyError::InvalidPublicKey { .. }));
    }
}
