//! Local `x509` signer: a PKCS#8 private key plus its certificate chain.
//!
//! Produces envelopes that [`X509Verifier`](crate::verify::X509Verifier)
//! accepts when the chain leads to a configured anchor.

use std::path::Path;

use pkcs8::{DecodePrivateKey, EncodePublicKey};
use signature::Signer;
use x509_parser::pem::Pem;
use x509_parser::prelude::parse_x509_certificate;

use crate::error::{SignError, TrustError};
use crate::trust::pem_certificates;
use crate::types::{SignatureCandidate, SignatureEnvelope, SignedContent};
use crate::verify::{Algorithm, X509_SCHEME};

enum SigningKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SigningKey {
    fn from_pkcs8_der(der: &[u8]) -> Result<Self, SignError> {
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(Self::P384(key));
        }
        ed25519_dalek::SigningKey::from_pkcs8_der(der)
            .map(Self::Ed25519)
            .map_err(|_| SignError::Key {
                message: "expected a PKCS#8 P-256, P-384 or Ed25519 key".to_string(),
            })
    }

    fn algorithm(&self) -> Algorithm {
        match self {
            Self::P256(_) => Algorithm::Es256,
            Self::P384(_) => Algorithm::Es384,
            Self::Ed25519(_) => Algorithm::EdDsa,
        }
    }

    fn public_key_der(&self) -> Result<Vec<u8>, SignError> {
        let doc = match self {
            Self::P256(k) => k.verifying_key().to_public_key_der(),
            Self::P384(k) => k.verifying_key().to_public_key_der(),
            Self::Ed25519(k) => k.verifying_key().to_public_key_der(),
        };
        doc.map(|d| d.as_bytes().to_vec())
            .map_err(|e| SignError::Key {
                message: e.to_string(),
            })
    }

    fn sign(&self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::P256(k) => {
                let sig: p256::ecdsa::Signature = k.sign(content);
                sig.to_bytes().to_vec()
            }
            Self::P384(k) => {
                let sig: p384::ecdsa::Signature = k.sign(content);
                sig.to_bytes().to_vec()
            }
            Self::Ed25519(k) => k.sign(content).to_bytes().to_vec(),
        }
    }
}

/// Signs content with a key whose certificate heads `chain`.
pub struct X509Signer {
    key: SigningKey,
    chain: Vec<Vec<u8>>,
}

impl std::fmt::Debug for X509Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X509Signer")
            .field("algorithm", &self.algorithm())
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl X509Signer {
    /// Build from a PKCS#8 DER key and DER certificates, leaf first.
    ///
    /// The leaf certificate must carry the key's public half.
    pub fn from_pkcs8_der(key: &[u8], chain: Vec<Vec<u8>>) -> Result<Self, SignError> {
        let key = SigningKey::from_pkcs8_der(key)?;

        let leaf = chain.first().ok_or_else(|| {
            SignError::Certificate(TrustError::Certificate {
                message: "certificate chain is empty".to_string(),
            })
        })?;
        let (_, cert) = parse_x509_certificate(leaf).map_err(|e| {
            SignError::Certificate(TrustError::Certificate {
                message: e.to_string(),
            })
        })?;
        if cert.public_key().raw != key.public_key_der()?.as_slice() {
            return Err(SignError::Key {
                message: "private key does not match the leaf certificate".to_string(),
            });
        }

        Ok(Self { key, chain })
    }

    /// Build from a `PRIVATE KEY` PEM block and a PEM certificate bundle.
    pub fn from_pem(key_pem: &[u8], chain_pem: &[u8]) -> Result<Self, SignError> {
        let key_der = Pem::iter_from_buffer(key_pem)
            .filter_map(Result::ok)
            .find(|block| block.label == "PRIVATE KEY")
            .map(|block| block.contents)
            .ok_or_else(|| SignError::Key {
                message: "no PRIVATE KEY block found".to_string(),
            })?;
        Self::from_pkcs8_der(&key_der, pem_certificates(chain_pem)?)
    }

    /// Build from a PEM key file and a PEM certificate chain file.
    pub fn from_files(key_path: &Path, chain_path: &Path) -> Result<Self, SignError> {
        Self::from_pem(&read(key_path)?, &read(chain_path)?)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }

    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Sign raw bytes.
    pub fn sign(&self, content: &[u8]) -> SignatureEnvelope {
        SignatureEnvelope {
            type_tag: X509_SCHEME.to_string(),
            certificate_chain: self.chain.clone(),
            algorithm: self.algorithm().name().to_string(),
            signature: self.key.sign(content),
        }
    }

    /// Encode and sign claims, producing a ready-to-verify candidate.
    pub fn sign_content(&self, content: &SignedContent) -> SignatureCandidate {
        let payload = content.to_payload();
        let envelope = self.sign(&payload);
        tracing::debug!(
            algorithm = %envelope.algorithm,
            payload_len = payload.len(),
            "signed content"
        );
        SignatureCandidate::new(payload, envelope)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, SignError> {
    std::fs::read(path).map_err(|e| SignError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustAnchors;
    use crate::types::Descriptor;
    use crate::verify::{SignatureVerifier, X509Verifier};

    fn self_signed(alg: &'static rcgen::SignatureAlgorithm) -> (rcgen::Certificate, rcgen::KeyPair) {
        let key = rcgen::KeyPair::generate_for(alg).unwrap();
        let params = rcgen::CertificateParams::new(vec!["signer.test".to_string()]).unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert, key)
    }

    fn verifier_for(cert: &rcgen::Certificate) -> X509Verifier {
        X509Verifier::new(&TrustAnchors::from_der(vec![cert.der().to_vec()]).unwrap()).unwrap()
    }

    #[test]
    fn test_sign_and_verify_each_key_type() {
        for (alg, expected) in [
            (&rcgen::PKCS_ECDSA_P256_SHA256, Algorithm::Es256),
            (&rcgen::PKCS_ECDSA_P384_SHA384, Algorithm::Es384),
            (&rcgen::PKCS_ED25519, Algorithm::EdDsa),
        ] {
            let (cert, key) = self_signed(alg);
            let signer =
                X509Signer::from_pkcs8_der(&key.serialize_der(), vec![cert.der().to_vec()])
                    .unwrap();
            assert_eq!(signer.algorithm(), expected);

            let envelope = signer.sign(b"content");
            verifier_for(&cert).verify(b"content", &envelope).unwrap();
        }
    }

    #[test]
    fn test_from_pem_and_sign_content() {
        let (cert, key) = self_signed(&rcgen::PKCS_ECDSA_P256_SHA256);
        let signer =
            X509Signer::from_pem(key.serialize_pem().as_bytes(), cert.pem().as_bytes()).unwrap();

        let subject = Descriptor::from_content("application/vnd.oci.image.manifest.v1+json", b"{}");
        let content = SignedContent::for_subject(subject.clone(), chrono::Utc::now());
        let candidate = signer.sign_content(&content);

        verifier_for(&cert)
            .verify(&candidate.payload, &candidate.envelope)
            .unwrap();
        let decoded = SignedContent::from_payload(&candidate.payload).unwrap();
        assert_eq!(decoded.subject().unwrap(), &subject);
    }

    #[test]
    fn test_from_files() {
        let (cert, key) = self_signed(&rcgen::PKCS_ED25519);
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signer.key");
        let cert_path = dir.path().join("signer.crt");
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        std::fs::write(&cert_path, cert.pem()).unwrap();

        let signer = X509Signer::from_files(&key_path, &cert_path).unwrap();
        assert_eq!(signer.certificate_chain().len(), 1);

        let err = X509Signer::from_files(&dir.path().join("missing"), &cert_path).unwrap_err();
        assert!(matches!(err, SignError::Io { .. }));
    }

    #[test]
    fn test_key_must_match_leaf() {
        let (cert, _) = self_signed(&rcgen::PKCS_ECDSA_P256_SHA256);
        let (_, other_key) = self_signed(&rcgen::PKCS_ECDSA_P256_SHA256);

        let err = X509Signer::from_pkcs8_der(&other_key.serialize_der(), vec![cert.der().to_vec()])
            .unwrap_err();
        assert!(matches!(err, SignError::Key { .. }));
    }

    #[test]
    fn test_empty_chain_and_bad_key() {
        let (_, key) = self_signed(&rcgen::PKCS_ECDSA_P256_SHA256);
        let err = X509Signer::from_pkcs8_der(&key.serialize_der(), Vec::new()).unwrap_err();
        assert!(matches!(err, SignError::Certificate(_)));

        let err = X509Signer::from_pkcs8_der(b"junk", Vec::new()).unwrap_err();
        assert!(matches!(err, SignError::Key { .. }));
    }
}
