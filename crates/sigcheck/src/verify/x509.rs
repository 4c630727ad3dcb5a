//! `x509` signature scheme: certificate-chain trust, then signature validity.

use chrono::{DateTime, Utc};
use tracing::debug;
use x509_parser::time::ASN1Time;

use crate::error::{TrustResult, VerifyError, VerifyResult};
use crate::trust::{AnchorSet, TrustAnchors};
use crate::types::SignatureEnvelope;

use super::algorithm::Algorithm;
use super::chain::{parse_anchors, parse_chain, ChainBuilder};
use super::SignatureVerifier;

/// Scheme name carried in the envelope type tag.
pub const X509_SCHEME: &str = "x509";

/// Verifies `x509` envelopes against a fixed anchor set.
#[derive(Debug, Clone)]
pub struct X509Verifier {
    anchors: AnchorSet,
    verification_time: Option<DateTime<Utc>>,
}

impl X509Verifier {
    /// Build a verifier, loading the configured anchors once.
    pub fn new(trust: &TrustAnchors) -> TrustResult<Self> {
        Ok(Self::with_anchor_set(trust.load()?))
    }

    /// Build a verifier over an already loaded anchor set.
    pub fn with_anchor_set(anchors: AnchorSet) -> Self {
        Self {
            anchors,
            verification_time: None,
        }
    }

    /// Validate certificates at a fixed time instead of now.
    pub fn with_verification_time(mut self, time: DateTime<Utc>) -> Self {
        self.verification_time = Some(time);
        self
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    fn check(
        &self,
        content: &[u8],
        envelope: &SignatureEnvelope,
        time: ASN1Time,
    ) -> VerifyResult<()> {
        if envelope.type_tag != X509_SCHEME {
            return Err(VerifyError::SchemeMismatch {
                expected: X509_SCHEME.to_string(),
                actual: envelope.type_tag.clone(),
            });
        }
        if envelope.certificate_chain.is_empty() {
            return Err(VerifyError::EmptyChain);
        }

        let certs = parse_chain(&envelope.certificate_chain)?;
        let (leaf, intermediates) = certs.split_first().ok_or(VerifyError::EmptyChain)?;

        let anchors = parse_anchors(self.anchors.certificates());
        let builder = ChainBuilder {
            intermediates,
            anchors: &anchors,
            time,
        };
        builder.verify(leaf)?;
        debug!(
            subject = %leaf.cert.subject(),
            chain_len = certs.len(),
            "certificate chain trusted"
        );

        let algorithm = Algorithm::from_name(&envelope.algorithm).ok_or_else(|| {
            VerifyError::UnsupportedAlgorithm {
                algorithm: envelope.algorithm.clone(),
            }
        })?;
        algorithm.verify(leaf.cert.public_key().raw, content, &envelope.signature)
    }
}

fn asn1_time(time: DateTime<Utc>) -> VerifyResult<ASN1Time> {
    ASN1Time::from_timestamp(time.timestamp()).map_err(|e| VerifyError::ChainValidation {
        reason: format!("invalid verification time: {}", e),
    })
}

impl SignatureVerifier for X509Verifier {
    fn scheme(&self) -> &str {
        X509_SCHEME
    }

    fn verify(&self, content: &[u8], envelope: &SignatureEnvelope) -> VerifyResult<()> {
        let time = match self.verification_time {
            Some(t) => asn1_time(t)?,
            None => ASN1Time::now(),
        };
        self.check(content, envelope, time)
    }

    fn verify_at(
        &self,
        content: &[u8],
        envelope: &SignatureEnvelope,
        time: DateTime<Utc>,
    ) -> VerifyResult<()> {
        self.check(content, envelope, asn1_time(time)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use p256::pkcs8::DecodePrivateKey;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use signature::Signer;

    struct Issued {
        der: Vec<u8>,
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    fn root(name: &str) -> Issued {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Issued {
            der: cert.der().to_vec(),
            cert,
            key,
        }
    }

    fn issue(name: &str, issuer: &Issued, ca: bool) -> Issued {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        if ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
        Issued {
            der: cert.der().to_vec(),
            cert,
            key,
        }
    }

    fn es256_envelope(signer: &Issued, chain: Vec<Vec<u8>>, content: &[u8]) -> SignatureEnvelope {
        let sk = p256::ecdsa::SigningKey::from_pkcs8_der(&signer.key.serialize_der()).unwrap();
        let sig: p256::ecdsa::Signature = sk.sign(content);
        SignatureEnvelope {
            type_tag: X509_SCHEME.to_string(),
            certificate_chain: chain,
            algorithm: "ES256".to_string(),
            signature: sig.to_bytes().to_vec(),
        }
    }

    fn verifier(anchors: Vec<Vec<u8>>) -> X509Verifier {
        X509Verifier::new(&TrustAnchors::from_der(anchors).unwrap()).unwrap()
    }

    #[test]
    fn test_self_signed_anchor_round_trip() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"content");

        verifier(vec![leaf.der.clone()])
            .verify(b"content", &envelope)
            .unwrap();
    }

    #[test]
    fn test_leaf_intermediate_root() {
        let ca = root("root.test");
        let mid = issue("intermediate.test", &ca, true);
        let leaf = issue("leaf.test", &mid, false);
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone(), mid.der.clone()], b"content");

        verifier(vec![ca.der.clone()])
            .verify(b"content", &envelope)
            .unwrap();
    }

    #[test]
    fn test_missing_intermediate_fails_chain() {
        let ca = root("root.test");
        let mid = issue("intermediate.test", &ca, true);
        let leaf = issue("leaf.test", &mid, false);
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"content");

        let err = verifier(vec![ca.der.clone()])
            .verify(b"content", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::ChainValidation { .. }));
    }

    #[test]
    fn test_non_ca_intermediate_is_rejected() {
        let ca = root("root.test");
        let mid = issue("intermediate.test", &ca, false);
        let leaf = issue("leaf.test", &mid, false);
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone(), mid.der.clone()], b"content");

        let err = verifier(vec![ca.der.clone()])
            .verify(b"content", &envelope)
            .unwrap_err();
        match err {
            VerifyError::ChainValidation { reason } => {
                assert!(reason.contains("not authorized"), "{reason}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_untrusted_leaf_with_valid_signature() {
        let leaf = root("leaf.test");
        let other = root("other.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"content");

        let err = verifier(vec![other.der.clone()])
            .verify(b"content", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::ChainValidation { .. }));
    }

    #[test]
    fn test_scheme_mismatch_skips_parsing() {
        let mut envelope = es256_envelope(&root("leaf.test"), vec![vec![0xde, 0xad]], b"x");
        envelope.type_tag = "cosign".to_string();

        let err = verifier(Vec::new()).verify(b"x", &envelope).unwrap_err();
        assert_eq!(
            err,
            VerifyError::SchemeMismatch {
                expected: "x509".to_string(),
                actual: "cosign".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_chain() {
        let envelope = es256_envelope(&root("leaf.test"), Vec::new(), b"x");
        let err = verifier(Vec::new()).verify(b"x", &envelope).unwrap_err();
        assert_eq!(err, VerifyError::EmptyChain);
    }

    #[test]
    fn test_malformed_chain_entry_reports_index() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone(), vec![1, 2, 3]], b"x");
        let err = verifier(vec![leaf.der.clone()])
            .verify(b"x", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::CertificateParse { index: 1, .. }));
    }

    #[test]
    fn test_explicit_empty_anchor_set() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"x");
        let err = verifier(Vec::new()).verify(b"x", &envelope).unwrap_err();
        assert_eq!(err, VerifyError::NoTrustAnchors);
    }

    #[test]
    fn test_signature_over_other_content() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"original");
        let err = verifier(vec![leaf.der.clone()])
            .verify(b"tampered", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let leaf = root("leaf.test");
        let mut envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"x");
        envelope.algorithm = "HS256".to_string();
        let err = verifier(vec![leaf.der.clone()])
            .verify(b"x", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnsupportedAlgorithm { .. }));
    }

    #[test]
    fn test_expired_at_verification_time() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"x");

        // rcgen certificates are valid from 1975 to 4096.
        let before = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap();
        let err = verifier(vec![leaf.der.clone()])
            .with_verification_time(before)
            .verify(b"x", &envelope)
            .unwrap_err();
        assert!(matches!(err, VerifyError::ChainValidation { .. }));
    }

    #[test]
    fn test_verify_at_overrides_configured_time() {
        let leaf = root("leaf.test");
        let envelope = es256_envelope(&leaf, vec![leaf.der.clone()], b"x");
        let before = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap();

        let err = verifier(vec![leaf.der.clone()])
            .verify_at(b"x", &envelope, before)
            .unwrap_err();
        assert!(matches!(err, VerifyError::ChainValidation { .. }));

        verifier(vec![leaf.der.clone()])
            .with_verification_time(before)
            .verify_at(b"x", &envelope, Utc::now())
            .unwrap();
    }
}
