//! Certificate path building from a leaf to a trust anchor.
//!
//! Any extended key usage is accepted. Intermediates must carry
//! `basicConstraints CA=true`; every certificate on the path must be inside
//! its validity window.

use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::parse_x509_certificate;
use x509_parser::time::ASN1Time;

use crate::error::{VerifyError, VerifyResult};

/// Maximum number of issuers walked above the leaf.
pub(crate) const MAX_CHAIN_DEPTH: usize = 16;

/// A parsed certificate with its DER encoding.
pub(crate) struct ParsedCert<'a> {
    pub(crate) der: &'a [u8],
    pub(crate) cert: X509Certificate<'a>,
}

/// Parse every entry of an envelope chain. The index of a bad entry is reported.
pub(crate) fn parse_chain(chain: &[Vec<u8>]) -> VerifyResult<Vec<ParsedCert<'_>>> {
    chain
        .iter()
        .enumerate()
        .map(|(index, der)| {
            parse_der(der).map_err(|reason| VerifyError::CertificateParse { index, reason })
        })
        .collect()
}

/// Parse anchors, skipping entries that do not parse.
pub(crate) fn parse_anchors(anchors: &[Vec<u8>]) -> Vec<ParsedCert<'_>> {
    anchors.iter().filter_map(|der| parse_der(der).ok()).collect()
}

fn parse_der(der: &[u8]) -> Result<ParsedCert<'_>, String> {
    let (rest, cert) = parse_x509_certificate(der).map_err(|e| e.to_string())?;
    if !rest.is_empty() {
        return Err(format!("{} trailing bytes after certificate", rest.len()));
    }
    Ok(ParsedCert { der, cert })
}

/// Path builder over a fixed intermediate pool and anchor set.
pub(crate) struct ChainBuilder<'p, 'a> {
    pub(crate) intermediates: &'p [ParsedCert<'a>],
    pub(crate) anchors: &'p [ParsedCert<'a>],
    pub(crate) time: ASN1Time,
}

impl ChainBuilder<'_, '_> {
    /// Validate `leaf` against the anchors.
    pub(crate) fn verify(&self, leaf: &ParsedCert<'_>) -> VerifyResult<()> {
        if self.anchors.is_empty() {
            return Err(VerifyError::NoTrustAnchors);
        }
        if !leaf.cert.validity().is_valid_at(self.time) {
            return Err(chain_error(format!(
                "certificate {} expired or not yet valid",
                leaf.cert.subject()
            )));
        }
        if self.anchors.iter().any(|a| a.der == leaf.der) {
            return Ok(());
        }

        let mut visited = Vec::new();
        self.extend(&leaf.cert, 0, &mut visited).map_err(chain_error)
    }

    fn extend(
        &self,
        current: &X509Certificate<'_>,
        depth: usize,
        visited: &mut Vec<usize>,
    ) -> Result<(), String> {
        if depth >= MAX_CHAIN_DEPTH {
            return Err("certificate chain too long".to_string());
        }

        let mut last = None;

        for anchor in self.anchors {
            if !issued_by(current, &anchor.cert) {
                continue;
            }
            if !anchor.cert.validity().is_valid_at(self.time) {
                last = Some(format!(
                    "trust anchor {} expired or not yet valid",
                    anchor.cert.subject()
                ));
                continue;
            }
            return Ok(());
        }

        for (i, issuer) in self.intermediates.iter().enumerate() {
            if visited.contains(&i) || !issued_by(current, &issuer.cert) {
                continue;
            }
            if !is_ca(&issuer.cert) {
                last = Some(format!(
                    "{} is not authorized to sign other certificates",
                    issuer.cert.subject()
                ));
                continue;
            }
            if !issuer.cert.validity().is_valid_at(self.time) {
                last = Some(format!(
                    "certificate {} expired or not yet valid",
                    issuer.cert.subject()
                ));
                continue;
            }

            visited.push(i);
            match self.extend(&issuer.cert, depth + 1, visited) {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
            visited.pop();
        }

        Err(last.unwrap_or_else(|| {
            format!(
                "certificate signed by unknown authority {}",
                current.issuer()
            )
        }))
    }
}

fn issued_by(child: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    child.issuer().as_raw() == issuer.subject().as_raw()
        && child.verify_signature(Some(issuer.public_key())).is_ok()
}

fn is_ca(cert: &X509Certificate<'_>) -> bool {
    matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca)
}

fn chain_error(reason: String) -> VerifyError {
    VerifyError::ChainValidation { reason }
}

