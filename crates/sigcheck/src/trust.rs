//! Trust anchors for certificate chain validation.
//!
//! Trust is configured explicitly as one of two states, decided once when a
//! verifier is built:
//! - [`TrustAnchors::System`]: the platform trust store
//! - [`TrustAnchors::Explicit`]: a caller-supplied set of roots
//!
//! An explicit empty set stays empty. It never falls back to the system store.

use std::path::Path;

use x509_parser::pem::Pem;
use x509_parser::prelude::parse_x509_certificate;

use crate::error::{TrustError, TrustResult};

/// Trust anchor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchors {
    /// Use the platform trust store.
    System,

    /// Use exactly these DER-encoded root certificates.
    Explicit(Vec<Vec<u8>>),
}

impl TrustAnchors {
    /// Explicit anchors from DER certificates. Each must parse.
    pub fn from_der<I, B>(certs: I) -> TrustResult<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let certs: Vec<Vec<u8>> = certs.into_iter().map(Into::into).collect();
        for der in &certs {
            check_certificate(der)?;
        }
        Ok(Self::Explicit(certs))
    }

    /// Explicit anchors from a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> TrustResult<Self> {
        Self::from_der(pem_certificates(pem)?)
    }

    /// Explicit anchors from PEM files (e.g., CA certificate files).
    pub fn from_pem_files<P: AsRef<Path>>(paths: &[P]) -> TrustResult<Self> {
        let mut certs = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let bytes = std::fs::read(path).map_err(|e| TrustError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            certs.extend(pem_certificates(&bytes)?);
        }
        Self::from_der(certs)
    }

    /// Materialize the anchor set.
    ///
    /// For [`TrustAnchors::System`] this reads the platform store.
    pub fn load(&self) -> TrustResult<AnchorSet> {
        match self {
            Self::Explicit(certs) => Ok(AnchorSet {
                certs: certs.clone(),
                system: false,
            }),
            Self::System => {
                let result = rustls_native_certs::load_native_certs();
                if result.certs.is_empty() && !result.errors.is_empty() {
                    let message = result
                        .errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(TrustError::System { message });
                }
                for e in &result.errors {
                    tracing::warn!(error = %e, "skipping unreadable system trust store entry");
                }

                // Entries the parser cannot handle are skipped, not fatal.
                let certs: Vec<Vec<u8>> = result
                    .certs
                    .iter()
                    .map(|c| c.as_ref().to_vec())
                    .filter(|der| parse_x509_certificate(der).is_ok())
                    .collect();
                tracing::debug!(count = certs.len(), "loaded system trust anchors");
                Ok(AnchorSet {
                    certs,
                    system: true,
                })
            }
        }
    }
}

impl Default for TrustAnchors {
    fn default() -> Self {
        Self::System
    }
}

/// Immutable, loaded set of anchor certificates.
#[derive(Debug, Clone, Default)]
pub struct AnchorSet {
    certs: Vec<Vec<u8>>,
    system: bool,
}

impl AnchorSet {
    /// DER certificates in the set.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certs
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the set came from the platform store.
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Exact DER membership.
    pub fn contains(&self, der: &[u8]) -> bool {
        self.certs.iter().any(|c| c.as_slice() == der)
    }
}

/// Extract `CERTIFICATE` blocks from a PEM bundle.
pub fn pem_certificates(pem: &[u8]) -> TrustResult<Vec<Vec<u8>>> {
    let mut certs = Vec::new();
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| TrustError::Pem {
            message: e.to_string(),
        })?;
        if block.label == "CERTIFICATE" {
            certs.push(block.contents);
        }
    }
    if certs.is_empty() {
        return Err(TrustError::Pem {
            message: "no CERTIFICATE blocks found".to_string(),
        });
    }
    Ok(certs)
}

fn check_certificate(der: &[u8]) -> TrustResult<()> {
    parse_x509_certificate(der)
        .map(|_| ())
        .map_err(|e| TrustError::Certificate {
            message: e.to_string(),
        })
}
