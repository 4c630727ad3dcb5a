//! Signature verification.
//!
//! - [`SignatureVerifier`]: one signature scheme (e.g. `x509`)
//! - [`VerifierRegistry`]: scheme name to verifier lookup
//! - [`VerificationPipeline`]: tries candidates until one verifies

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::VerifyResult;
use crate::types::SignatureEnvelope;

mod algorithm;
mod chain;
mod pipeline;
mod x509;

pub use algorithm::Algorithm;
pub use pipeline::VerificationPipeline;
pub use x509::{X509Verifier, X509_SCHEME};

/// A signature scheme.
///
/// Verification is pure CPU work over immutable state, so implementations
/// are synchronous and shareable across threads.
pub trait SignatureVerifier: Send + Sync {
    /// Scheme name matched against [`SignatureEnvelope::type_tag`].
    fn scheme(&self) -> &str;

    /// Check `envelope` over `content`.
    fn verify(&self, content: &[u8], envelope: &SignatureEnvelope) -> VerifyResult<()>;

    /// Check `envelope` over `content` with time-dependent checks done at
    /// `_time`. Schemes without such checks keep the default.
    fn verify_at(
        &self,
        content: &[u8],
        envelope: &SignatureEnvelope,
        _time: DateTime<Utc>,
    ) -> VerifyResult<()> {
        self.verify(content, envelope)
    }
}

impl<T: SignatureVerifier + ?Sized> SignatureVerifier for Arc<T> {
    fn scheme(&self) -> &str {
        (**self).scheme()
    }

    fn verify(&self, content: &[u8], envelope: &SignatureEnvelope) -> VerifyResult<()> {
        (**self).verify(content, envelope)
    }

    fn verify_at(
        &self,
        content: &[u8],
        envelope: &SignatureEnvelope,
        time: DateTime<Utc>,
    ) -> VerifyResult<()> {
        (**self).verify_at(content, envelope, time)
    }
}

/// Verifiers keyed by scheme name.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<dyn SignatureVerifier>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verifier under its own scheme name, replacing any previous one.
    pub fn register(&mut self, verifier: Arc<dyn SignatureVerifier>) {
        let scheme = verifier.scheme().to_string();
        if self.verifiers.insert(scheme.clone(), verifier).is_some() {
            tracing::debug!(scheme = %scheme, "replaced signature verifier");
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.register(Arc::new(verifier));
        self
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn SignatureVerifier>> {
        self.verifiers.get(scheme)
    }

    /// Registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}

impl std::fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
