//! First-match verification over an ordered list of signature candidates.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult, Rejection, VerifyError, VerifyResult};
use crate::types::{Descriptor, SignatureCandidate, SignedContent};

use super::VerifierRegistry;

/// Tries candidates in caller order and stops at the first one that verifies
/// and asserts exactly the subject descriptor.
#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    registry: VerifierRegistry,
    verification_time: Option<DateTime<Utc>>,
}

impl VerificationPipeline {
    pub fn new(registry: VerifierRegistry) -> Self {
        Self {
            registry,
            verification_time: None,
        }
    }

    /// Check certificate validity and signed-content time claims at a fixed
    /// time instead of now.
    pub fn with_verification_time(mut self, time: DateTime<Utc>) -> Self {
        self.verification_time = Some(time);
        self
    }

    pub fn registry(&self) -> &VerifierRegistry {
        &self.registry
    }

    /// Return the matched descriptor of the first accepted candidate.
    pub fn verify(
        &self,
        subject: &Descriptor,
        candidates: &[SignatureCandidate],
    ) -> PipelineResult<Descriptor> {
        self.run(subject, candidates, None)
    }

    /// Like [`verify`](Self::verify), but stops before the next candidate once
    /// `cancel` fires.
    pub fn verify_with_cancellation(
        &self,
        subject: &Descriptor,
        candidates: &[SignatureCandidate],
        cancel: &CancellationToken,
    ) -> PipelineResult<Descriptor> {
        self.run(subject, candidates, Some(cancel))
    }

    fn run(
        &self,
        subject: &Descriptor,
        candidates: &[SignatureCandidate],
        cancel: Option<&CancellationToken>,
    ) -> PipelineResult<Descriptor> {
        if candidates.is_empty() {
            warn!(subject = %subject.digest, "no signatures to verify");
            return Err(PipelineError::NoSignaturesFound);
        }

        let now = self.verification_time.unwrap_or_else(Utc::now);
        let mut rejections = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(evaluated = index, "signature verification cancelled");
                return Err(PipelineError::Cancelled { evaluated: index });
            }

            match self.evaluate(subject, candidate, now) {
                Ok(matched) => {
                    info!(
                        subject = %subject.digest,
                        index,
                        scheme = %candidate.envelope.type_tag,
                        "signature verified"
                    );
                    return Ok(matched);
                }
                Err(error) => {
                    debug!(index, error = %error, "signature candidate rejected");
                    rejections.push(Rejection { index, error });
                }
            }
        }

        let Some(last) = rejections.last().map(|r| r.error.clone()) else {
            return Err(PipelineError::NoSignaturesFound);
        };
        warn!(
            subject = %subject.digest,
            candidates = rejections.len(),
            error = %last,
            "all signature candidates rejected"
        );
        Err(PipelineError::AllCandidatesRejected { last, rejections })
    }

    fn evaluate(
        &self,
        subject: &Descriptor,
        candidate: &SignatureCandidate,
        now: DateTime<Utc>,
    ) -> VerifyResult<Descriptor> {
        let scheme = candidate.envelope.type_tag.as_str();
        let verifier = self
            .registry
            .get(scheme)
            .ok_or_else(|| VerifyError::UnknownScheme {
                scheme: scheme.to_string(),
            })?;

        match self.verification_time {
            Some(time) => verifier.verify_at(&candidate.payload, &candidate.envelope, time)?,
            None => verifier.verify(&candidate.payload, &candidate.envelope)?,
        }

        let content = SignedContent::from_payload(&candidate.payload)?;
        content.check_time(now)?;

        let asserted = content.subject()?;
        if asserted != subject {
            return Err(VerifyError::DescriptorMismatch {
                expected: subject.to_string(),
                actual: asserted.to_string(),
            });
        }
        Ok(asserted.clone())
    }
}
