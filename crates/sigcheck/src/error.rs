//! Error types for the transport, the verifiers and the pipeline.

/// Errors surfaced by the authenticating transport.
///
/// Every variant here is terminal for the caller. A token endpoint that
/// answers with a non-OK status is *not* an error: the original
/// unauthorized response is handed back instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network-level failure (connect, TLS, body read).
    #[error("network error: {message}")]
    Network { message: String },

    /// Token endpoint answered OK but the body was not a token response.
    #[error("failed to decode token response: {message}")]
    TokenDecode { message: String },

    /// The challenge realm is missing or not a valid URL.
    #[error("invalid token realm {realm:?}: {reason}")]
    InvalidRealm { realm: String, reason: String },

    /// The request body is a stream and cannot be replayed.
    #[error("request to {url} cannot be cloned for authentication")]
    UnclonableRequest { url: String },

    /// A header value could not be built from the configured credentials or token.
    #[error("invalid header value: {message}")]
    InvalidHeader { message: String },

    /// The caller's cancellation signal fired before the send completed.
    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Per-candidate verification failures.
///
/// None of these abort a pipeline run; they only reject the candidate that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("signature type mismatch: expected {expected}, got {actual}")]
    SchemeMismatch { expected: String, actual: String },

    #[error("empty x509 certificate chain")]
    EmptyChain,

    #[error("invalid certificate at chain index {index}: {reason}")]
    CertificateParse { index: usize, reason: String },

    #[error("no trust anchors configured")]
    NoTrustAnchors,

    #[error("certificate chain validation failed: {reason}")]
    ChainValidation { reason: String },

    #[error("unsupported signature algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("leaf public key unusable for {algorithm}: {reason}")]
    InvalidPublicKey { algorithm: String, reason: String },

    #[error("signature mismatch: {reason}")]
    SignatureMismatch { reason: String },

    #[error("no verifier registered for signature type {scheme}")]
    UnknownScheme { scheme: String },

    #[error("invalid signed payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("descriptor mismatch: expected {expected}, got {actual}")]
    DescriptorMismatch { expected: String, actual: String },

    #[error("signature not valid before {not_before}")]
    NotYetValid { not_before: i64 },

    #[error("signature expired at {expires_at}")]
    Expired { expires_at: i64 },
}

/// Result type for a single verification.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// One rejected candidate, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the candidate in the list handed to the pipeline.
    pub index: usize,

    /// Why it was rejected.
    pub error: VerifyError,
}

/// Terminal pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Nothing to check.
    #[error("verification failure: no signatures found")]
    NoSignaturesFound,

    /// Checked and failed. The message comes from the last rejection only.
    #[error("verification failure: {last}")]
    AllCandidatesRejected {
        last: VerifyError,
        rejections: Vec<Rejection>,
    },

    /// Evaluation stopped by the caller's cancellation signal.
    #[error("verification cancelled after {evaluated} candidate(s)")]
    Cancelled { evaluated: usize },
}

impl PipelineError {
    /// Exit code for CLI front ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoSignaturesFound => 1,
            Self::AllCandidatesRejected { .. } => 4,
            Self::Cancelled { .. } => 130,
        }
    }

    /// Every rejection recorded before the run ended.
    pub fn rejections(&self) -> &[Rejection] {
        match self {
            Self::AllCandidatesRejected { rejections, .. } => rejections,
            _ => &[],
        }
    }
}

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from loading trust anchors.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid PEM: {message}")]
    Pem { message: String },

    #[error("invalid trust anchor certificate: {message}")]
    Certificate { message: String },

    #[error("failed to load system trust store: {message}")]
    System { message: String },
}

/// Result type for trust anchor loading.
pub type TrustResult<T> = Result<T, TrustError>;

/// Errors from building a signer.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("unsupported or malformed private key: {message}")]
    Key { message: String },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error(transparent)]
    Certificate(#[from] TrustError),
}

/// Errors from the registry client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("invalid reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ClientError {
    /// Exit code for CLI front ends.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidReference { .. } => 1,
            Self::Status { status: 401, .. } | Self::Status { status: 403, .. } => 2,
            Self::Transport(_) => 5,
            Self::Status { .. } | Self::InvalidResponse { .. } => 6,
        }
    }
}

/// Result type for registry client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rejected_message_uses_last_error() {
        let err = PipelineError::AllCandidatesRejected {
            last: VerifyError::EmptyChain,
            rejections: vec![
                Rejection {
                    index: 0,
                    error: VerifyError::NoTrustAnchors,
                },
                Rejection {
                    index: 1,
                    error: VerifyError::EmptyChain,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "verification failure: empty x509 certificate chain"
        );
        assert_eq!(err.rejections().len(), 2);
    }

    #[test]
    fn test_terminal_conditions_are_distinguishable() {
        let none = PipelineError::NoSignaturesFound;
        let rejected = PipelineError::AllCandidatesRejected {
            last: VerifyError::EmptyChain,
            rejections: Vec::new(),
        };
        let cancelled = PipelineError::Cancelled { evaluated: 0 };

        assert_ne!(none.exit_code(), rejected.exit_code());
        assert_ne!(rejected.exit_code(), cancelled.exit_code());
        assert!(none.to_string().contains("no signatures found"));
    }

    #[test]
    fn test_client_error_exit_codes() {
        let unauthorized = ClientError::Status {
            status: 401,
            url: "https://r.example/v2/".into(),
        };
        assert_eq!(unauthorized.exit_code(), 2);

        let network = ClientError::from(TransportError::Cancelled);
        assert_eq!(network.exit_code(), 5);
    }
}
