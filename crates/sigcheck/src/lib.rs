//! Registry authentication and signature verification for content-addressed
//! artifacts.
//!
//! This crate provides:
//!
//! - An HTTP transport layer that answers registry bearer-token challenges
//! - X.509 chain plus signature verification of detached signature envelopes
//! - A first-match pipeline over ordered signature candidates
//! - A small registry client for manifest resolution
//! - A local `x509` signer for producing envelopes
//!
//! # Quick Start
//!
//! ```no_run
//! use sigcheck::{
//!     ArtifactRef, RegistryClient, SignatureCandidate, TrustAnchors, VerificationPipeline,
//!     VerifierRegistry, X509Verifier,
//! };
//!
//! # async fn example(candidates: Vec<SignatureCandidate>) -> anyhow::Result<()> {
//! let client = RegistryClient::from_env()?;
//! let subject = client
//!     .resolve(&ArtifactRef::parse("registry.example/app:v1")?)
//!     .await?;
//!
//! let anchors = TrustAnchors::from_pem_files(&["ca.pem"])?;
//! let registry = VerifierRegistry::new().with(X509Verifier::new(&anchors)?);
//! let matched = VerificationPipeline::new(registry).verify(&subject, &candidates)?;
//! println!("verified {}", matched);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SIGCHECK_REGISTRY_USERNAME` | Basic-auth username for registry and token endpoint |
//! | `SIGCHECK_REGISTRY_PASSWORD` | Basic-auth password |
//! | `SIGCHECK_PLAIN_HTTP` | Use `http://` for registry URLs |
//! | `SIGCHECK_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 30) |

pub mod auth;
pub mod client;
mod digest;
pub mod error;
pub mod reference;
pub mod sign;
pub mod transport;
pub mod trust;
pub mod types;
pub mod verify;

// Re-export main types
pub use auth::{parse_challenge, Challenge, Credentials};
pub use client::{RegistryClient, REGISTRY_USER_AGENT};
pub use error::{
    ClientError, ClientResult, PipelineError, PipelineResult, Rejection, SignError, TransportError,
    TransportResult, TrustError, TrustResult, VerifyError, VerifyResult,
};
pub use reference::{ArtifactRef, Reference};
pub use sign::X509Signer;
pub use transport::{send_cancellable, AuthTransport, BearerAuthLayer, Transport, TransportLayer};
pub use trust::{AnchorSet, TrustAnchors};
pub use types::{
    ClientConfig, Descriptor, SignatureCandidate, SignatureEnvelope, SignedContent, SignedManifest,
};
pub use verify::{
    Algorithm, SignatureVerifier, VerificationPipeline, VerifierRegistry, X509Verifier,
    X509_SCHEME,
};

pub use tokio_util::sync::CancellationToken;
