use sha2::{Digest, Sha256, Sha512};

/// `sha256:<hex>` digest of in-memory content.
pub(crate) fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Digest of `bytes` under the algorithm named by `algorithm` (`sha256` or
/// `sha512`). Returns `None` for any other algorithm.
pub(crate) fn digest_with(algorithm: &str, bytes: &[u8]) -> Option<String> {
    match algorithm {
        "sha256" => Some(sha256_digest(bytes)),
        "sha512" => Some(format!("sha512:{}", hex::encode(Sha512::digest(bytes)))),
        _ => None,
    }
}

/// Algorithm prefix of a `<algorithm>:<hex>` digest.
pub(crate) fn algorithm_of(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(algorithm, _)| algorithm)
}

/// Check that `digest` has the `<algorithm>:<hex>` shape registries use.
pub(crate) fn is_valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some(("sha256", hex)) => hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        Some(("sha512", hex)) => hex.len() == 128 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        _ => false,
    }
}
