//! Asset manifest digests.

use sha2::{Digest, Sha256};

/// Compute a stable digest of an ordered asset set.
///
/// Stored alongside every generation so a changed manifest cannot be
/// installed under an old generation id.
pub fn compute_manifest_digest<S: AsRef<str>>(assets: &[S]) -> String {
    let mut hasher = Sha256::new();
    for asset in assets {
        hasher.update(asset.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_stability() {
        let a = compute_manifest_digest(&["/", "/index.html", "/style.css"]);
        let b = compute_manifest_digest(&["/", "/index.html", "/style.css"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_order_sensitive() {
        let a = compute_manifest_digest(&["/", "/index.html"]);
        let b = compute_manifest_digest(&["/index.html", "/"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_no_concatenation_collision() {
        let a = compute_manifest_digest(&["/a", "/b"]);
        let b = compute_manifest_digest(&["/a/b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_format() {
        let digest = compute_manifest_digest(&["/app.js"]);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
