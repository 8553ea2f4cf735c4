//! Content fingerprints used to pre-filter duplicate submissions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest of a document's raw bytes.
///
/// Equal fingerprints only make two documents *candidates* for being the
/// same; identity is confirmed by comparing the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pluggable fingerprint function.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, content: &[u8]) -> Fingerprint;
}

/// SHA-256 rendered as uppercase hex.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, content: &[u8]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let digest = hasher.finalize();

        let hex = digest.iter().map(|b| format!("{b:02X}")).collect::<String>();
        Fingerprint(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let fp = Sha256Fingerprinter.fingerprint(b"abc");
        assert_eq!(
            fp.as_str(),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn test_distinct_content_distinct_fingerprint() {
        let a = Sha256Fingerprinter.fingerprint(b"<html>A</html>");
        let b = Sha256Fingerprinter.fingerprint(b"<html>B</html>");
        assert_ne!(a, b);
        assert_eq!(a, Sha256Fingerprinter.fingerprint(b"<html>A</html>"));
    }
}
