//! Content fingerprinting for WorkloadGroups.
//!
//! Two distinct hashes are in play: the group *identity* (`group_id`, an MD5
//! of the group's directory name) and the group *content fingerprint*
//! (`content_fingerprint`, a stable-sorted MD5 over per-file SHA-256 digests).
//! Only the former is part of the wire format; the latter exists so callers
//! can detect when a group's content changed without re-walking bytes.

use md5::{Digest as Md5Digest, Md5};
use sha2::{Digest as Sha256Digest, Sha256};

/// MD5 hex digest of a WorkloadGroup directory name, used as its stable `id`.
pub fn group_id(directory: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(directory.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic content fingerprint over a collection of `(filepath, content)`
/// pairs: MD5 over the `filepath`-sorted lines `sha256(content) || "\0" || filepath`.
///
/// Stable across runs and independent of the order pairs are supplied in.
pub fn content_fingerprint<'a, I>(files: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut entries: Vec<(&str, &[u8])> = files.into_iter().collect();
    entries.sort_by_key(|(path, _)| *path);

    let mut hasher = Md5::new();
    for (path, content) in entries {
        let mut sha = Sha256::new();
        sha.update(content);
        let digest = hex::encode(sha.finalize());
        hasher.update(digest.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_is_stable() {
        assert_eq!(group_id("."), group_id("."));
        assert_ne!(group_id("."), group_id("frontend"));
    }

    #[test]
    fn group_id_matches_known_md5() {
        // md5(".") — fixed reference value, independent of this crate's logic.
        assert_eq!(group_id("."), "5058f1af8388633f609cadb75a75dc9d");
    }

    #[test]
    fn content_fingerprint_independent_of_order() {
        let a = [("b.yaml", b"two".as_slice()), ("a.yaml", b"one".as_slice())];
        let b = [("a.yaml", b"one".as_slice()), ("b.yaml", b"two".as_slice())];
        assert_eq!(content_fingerprint(a), content_fingerprint(b));
    }

    #[test]
    fn content_fingerprint_changes_with_content() {
        let a = [("a.yaml", b"one".as_slice())];
        let b = [("a.yaml", b"two".as_slice())];
        assert_ne!(content_fingerprint(a), content_fingerprint(b));
    }
}
