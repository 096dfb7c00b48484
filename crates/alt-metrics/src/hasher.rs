// hasher.rs - User identifier anonymization.
//
// Raw account identifiers never reach memory-resident records or disk.
// They are replaced by their SHA-256 digest, hex-encoded as 64 lowercase
// characters. The digest is stable across restarts, so repeated events
// from one account stay correlatable without revealing who it is.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Anonymize a raw user identifier.
///
/// Deterministic and infallible: every string, including `""`, maps to
/// exactly one 64-character lowercase hex digest.
pub fn anonymize(raw_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_id.as_bytes());
    // `{:x}` on the digest output produces lowercase hex
    format!("{:x}", hasher.finalize())
}

/// True if `id` already looks like a digest produced by [`anonymize`].
pub fn is_anonymized(id: &str) -> bool {
    id.len() == DIGEST_HEX_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Anonymize `id` unless it is already a digest.
///
/// Used when migrating stored data so existing digests are never
/// hashed a second time.
pub fn anonymize_stored(id: &str) -> String {
    if is_anonymized(id) {
        id.to_string()
    } else {
        anonymize(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymize_is_deterministic() {
        assert_eq!(anonymize("alice@example.social"), anonymize("alice@example.social"));
    }

    #[test]
    fn different_ids_give_different_digests() {
        assert_ne!(anonymize("alice"), anonymize("bob"));
    }

    #[test]
    fn digest_is_64_lowercase_hex() {
        for raw in ["", "a", "plainuser123", "@someone@mastodon.example", "ünïcødé"] {
            let digest = anonymize(raw);
            assert_eq!(digest.len(), DIGEST_HEX_LEN);
            assert!(digest
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
        }
    }

    #[test]
    fn anonymize_known_value() {
        // SHA-256("") is a fixed, well-known value.
        assert_eq!(
            anonymize(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn is_anonymized_rejects_raw_ids() {
        assert!(!is_anonymized("plainuser123"));
        assert!(!is_anonymized(""));
        // Right length, wrong alphabet.
        assert!(!is_anonymized(&"z".repeat(DIGEST_HEX_LEN)));
        assert!(is_anonymized(&anonymize("plainuser123")));
    }

    #[test]
    fn uppercase_hex_is_not_a_digest() {
        let upper = anonymize("dave").to_uppercase();
        assert!(!is_anonymized(&upper));
        // Gets hashed like any other raw id.
        assert_eq!(anonymize_stored(&upper), anonymize(&upper));
    }

    #[test]
    fn anonymize_stored_passes_digests_through() {
        let digest = anonymize("carol");
        assert_eq!(anonymize_stored(&digest), digest);
        assert_eq!(anonymize_stored("carol"), digest);
    }
}
