/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Content fingerprint of an image's raw encoded bytes.
///
/// BLAKE3 digest, hex encoded. Two images with identical bytes share a
/// fingerprint regardless of where they were loaded from.
pub fn fingerprint(raw_bytes: &[u8]) -> String {
    blake3::hash(raw_bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bytes_same_fingerprint() {
        let a = fingerprint(b"\x89PNG page one");
        let b = fingerprint(b"\x89PNG page one");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_one_byte_difference_changes_fingerprint() {
        let a = fingerprint(b"\x89PNG page one");
        let b = fingerprint(b"\x89PNG page onf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_is_lowercase_hex() {
        let fp = fingerprint(b"");
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
