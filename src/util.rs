/// djb2 hash, XOR variant: `h = 5381; h = (h * 33) ^ byte`.
///
/// Bucket selection must match existing deployments bit-for-bit, so the
/// arithmetic is fixed at 64 bits with wrapping multiply.
pub fn djb2_hash_xor(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = hash.wrapping_mul(33) ^ u64::from(b);
    }
    hash
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    time::OffsetDateTime::now_utc().unix_timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_djb2_hash_xor() {
        let h1 = djb2_hash_xor(b"foo");
        let h2 = djb2_hash_xor(b"foo");
        let h3 = djb2_hash_xor(b"alice");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(djb2_hash_xor(b""), 5381);
    }
}
