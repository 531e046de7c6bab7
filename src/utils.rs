use sha2::{Digest, Sha256};

const ROLLOUT_MASK: u32 = 0xFFFFF;
pub const ROLLOUT_SCALE: f64 = 100000.0;

/// Maps `{key}.{value}` to a bucket in `[0, 100000]`.
///
/// The low 20 bits of the first four digest bytes (read little-endian) are
/// scaled onto the bucket range. Must stay bit-exact with the backend's scheme.
pub fn rollout_bucket(key: &str, value: &str) -> u32 {
    let hash = Sha256::digest(format!("{key}.{value}").as_bytes());
    let masked = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]) & ROLLOUT_MASK;
    (masked as f64 / ROLLOUT_MASK as f64 * ROLLOUT_SCALE).floor() as u32
}

#[cfg(test)]
mod utils_tests {
    use crate::utils::rollout_bucket;

    #[test]
    fn bucket_reference_values() {
        assert_eq!(rollout_bucket("new-checkout", "user-1"), 27904);
        assert_eq!(rollout_bucket("new-checkout", "user-2"), 70473);
        assert_eq!(rollout_bucket("new-checkout", "user-3"), 93720);
        assert_eq!(rollout_bucket("new-checkout", "alice"), 42934);
        assert_eq!(rollout_bucket("new-checkout", "bob"), 89393);
        assert_eq!(rollout_bucket("new-checkout", ""), 85266);
    }

    #[test]
    fn bucket_in_range() {
        for i in 0..500 {
            assert!(rollout_bucket("flag", format!("u{i}").as_str()) <= 100000);
        }
    }
}
