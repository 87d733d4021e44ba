//! Canonical statistics serialization and fingerprint hashing.
//!
//! The fingerprint is SHA-256 over a fixed byte layout of the statistics
//! fields, not over any language-specific debug or serde representation.
//! Two implementations in different languages produce identical
//! fingerprints for identical logical state, which is what the host
//! certification protocol and client-side verification depend on.
//!
//! # Byte Layout (48 bytes total)
//!
//! | Offset | Field | Size | Encoding |
//! |--------|-------|------|----------|
//! | 0 | `total_subnets` | 8 | big-endian u64 |
//! | 8 | `total_nodes` | 8 | big-endian u64 |
//! | 16 | `gen1_nodes` | 8 | big-endian u64 |
//! | 24 | `gen2_nodes` | 8 | big-endian u64 |
//! | 32 | `unknown_nodes` | 8 | big-endian u64 |
//! | 40 | `last_updated_ns` | 8 | big-endian u64 |
//!
//! Changing the field order breaks verification against previously
//! issued certificates. All integers are encoded big-endian.

use sha2::{Digest, Sha256};

use crate::stats::NetworkStats;

/// Size of a fingerprint in bytes.
pub const FINGERPRINT_SIZE: usize = 32;

/// A fingerprint over canonical statistics, the unit of certification.
pub type Fingerprint = [u8; FINGERPRINT_SIZE];

/// Size of the canonical statistics layout in bytes.
pub const STATS_LAYOUT_SIZE: usize = 48;

/// Serializes statistics into the canonical byte layout.
#[must_use]
pub fn canonical_stats_bytes(stats: &NetworkStats) -> [u8; STATS_LAYOUT_SIZE] {
    let mut buf = [0u8; STATS_LAYOUT_SIZE];
    buf[0..8].copy_from_slice(&stats.total_subnets.to_be_bytes());
    buf[8..16].copy_from_slice(&stats.total_nodes.to_be_bytes());
    buf[16..24].copy_from_slice(&stats.gen1_nodes.to_be_bytes());
    buf[24..32].copy_from_slice(&stats.gen2_nodes.to_be_bytes());
    buf[32..40].copy_from_slice(&stats.unknown_nodes.to_be_bytes());
    buf[40..48].copy_from_slice(&stats.last_updated_ns.to_be_bytes());
    buf
}

/// Computes the fingerprint of the given statistics.
///
/// Pure function over in-memory data; no failure mode.
#[must_use]
pub fn fingerprint(stats: &NetworkStats) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_stats_bytes(stats));
    let digest = hasher.finalize();
    let mut out = [0u8; FINGERPRINT_SIZE];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod unit_tests {
    use proptest::prelude::*;

    use super::*;

    fn stats(values: [u64; 6]) -> NetworkStats {
        NetworkStats {
            total_subnets: values[0],
            total_nodes: values[1],
            gen1_nodes: values[2],
            gen2_nodes: values[3],
            unknown_nodes: values[4],
            last_updated_ns: values[5],
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let s = stats([3, 40, 22, 17, 1, 1_700_000_000_000_000_000]);
        let first = fingerprint(&s);
        for _ in 0..100 {
            assert_eq!(fingerprint(&s), first);
        }
    }

    #[test]
    fn test_fingerprint_matches_manual_layout() {
        let s = stats([1, 2, 3, 4, 5, 6]);

        let mut manual = Vec::with_capacity(STATS_LAYOUT_SIZE);
        for value in [1u64, 2, 3, 4, 5, 6] {
            manual.extend_from_slice(&value.to_be_bytes());
        }
        assert_eq!(manual.len(), STATS_LAYOUT_SIZE);

        let mut hasher = sha2::Sha256::new();
        hasher.update(&manual);
        let digest = hasher.finalize();

        assert_eq!(fingerprint(&s)[..], digest[..]);
    }

    #[test]
    fn test_big_endian_encoding() {
        // Values differing only in byte order must produce different
        // layouts.
        let a = canonical_stats_bytes(&stats([0x0100, 0, 0, 0, 0, 0]));
        let b = canonical_stats_bytes(&stats([0x0001, 0, 0, 0, 0, 0]));
        assert_ne!(a, b);
        assert_eq!(&a[0..8], &[0, 0, 0, 0, 0, 0, 0x01, 0x00]);
    }

    proptest! {
        #[test]
        fn prop_every_field_affects_fingerprint(
            values in prop::array::uniform6(any::<u64>()),
            field in 0usize..6,
            delta in 1u64..=u64::MAX,
        ) {
            let base = stats(values);
            let mut changed = values;
            changed[field] = changed[field].wrapping_add(delta);
            prop_assume!(changed[field] != values[field]);

            prop_assert_ne!(fingerprint(&base), fingerprint(&stats(changed)));
        }

        #[test]
        fn prop_fingerprint_is_pure(values in prop::array::uniform6(any::<u64>())) {
            let s = stats(values);
            prop_assert_eq!(fingerprint(&s), fingerprint(&s));
        }
    }
}
