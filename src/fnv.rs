//! FNV-1a hashing and bucket indexing.
//!
//! Both map backends hash keys with the 64-bit FNV-1a digest and place
//! them by masking the digest with `n_buckets - 1`. Bucket counts are
//! always powers of two, so the mask is exactly `digest % n_buckets`.

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 64-bit FNV-1a digest of `bytes`. Pure and allocation-free.
#[inline]
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET_BASIS;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Bucket index for `hash` in a table of `n_buckets` buckets.
#[inline]
pub(crate) fn bucket_of(hash: u64, n_buckets: usize) -> usize {
    debug_assert!(n_buckets.is_power_of_two());
    (hash as usize) & (n_buckets - 1)
}
