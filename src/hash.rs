//! Stable, non-cryptographic hashing used to seed ring positions.
//!
//! FNV-1 32-bit (multiply-then-xor), matching Go's `hash/fnv.New32()` as
//! used by `internal/hash/hash.go` — chosen because it is a fixed,
//! well-known algorithm: seed positions must be reproducible across client
//! processes (and languages) without any coordination beyond agreeing on
//! the hash function.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1 hash of `s`.
pub fn hash(s: &str) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for byte in s.as_bytes() {
        h = h.wrapping_mul(FNV_PRIME);
        h ^= u32::from(*byte);
    }
    h
}

/// `hash(s) mod m`, used to pick a client's initial ring position.
pub fn modulo(s: &str, m: i64) -> i64 {
    i64::from(hash(s)) % m
}
