//! Hashing used for hashed string lookups in corpus layers.
//!
//! Hashed string indices store the 64-bit FNV-1a hash of the UTF-8 bytes of a
//! string, reinterpreted as a signed integer, as the key of an index pair.

use std::hash::Hasher;

use fnv::FnvHasher;

/// fnv1a_64 computes the 64-bit FNV-1a hash of `data`.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

/// fnv_hash returns the FNV-1a hash of a string as stored in index keys.
pub fn fnv_hash(s: impl AsRef<[u8]>) -> i64 {
    fnv1a_64(s.as_ref()) as i64
}

/// FnvHash is implemented by everything whose bytes can be hashed into an index key.
pub trait FnvHash {
    fn fnv_hash(&self) -> i64;
}

impl<T: AsRef<[u8]> + ?Sized> FnvHash for T {
    fn fnv_hash(&self) -> i64 {
        fnv_hash(self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use crate::hash::{fnv1a_64, fnv_hash, FnvHash};

    #[test]
    fn test_fnv1a_64_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_fnv_hash_signed() {
        assert_eq!(fnv_hash("a"), 0xaf63dc4c8601ec8c_u64 as i64);
        assert!(fnv_hash("a") < 0);
        assert_eq!("foobar".fnv_hash(), fnv_hash(b"foobar"));
        assert_eq!(String::from("a").fnv_hash(), fnv_hash("a"));
    }
}
