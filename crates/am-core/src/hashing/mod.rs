//! Canonicalización y hashing para fingerprints de casos.
mod canonical_json;
mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{hash_file, hash_str, hash_value};
