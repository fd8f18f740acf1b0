//! Document rows and identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Version value meaning "no specific version requested, use latest".
pub const LATEST_VERSION: i64 = 0;

/// Length of generated document IDs.
pub const ID_LENGTH: usize = 8;

/// Longest ID the store accepts (key prefix is one length byte).
pub const MAX_ID_LENGTH: usize = u8::MAX as usize;

const ID_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One immutable version of a document.
///
/// `content` is empty when the row came from a metadata-only listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub version: i64,
    pub content: String,
    pub language: String,
}

/// Generate a fresh alphanumeric document ID.
///
/// Digits are taken from the low end of a random v4 UUID, which are all
/// random bits (the version/variant nibbles sit in the middle).
pub fn generate_id() -> String {
    let mut n = Uuid::new_v4().as_u128();
    let base = ID_ALPHABET.len() as u128;
    (0..ID_LENGTH)
        .map(|_| {
            let digit = (n % base) as usize;
            n /= base;
            ID_ALPHABET[digit] as char
        })
        .collect()
}

/// Parse a version path segment. `"0"` yields [`LATEST_VERSION`].
pub fn parse_version(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(v) if v >= 0 => Ok(v),
        _ => Err(Error::invalid(format!("invalid version: {raw}"))),
    }
}
