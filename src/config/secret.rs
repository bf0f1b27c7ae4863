//! Password encoding for stored credentials
//!
//! Passwords are stored base64-encoded. No encryption provider is available,
//! so asking for encryption is an error rather than a silent downgrade.

use crate::error::{DbdockError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::seq::SliceRandom;
use rand::Rng;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!#$%&*+-=?@^_";

/// Shortest password [`generate_password`] will produce
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Encode a password for storage
pub fn encode(password: &str, encrypt: bool) -> Result<String> {
    if encrypt {
        return Err(DbdockError::InvalidArgument(
            "password encryption is not available on this platform".to_string(),
        ));
    }
    Ok(STANDARD.encode(password.as_bytes()))
}

/// Decode a stored password
pub fn decode(stored: &str, encrypted: bool) -> Result<String> {
    if encrypted {
        return Err(DbdockError::InvalidArgument(
            "password decryption is not available on this platform".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(stored.trim())
        .map_err(|e| DbdockError::InvalidConfig(format!("stored password is not base64: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|e| DbdockError::InvalidConfig(format!("stored password is not UTF-8: {}", e)))
}

/// Random password with at least one upper case letter, lower case letter,
/// digit and symbol
pub fn generate_password(length: usize) -> Result<String> {
    if length < MIN_PASSWORD_LENGTH {
        return Err(DbdockError::InvalidArgument(format!(
            "password length must be at least {}",
            MIN_PASSWORD_LENGTH
        )));
    }

    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();
    let mut rng = rand::thread_rng();

    let mut password: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while password.len() < length {
        password.push(all[rng.gen_range(0..all.len())]);
    }
    password.shuffle(&mut rng);

    Ok(password.into_iter().map(char::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let stored = encode("P@ssw0rd!", false).unwrap();
        assert_eq!(stored, "UEBzc3cwcmQh");
        assert_eq!(decode(&stored, false).unwrap(), "P@ssw0rd!");
    }

    #[test]
    fn test_encryption_is_refused() {
        assert!(matches!(
            encode("pw", true),
            Err(DbdockError::InvalidArgument(_))
        ));
        assert!(decode("cHc=", true).is_err());
    }

    #[test]
    fn test_generated_password_has_every_class() {
        for _ in 0..50 {
            let password = generate_password(16).unwrap();
            assert_eq!(password.len(), 16);
            assert!(password.bytes().any(|b| UPPER.contains(&b)));
            assert!(password.bytes().any(|b| LOWER.contains(&b)));
            assert!(password.bytes().any(|b| DIGITS.contains(&b)));
            assert!(password.bytes().any(|b| SYMBOLS.contains(&b)));
        }
        assert!(generate_password(4).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode("not base64!", false),
            Err(DbdockError::InvalidConfig(_))
        ));
    }
}
