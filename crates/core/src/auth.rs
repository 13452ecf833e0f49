//! Password hashing and bearer-token primitives.
//!
//! Passwords are hashed with PBKDF2-HMAC-SHA256 and a per-user random salt,
//! encoded as `pbkdf2-sha256$<iterations>$<salt_hex>$<key_hex>` so the cost
//! can be raised later without invalidating stored hashes. Bearer tokens are
//! opaque random values; only their SHA-256 digest is ever stored.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;

pub const DEFAULT_ITERATIONS: u32 = 50_000;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_password_with(password, DEFAULT_ITERATIONS, &salt)
}

pub fn hash_password_with(password: &str, iterations: u32, salt: &[u8]) -> String {
    let iterations = iterations.max(1);
    let key = derive_key(password.as_bytes(), salt, iterations);
    format!("{SCHEME}${iterations}${}${}", encode_hex(salt), encode_hex(&key))
}

/// Checks a password against a stored encoding. Malformed encodings verify
/// as false rather than erroring; the comparison on the derived key is
/// constant time.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (scheme, iterations, salt_hex, key_hex) =
        match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(iterations), Some(salt), Some(key), None) => {
                (scheme, iterations, salt, key)
            }
            _ => return false,
        };
    if scheme != SCHEME {
        return false;
    }
    let iterations = match iterations.parse::<u32>() {
        Ok(value) if value >= 1 => value,
        _ => return false,
    };
    let (Some(salt), Some(expected)) = (decode_hex(salt_hex), decode_hex(key_hex)) else {
        return false;
    };

    let derived = derive_key(password.as_bytes(), &salt, iterations);
    constant_time_eq(&derived, &expected)
}

/// A fresh opaque bearer token: 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_hex(&bytes)
}

/// Digest under which a token is persisted and looked up.
pub fn token_digest(token: &str) -> String {
    sha256_hex(token.as_bytes())
}

/// PBKDF2 with a single SHA-256-sized output block.
fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut salted = Vec::with_capacity(salt.len() + 4);
    salted.extend_from_slice(salt);
    salted.extend_from_slice(&1u32.to_be_bytes());

    let mut round = hmac_block(password, &salted);
    let mut output = round;
    for _ in 1..iterations {
        round = hmac_block(password, &round);
        for (acc, byte) in output.iter_mut().zip(round.iter()) {
            *acc ^= byte;
        }
    }
    output
}

fn hmac_block(key: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(payload);
            output.copy_from_slice(mac.finalize().into_bytes().as_slice());
        }
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => output.copy_from_slice(Sha256::digest(payload).as_slice()),
    }
    output
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn sha256_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    encode_hex(digest.as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    value
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        generate_token, hash_password, hash_password_with, token_digest, verify_password,
    };

    // Keep test-side derivations cheap; the encoding carries the count.
    const TEST_ITERATIONS: u32 = 64;

    #[test]
    fn password_round_trips_through_hash_and_verify() {
        let encoded = hash_password_with("hunter2!", TEST_ITERATIONS, b"0123456789abcdef");
        assert!(verify_password("hunter2!", &encoded));
        assert!(!verify_password("hunter3!", &encoded));
    }

    #[test]
    fn default_hash_encoding_is_self_describing() {
        let encoded = hash_password("correct horse");
        assert!(encoded.starts_with("pbkdf2-sha256$"));
        assert!(verify_password("correct horse", &encoded));
    }

    #[test]
    fn salts_make_equal_passwords_hash_differently() {
        let a = hash_password_with("same", TEST_ITERATIONS, b"salt-aaaa");
        let b = hash_password_with("same", TEST_ITERATIONS, b"salt-bbbb");
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn malformed_encodings_never_verify() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "plain$not$a$hash"));
        assert!(!verify_password("pw", "pbkdf2-sha256$0$aa$bb"));
        assert!(!verify_password("pw", "pbkdf2-sha256$64$zz$bb"));
    }

    #[test]
    fn tokens_are_long_random_and_digest_stably() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, generate_token());
        assert_eq!(token_digest(&token), token_digest(&token));
        assert_ne!(token_digest(&token), token);
    }
}
