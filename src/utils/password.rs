use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const ITERATIONS: u32 = 100_000;
const SALT_BYTES: usize = 16;
const KEY_LENGTH: usize = 32;
const SEPARATOR: char = '$';

/// Hash a password with PBKDF2-HMAC-SHA256 and a random salt.
///
/// Format: `<salt hex>$<derived key hex>`. The KDF salt is the 32-char hex
/// text itself, not the decoded bytes.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);

    let mut key = [0u8; KEY_LENGTH];
    derive_key(password, &salt, ITERATIONS, &mut key);

    format!("{salt}{SEPARATOR}{}", hex::encode(key))
}

/// Verify a password against a stored hash, in constant time.
///
/// Malformed records never raise: they simply fail verification.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Some((salt, hash_hex)) = stored_hash.split_once(SEPARATOR) else {
        return false;
    };

    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    if salt.is_empty() || expected.is_empty() {
        return false;
    }

    let mut computed = vec![0u8; expected.len()];
    derive_key(password, salt, ITERATIONS, &mut computed);

    computed.ct_eq(&expected).into()
}

fn derive_key(password: &str, salt: &str, iterations: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Secret123!");
        assert!(verify_password("Secret123!", &hash));
        assert!(!verify_password("secret123!", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let first = hash_password("Secret123!");
        let second = hash_password("Secret123!");

        assert_ne!(first, second);
        assert!(verify_password("Secret123!", &first));
        assert!(verify_password("Secret123!", &second));
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_password("pw");
        let (salt, key) = hash.split_once('$').unwrap();
        assert_eq!(salt.len(), SALT_BYTES * 2);
        assert_eq!(key.len(), KEY_LENGTH * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_malformed_hash_fails_verification() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "no-separator"));
        assert!(!verify_password("pw", "salt$not-hex"));
        assert!(!verify_password("pw", "$abcd"));
        assert!(!verify_password("pw", "salt$"));
    }

    #[test]
    fn test_derive_key_matches_reference_vector() {
        // RFC 7914 section 11 style vector: P="password", S="salt", c=1
        let mut out = [0u8; 32];
        derive_key("password", "salt", 1, &mut out);
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }
}
