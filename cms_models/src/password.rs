//! Salted password hashes, stored as `sha256$<salt>$<hex digest>`

use base64ct::Base64Unpadded;
use base64ct::Encoding as _;
use sha2::Digest as _;
use sha2::Sha256;
use subtle::ConstantTimeEq as _;

const SCHEME: &str = "sha256";

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

pub fn hash(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt = Base64Unpadded::encode_string(&salt);
    format!("{SCHEME}${salt}${}", digest(&salt, password))
}

pub fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    digest(salt, password)
        .as_bytes()
        .ct_eq(expected.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_and_verifiable() {
        let first = hash("Simplicity!");
        let second = hash("Simplicity!");
        assert_ne!(first, second);
        assert!(first.starts_with("sha256$"));
        assert!(verify("Simplicity!", &first));
        assert!(verify("Simplicity!", &second));
        assert!(!verify("simplicity!", &first));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify("secret", "secret"));
        assert!(!verify("secret", "md5$salt$abcd"));
        assert!(!verify("", ""));
    }
}
