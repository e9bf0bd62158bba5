//! Device credential hashing and transaction id generation.

use md5::{Digest, Md5};
use uuid::Uuid;

/// Computes the MD5 digest of the input and returns it as a lowercase hex string.
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the control token a gateway expects for an admin credential pair.
///
/// The firmware authenticates `/ctrl` requests with `md5("<user>|<password>")`.
pub fn device_token(user: &str, password: &str) -> String {
    md5_hex(&format!("{}|{}", user, password))
}

/// Generates a fresh transaction id for correlating a command with its acknowledgment.
pub fn new_transaction_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex_empty_string() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_device_token_default_admin() {
        assert_eq!(
            device_token("admin", "admin"),
            "3f4bffa77257d243875d0a5a80635934"
        );
    }

    #[test]
    fn test_device_token_custom_credentials() {
        assert_eq!(
            device_token("root", "s3cret"),
            "be74947abde27e7997cce0f6dcc4e4ab"
        );
        assert_ne!(device_token("root", "s3cret"), device_token("admin", "admin"));
    }

    #[test]
    fn test_device_token_length() {
        assert_eq!(device_token("a", "b").len(), 32);
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        let a = new_transaction_id();
        let b = new_transaction_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
