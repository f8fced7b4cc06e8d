//! # Signature Helpers
//!
//! ## iPaymu request signing
//! ```text
//! body           = JSON, serialized once, sent byte-for-byte
//! string_to_sign = UPPER(method) ":" va ":" lower(hex(sha256(body))) ":" secret
//! signature      = hex(hmac_sha256(key = secret, string_to_sign))
//! ```
//!
//! ## Midtrans notification check
//! ```text
//! signature_key  = hex(sha512(order_id + status_code + gross_amount + server_key))
//! ```

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

/// Signs an iPaymu API request body.
///
/// Returns `None` only if the HMAC key is rejected, which SHA-256 HMAC never
/// does for any key length.
pub fn ipaymu_signature(method: &str, va: &str, body: &str, secret: &str) -> Option<String> {
    let body_hash = hex::encode(Sha256::digest(body.as_bytes()));
    let string_to_sign = format!("{}:{}:{}:{}", method.to_uppercase(), va, body_hash, secret);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(string_to_sign.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Expected `signature_key` of a Midtrans notification.
pub fn midtrans_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison for signatures.
pub fn constant_time_eq(expected: &str, given: &str) -> bool {
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipaymu_signature_vector() {
        let body = r#"{"account":"0000001234567890","transactionId":"T1"}"#;
        let signature = ipaymu_signature("post", "0000001234567890", body, "SANDBOX-SECRET").unwrap();
        assert_eq!(
            signature,
            "db922fa5335451a1049a4587a652ef775702785ddc5b22047c0f520d7de0eaac"
        );
    }

    #[test]
    fn test_ipaymu_signature_depends_on_body() {
        let a = ipaymu_signature("POST", "va", r#"{"page":"1"}"#, "secret").unwrap();
        let b = ipaymu_signature("POST", "va", r#"{"page":"2"}"#, "secret").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_midtrans_signature_vector() {
        let signature = midtrans_signature("order-1", "200", "10000.00", "SB-Mid-server-KEY");
        assert_eq!(
            signature,
            "494c2be5f2251ce6e60d153821965d018a902290118663228a3eca90ddd975f15f031c9beb5330184b10d1ba132b157dd81dafcc2e8ae8f5c4c020f24568cc0d"
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
