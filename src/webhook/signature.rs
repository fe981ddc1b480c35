//! GitHub `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check `header` (`sha256=<hex>`) against the HMAC-SHA256 of `body`.
/// The comparison is constant time.
pub fn verify(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Header value GitHub would send for `body`.
#[cfg(test)]
pub(crate) fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // Example from GitHub's "Validating webhook deliveries" docs.
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify(b"It's a Secret to Everybody", b"Hello, World!", header));
    }

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"zen":"Design for failure."}"#;
        let header = sign(b"hush", body);
        assert!(header.starts_with("sha256="));
        assert!(verify(b"hush", body, &header));
    }

    #[test]
    fn test_wrong_secret() {
        let body = b"payload";
        let header = sign(b"right", body);
        assert!(!verify(b"wrong", body, &header));
    }

    #[test]
    fn test_tampered_body() {
        let header = sign(b"hush", b"original");
        assert!(!verify(b"hush", b"tampered", &header));
    }

    #[test]
    fn test_malformed_headers() {
        assert!(!verify(b"hush", b"body", ""));
        assert!(!verify(b"hush", b"body", "sha1=abcdef"));
        assert!(!verify(b"hush", b"body", "sha256=not-hex"));
        assert!(!verify(b"hush", b"body", "sha256="));
    }
}
