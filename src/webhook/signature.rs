//! `X-Hub-Signature-256` signing and verification.

use std::fmt::Write as _;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Checks `header` (`sha256=<hex>`) against the HMAC of `payload` under
/// `secret`. The digest comparison is constant-time.
#[must_use]
pub fn verify(secret: &[u8], payload: &[u8], header: &str) -> bool {
    let Some(expected) = header
        .trim()
        .strip_prefix(PREFIX)
        .and_then(decode_hex)
    else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Produces the header value GitHub would send for `payload`.
///
/// # Example
///
/// ```
/// use butler::webhook::signature::{sign, verify};
///
/// let header = sign(b"secret", b"{}");
/// assert!(header.starts_with("sha256="));
/// assert!(verify(b"secret", b"{}", &header));
/// ```
#[must_use]
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    let digest = HmacSha256::new_from_slice(secret)
        .map(|mut mac| {
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        })
        .unwrap_or_default();
    let mut header = String::with_capacity(PREFIX.len() + digest.len() * 2);
    header.push_str(PREFIX);
    for byte in digest {
        let _infallible = write!(header, "{byte:02x}");
    }
    header
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    let pairs = raw.as_bytes().chunks_exact(2);
    if raw.is_empty() || !pairs.remainder().is_empty() {
        return None;
    }
    pairs
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
        })
        .collect()
}
