//! HMAC-SHA256 body signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_TYPE_HEADER: &str = "x-signature-type";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const SIGNATURE_TYPE: &str = "sha256-hmac";

/// Lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
