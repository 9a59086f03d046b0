//! HMAC-SHA-256 payload signatures carried in the `HashSHA256` header.

use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 signature of the request body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Signs and verifies payloads with a shared secret.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Returns `None` for a missing or empty key, which disables signing.
    pub fn from_key(key: Option<&str>) -> Option<Self> {
        key.filter(|key| !key.is_empty()).map(Self::new)
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC is defined for keys of any length, longer keys are hashed first.
        match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any size"),
        }
    }

    /// Base64 encoded HMAC-SHA-256 of `data`.
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(data);
        BASE64.encode(&mac.finalize().into_bytes())
    }

    /// Checks a base64 signature against `data` in constant time.
    pub fn verify(&self, signature: &str, data: &[u8]) -> bool {
        let Ok(expected) = BASE64.decode(signature.trim().as_bytes()) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
