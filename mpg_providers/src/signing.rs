//! HMAC-SHA256 signatures over canonical request strings.
use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use mpg_engine::traits::ProviderError;
use rand::{distributions::Alphanumeric, Rng};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parameters that are never part of the signed string
const UNSIGNED_PARAMS: [&str; 2] = ["sign", "sign_type"];

/// Base64-encoded HMAC-SHA256 of `message` under `secret`.
pub fn sign(secret: &str, message: &str) -> Result<String, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProviderError::Configuration(format!("Invalid signing key. {e}")))?;
    mac.update(message.as_bytes());
    Ok(base64::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a base64 signature. Empty secrets never verify.
pub fn verify(secret: &str, message: &str, signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = base64::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// `k1=v1&k2=v2…` over the parameters in key order, skipping empty values and the signature fields.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| !v.is_empty() && !UNSIGNED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<String>>()
        .join("&")
}

/// One line per component, each terminated by `\n`.
pub fn canonical_lines(parts: &[&str]) -> String {
    parts.iter().fold(String::new(), |mut acc, part| {
        acc.push_str(part);
        acc.push('\n');
        acc
    })
}

pub fn nonce() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}
