//! RPC request signing (signature version 1.0)
//!
//! The canonical query is every parameter except `Signature`, sorted by key,
//! with keys and values percent-encoded per RFC 3986. The string to sign is
//! `GET&%2F&` followed by the encoded canonical query, and the signature is
//! base64(HMAC-SHA1(secret + "&", string_to_sign)).

use super::error::CloudError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Timestamp format required by the `Timestamp` parameter
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type HmacSha1 = Hmac<Sha1>;

/// Percent-encode per RFC 3986 (unreserved: `A-Z a-z 0-9 - _ . ~`)
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Build the canonical query string from sorted parameters
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the string to sign for a GET request
pub fn string_to_sign(canonical: &str) -> String {
    format!("GET&{}&{}", percent_encode("/"), percent_encode(canonical))
}

/// Compute the request signature
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> Result<String, CloudError> {
    let payload = string_to_sign(&canonical_query(params));
    let mut mac = HmacSha1::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|e| CloudError::Signing(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Sign the parameters and return the full query string, `Signature` last
pub fn signed_query(params: &BTreeMap<String, String>, secret: &str) -> Result<String, CloudError> {
    let signature = sign(params, secret)?;
    Ok(format!(
        "{}&Signature={}",
        canonical_query(params),
        percent_encode(&signature)
    ))
}
