//! Request signing.
//!
//! Every request carries `Authorization: <workspace_key>:<signature>` where the
//! signature is a base64 HMAC-SHA256 over a newline-joined canonical string:
//!
//! ```text
//! METHOD
//! sha256-hex(body) | ""
//! content-type
//! date (RFC 1123, GMT)
//! request path
//! ```
//!
//! The body digest is SHA-256 hex. A workspace that verifies signatures with a
//! different body digest rejects every request with 401, which single calls
//! surface as `ApiResponse::status_code` and bulk calls as the code of every
//! failed record.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Result, SuprsendError};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Format a timestamp the way the `Date` header expects it.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn hex_sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Path component of `url` used in the canonical string, e.g. `/event/`.
pub fn request_path(url: &str) -> &str {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => &without_scheme[idx..],
        None => "/",
    }
}

pub fn sign_request(
    secret: &str,
    method: &str,
    body: &[u8],
    content_type: &str,
    date: &str,
    path: &str,
) -> Result<String> {
    let body_digest = if body.is_empty() {
        String::new()
    } else {
        hex_sha256(body)
    };
    let canonical = format!("{method}\n{body_digest}\n{content_type}\n{date}\n{path}");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|err| SuprsendError::RequestBuild(format!("invalid signing key: {err}")))?;
    mac.update(canonical.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
