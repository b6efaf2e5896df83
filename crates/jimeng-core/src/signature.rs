//! AWS4-HMAC-SHA256 request signing.
//!
//! Produces the `authorization` header the upload service expects, bit for
//! bit: canonical request, string-to-sign, a four-step HMAC key chain and
//! the final hex signature.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AppError;
use crate::models::Method;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const DATE_HEADER: &str = "x-amz-date";
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";
pub const AUTHORIZATION_HEADER: &str = "authorization";

const KEY_PREFIX: &str = "AWS4";
const SCOPE_TERMINATOR: &str = "aws4_request";

type HmacSha256 = Hmac<Sha256>;

/// Access key pair plus optional STS session token.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Region and service the signature is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    pub region: String,
    pub service: String,
}

impl Default for SigningScope {
    fn default() -> Self {
        Self {
            region: "cn-north-1".to_string(),
            service: "imagex".to_string(),
        }
    }
}

/// Everything needed to sign one request.
#[derive(Debug, Clone, Copy)]
pub struct SignatureContext<'a> {
    pub method: Method,
    pub url: &'a str,
    /// Headers offered for signing; must contain `x-amz-date`.
    pub headers: &'a [(String, String)],
    pub credentials: &'a Credentials,
    pub payload: Option<&'a str>,
    pub scope: &'a SigningScope,
}

/// Intermediate products of the signing process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub canonical: String,
    pub signed_headers: String,
    pub payload_hash: String,
    /// Lower-cased name/value pairs that were signed.
    pub headers: BTreeMap<String, String>,
}

/// Formats a timestamp as the `x-amz-date` token (`YYYYMMDDTHHMMSSZ`).
pub fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// SHA-256 of arbitrary bytes, returned as 64-char lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn date_token<'a>(ctx: &SignatureContext<'a>) -> Result<&'a str, AppError> {
    ctx.headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(DATE_HEADER))
        .map(|(_, value)| value.trim())
        .filter(|value| value.len() >= 8 && value.is_char_boundary(8))
        .ok_or_else(|| AppError::InvalidRequest(format!("Missing or malformed {DATE_HEADER} header")))
}

/// Builds the canonical request for `ctx`.
pub fn canonical_request(ctx: &SignatureContext<'_>) -> Result<CanonicalRequest, AppError> {
    let url = Url::parse(ctx.url)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid URL '{}': {e}", ctx.url)))?;
    let path = match url.path() {
        "" => "/",
        p => p,
    };

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // Stable: duplicate keys keep their original order.
    query.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut headers = BTreeMap::new();
    headers.insert(DATE_HEADER.to_string(), date_token(ctx)?.to_string());
    if let Some(token) = &ctx.credentials.session_token {
        headers.insert(SECURITY_TOKEN_HEADER.to_string(), token.trim().to_string());
    }

    let payload_hash = match ctx.payload {
        Some(payload) if ctx.method == Method::Post && !payload.is_empty() => {
            let hash = sha256_hex(payload.as_bytes());
            headers.insert(CONTENT_SHA256_HEADER.to_string(), hash.clone());
            hash
        }
        _ => sha256_hex(b""),
    };

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical = [
        ctx.method.as_str(),
        path,
        canonical_query.as_str(),
        canonical_headers.as_str(),
        signed_headers.as_str(),
        payload_hash.as_str(),
    ]
    .join("\n");

    Ok(CanonicalRequest {
        canonical,
        signed_headers,
        payload_hash,
        headers,
    })
}

/// Computes the `authorization` header value for `ctx`.
pub fn sign(ctx: &SignatureContext<'_>) -> Result<String, AppError> {
    Ok(sign_with_canonical(ctx)?.0)
}

fn sign_with_canonical(ctx: &SignatureContext<'_>) -> Result<(String, CanonicalRequest), AppError> {
    let timestamp = date_token(ctx)?;
    let date = &timestamp[..8];
    let canonical = canonical_request(ctx)?;

    let scope = format!(
        "{date}/{}/{}/{SCOPE_TERMINATOR}",
        ctx.scope.region, ctx.scope.service
    );
    let string_to_sign = [
        ALGORITHM,
        timestamp,
        scope.as_str(),
        sha256_hex(canonical.canonical.as_bytes()).as_str(),
    ]
    .join("\n");

    let k_date = hmac_sha256(
        format!("{KEY_PREFIX}{}", ctx.credentials.secret_access_key).as_bytes(),
        date,
    )?;
    let k_region = hmac_sha256(&k_date, &ctx.scope.region)?;
    let k_service = hmac_sha256(&k_region, &ctx.scope.service)?;
    let k_signing = hmac_sha256(&k_service, SCOPE_TERMINATOR)?;

    let mut mac = HmacSha256::new_from_slice(&k_signing)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid signing key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = format!("{:x}", mac.finalize().into_bytes());

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
        ctx.credentials.access_key_id, canonical.signed_headers
    );
    Ok((authorization, canonical))
}

/// Every header a signed request must carry: the signed headers plus `authorization`.
pub fn signed_headers(ctx: &SignatureContext<'_>) -> Result<Vec<(String, String)>, AppError> {
    let (authorization, canonical) = sign_with_canonical(ctx)?;
    let mut headers: Vec<(String, String)> = canonical.headers.into_iter().collect();
    headers.push((AUTHORIZATION_HEADER.to_string(), authorization));
    Ok(headers)
}
