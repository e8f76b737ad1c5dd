//! Anti-CSRF token issuance and verification.
//!
//! Tokens are stateless: `nonce:expiry:signature`, where the signature is
//! HMAC-SHA256 over `nonce:expiry` with the process-wide secret. Nothing is
//! stored server-side, so a captured token stays replayable until expiry;
//! that is an accepted tradeoff for anti-CSRF use.
//!
//! Verification rejects uniformly. Callers never learn whether a candidate
//! was malformed, tampered with, or expired.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::observability::metrics;
use crate::security::secret::SecretKey;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the candidate token.
pub const CSRF_HEADER: &str = "x-csrf-token";

const NONCE_LEN: usize = 16;

/// Issues and verifies anti-CSRF tokens, and gates mutating requests.
pub struct CsrfGuard {
    secret: SecretKey,
    ttl: Duration,
    max_body_size: usize,
}

impl CsrfGuard {
    pub fn new(secret: SecretKey, ttl: Duration, max_body_size: usize) -> Self {
        Self {
            secret,
            ttl,
            max_body_size,
        }
    }

    /// Mint a fresh token: `nonce:expiry:signature`.
    pub fn issue(&self) -> String {
        self.issue_at(epoch_millis())
    }

    fn issue_at(&self, now_ms: u64) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = hex::encode(nonce_bytes);

        let expiry = now_ms + self.ttl.as_millis() as u64;
        let payload = format!("{nonce}:{expiry}");
        let signature = self.sign(&payload);
        format!("{payload}:{signature}")
    }

    /// Check a candidate token. `true` means the request may proceed.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        self.verify_at(candidate, epoch_millis())
    }

    fn verify_at(&self, candidate: Option<&str>, now_ms: u64) -> bool {
        let Some(token) = candidate else {
            return false;
        };

        let mut fields = token.split(':');
        let (Some(nonce), Some(expiry_raw), Some(signature), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return false;
        };
        if nonce.is_empty() || expiry_raw.is_empty() || signature.is_empty() {
            return false;
        }

        // Recompute over the fields exactly as presented. The length check
        // only distinguishes malformed from wrong; the comparison itself is
        // constant time.
        let expected = self.sign(&format!("{nonce}:{expiry_raw}"));
        if expected.len() != signature.len() {
            return false;
        }
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return false;
        }

        let Ok(expiry) = expiry_raw.parse::<u64>() else {
            return false;
        };
        now_ms <= expiry
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn is_mutating(method: &Method) -> bool {
        method == Method::POST
            || method == Method::PUT
            || method == Method::PATCH
            || method == Method::DELETE
    }
}

/// One candidate token source. Tried in order; first present wins.
type TokenExtractor = fn(&HeaderMap, Option<&Value>) -> Option<String>;

/// Candidate sources in priority order: dedicated header, then the legacy
/// body field, then the alternate body field.
const TOKEN_SOURCES: &[TokenExtractor] = &[from_header, from_legacy_body_field, from_body_field];

fn from_header(headers: &HeaderMap, _body: Option<&Value>) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn from_legacy_body_field(_headers: &HeaderMap, body: Option<&Value>) -> Option<String> {
    body_string_field(body, "_token")
}

fn from_body_field(_headers: &HeaderMap, body: Option<&Value>) -> Option<String> {
    body_string_field(body, "csrfToken")
}

fn body_string_field(body: Option<&Value>, field: &str) -> Option<String> {
    body?.get(field)?.as_str().map(str::to_owned)
}

/// Pick the candidate token out of a request's headers and parsed body.
pub fn extract_token(headers: &HeaderMap, body: Option<&Value>) -> Option<String> {
    TOKEN_SOURCES
        .iter()
        .find_map(|source| source(headers, body))
}

/// Middleware gating every mutating request behind token verification.
///
/// The body is buffered (bounded by the configured cap) so body-borne
/// tokens can be read, then re-installed for the downstream handler.
pub async fn csrf_middleware(
    State(guard): State<Arc<CsrfGuard>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !CsrfGuard::is_mutating(request.method()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, guard.max_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!(path = %path, "Request body exceeded size cap");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "Request body too large"})),
            )
                .into_response();
        }
    };

    let parsed_body: Option<Value> = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };

    let candidate = extract_token(&parts.headers, parsed_body.as_ref());
    if !guard.verify(candidate.as_deref()) {
        tracing::warn!(path = %path, "Rejected request with invalid or missing CSRF token");
        metrics::record_csrf_denied();
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "Invalid or missing CSRF token"})),
        )
            .into_response();
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn guard() -> CsrfGuard {
        CsrfGuard::new(SecretKey::from_bytes(b"test-secret".to_vec()), TTL, 64 * 1024)
    }

    fn is_lower_hex(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn issued_token_has_expected_shape() {
        let token = guard().issue();
        let fields: Vec<&str> = token.split(':').collect();
        assert_eq!(fields.len(), 3);

        let (nonce, expiry, signature) = (fields[0], fields[1], fields[2]);
        assert!(is_lower_hex(nonce));
        assert_eq!(nonce.len(), 32);
        expiry.parse::<u64>().expect("expiry is numeric");
        assert!(is_lower_hex(signature));
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn fresh_token_verifies() {
        let guard = guard();
        let token = guard.issue();
        assert!(guard.verify(Some(&token)));
    }

    #[test]
    fn token_valid_until_expiry_inclusive() {
        let guard = guard();
        let now = 1_700_000_000_000;
        let token = guard.issue_at(now);
        let expiry = now + TTL.as_millis() as u64;

        assert!(guard.verify_at(Some(&token), now));
        assert!(guard.verify_at(Some(&token), expiry));
        assert!(!guard.verify_at(Some(&token), expiry + 1));
    }

    #[test]
    fn token_rejected_after_simulated_31_minutes() {
        let guard = guard();
        let now = 1_700_000_000_000;
        let token = guard.issue_at(now);
        assert!(!guard.verify_at(Some(&token), now + 31 * 60 * 1000));
    }

    #[test]
    fn flipping_any_signature_character_rejects() {
        let guard = guard();
        let token = guard.issue();
        let sig_start = token.rfind(':').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut tampered: Vec<u8> = token.as_bytes().to_vec();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == token {
                continue;
            }
            assert!(!guard.verify(Some(&tampered)), "position {i} accepted");
        }
    }

    #[test]
    fn malformed_candidates_reject_without_panicking() {
        let guard = guard();
        for candidate in [
            None,
            Some(""),
            Some("justonefield"),
            Some("two:fields"),
            Some("a:b:c:d"),
            Some("::"),
            Some(":1234:abcd"),
        ] {
            assert!(!guard.verify(candidate));
        }
    }

    #[test]
    fn non_numeric_expiry_rejects_even_with_valid_signature() {
        let guard = guard();
        let payload = "deadbeef:notanumber";
        let signature = guard.sign(payload);
        assert!(!guard.verify(Some(&format!("{payload}:{signature}"))));
    }

    #[test]
    fn wrong_secret_rejects() {
        let token = guard().issue();
        let other = CsrfGuard::new(SecretKey::from_bytes(b"other-secret".to_vec()), TTL, 64 * 1024);
        assert!(!other.verify(Some(&token)));
    }

    #[test]
    fn header_takes_priority_over_body_fields() {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_static("from-header"));
        let body = json!({"_token": "from-legacy", "csrfToken": "from-alt"});

        assert_eq!(
            extract_token(&headers, Some(&body)).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn legacy_body_field_takes_priority_over_alternate() {
        let headers = HeaderMap::new();
        let body = json!({"_token": "from-legacy", "csrfToken": "from-alt"});
        assert_eq!(
            extract_token(&headers, Some(&body)).as_deref(),
            Some("from-legacy")
        );

        let body = json!({"csrfToken": "from-alt"});
        assert_eq!(
            extract_token(&headers, Some(&body)).as_deref(),
            Some("from-alt")
        );
    }

    #[test]
    fn no_candidate_anywhere_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, None), None);
        assert_eq!(
            extract_token(&headers, Some(&json!({"unrelated": true}))),
            None
        );
    }
}
