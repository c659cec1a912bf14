//! Stateless signed-token authentication.
//!
//! Tokens are `user_id:timestamp:signature` where the signature is an
//! HMAC-SHA256 over `user_id:timestamp` keyed with the configured secret.
//! Verification is constant-time and enforces a maximum token age. An empty
//! secret disables authentication entirely: every caller is anonymous.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use snapgate_common::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, payload: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Mint a token for `user_id` stamped with the current time.
pub fn mint_token(secret: &str, user_id: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let timestamp = unix_now();
    let payload = format!("{user_id}:{timestamp}");
    let signature = sign(secret, &payload)?;
    Some(format!("{payload}:{signature}"))
}

/// Verify a token, returning the embedded user id when the signature checks
/// out and the token is within `max_age_secs` of now.
pub fn verify_token(secret: &str, token: &str, max_age_secs: u64) -> Option<String> {
    if secret.is_empty() {
        return None;
    }

    // rsplitn so a user id containing ':' still parses.
    let mut parts = token.rsplitn(3, ':');
    let signature = parts.next()?;
    let timestamp = parts.next()?;
    let user_id = parts.next()?;
    if user_id.is_empty() {
        return None;
    }

    let payload = format!("{user_id}:{timestamp}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    let expected = hex::decode(signature).ok()?;
    mac.verify_slice(&expected).ok()?;

    let issued: u64 = timestamp.parse().ok()?;
    let now = unix_now();
    if issued > now || now - issued > max_age_secs {
        return None;
    }

    Some(user_id.to_string())
}

/// Resolve the authenticated user from an `Authorization: Bearer` header,
/// if any. Invalid or expired tokens fall back to anonymous rather than
/// failing the request; the rate limiter treats them as such.
pub fn authenticated_user(headers: &HeaderMap, auth: &AuthConfig) -> Option<String> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    verify_token(&auth.secret, token, auth.token_max_age_secs)
}

/// Resolve the authenticated user from a `token` query parameter, as used
/// by WebSocket upgrade requests where headers are awkward for browser
/// clients.
pub fn user_from_query(query: Option<&str>, auth: &AuthConfig) -> Option<String> {
    let token = query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))?;
    verify_token(&auth.secret, token, auth.token_max_age_secs)
}

/// Best-effort client IP: first hop of X-Forwarded-For, then X-Real-IP,
/// then the peer address of the socket.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real.is_empty() {
            return real.to_string();
        }
    }
    peer.ip().to_string()
}

/// User-Agent header, or the empty string when absent.
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_round_trip() {
        let token = mint_token("secret", "user-42").unwrap();
        let user = verify_token("secret", &token, 3600).unwrap();
        assert_eq!(user, "user-42");
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = mint_token("secret", "user-42").unwrap();
        let forged = token.replace("user-42", "user-99");
        assert!(verify_token("secret", &forged, 3600).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_token("secret", "user-42").unwrap();
        assert!(verify_token("other", &token, 3600).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signature = sign("secret", "u:100").unwrap();
        let stale = format!("u:100:{signature}");
        assert!(verify_token("secret", &stale, 3600).is_none());
    }

    #[test]
    fn empty_secret_disables_auth() {
        assert!(mint_token("", "user-42").is_none());
        assert!(verify_token("", "anything", 3600).is_none());
    }

    #[test]
    fn user_id_with_colon_survives() {
        let token = mint_token("secret", "google:12345").unwrap();
        assert_eq!(
            verify_token("secret", &token, 3600).unwrap(),
            "google:12345"
        );
    }

    #[test]
    fn bearer_header_resolves_user() {
        let auth = AuthConfig {
            secret: "secret".to_string(),
            token_max_age_secs: 3600,
        };
        let token = mint_token("secret", "user-7").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(authenticated_user(&headers, &auth).unwrap(), "user-7");

        headers.insert("authorization", HeaderValue::from_static("Bearer junk"));
        assert!(authenticated_user(&headers, &auth).is_none());
    }

    #[test]
    fn query_token_resolves_user() {
        let auth = AuthConfig {
            secret: "secret".to_string(),
            token_max_age_secs: 3600,
        };
        let token = mint_token("secret", "user-7").unwrap();

        let query = format!("foo=bar&token={token}");
        assert_eq!(
            user_from_query(Some(&query), &auth).unwrap(),
            "user-7"
        );

        assert!(user_from_query(Some("token=junk"), &auth).is_none());
        assert!(user_from_query(Some("foo=bar"), &auth).is_none());
        assert!(user_from_query(None, &auth).is_none());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, peer), "127.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers, peer), "203.0.113.9");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer), "198.51.100.4");
    }
}
