use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix for keys derived from an authenticated user id.
const USER_PREFIX: &str = "user:";
/// Prefix for keys derived from an anonymous fingerprint.
const ANON_PREFIX: &str = "anon:";

/// How much of the user-agent participates in the fingerprint. Enough to
/// distinguish browsers behind a shared IP without hashing arbitrarily long
/// header values.
const UA_FINGERPRINT_CHARS: usize = 50;

/// Derives the rate-limit partition key for a caller.
///
/// Authenticated callers key on their user id. Anonymous callers key on a
/// salted hash of client IP plus a truncated user-agent, so the raw address
/// never appears in limiter state or diagnostics output.
pub struct ClientKeyer {
    salt: String,
}

impl ClientKeyer {
    /// Create a keyer with the given salt. An empty salt is replaced by a
    /// random per-process value, which keeps fingerprints stable within a
    /// process lifetime but unlinkable across restarts.
    pub fn new(salt: &str) -> Self {
        let salt = if salt.is_empty() {
            let nonce: u128 = rand::thread_rng().gen();
            format!("{nonce:032x}")
        } else {
            salt.to_string()
        };
        Self { salt }
    }

    pub fn key_for(&self, user_id: Option<&str>, ip: &str, user_agent: &str) -> String {
        match user_id {
            Some(id) => format!("{USER_PREFIX}{id}"),
            None => {
                let ua: String = user_agent.chars().take(UA_FINGERPRINT_CHARS).collect();
                let mut hasher = Sha256::new();
                hasher.update(self.salt.as_bytes());
                hasher.update(b":");
                hasher.update(ip.as_bytes());
                hasher.update(b":");
                hasher.update(ua.as_bytes());
                let digest = hex::encode(hasher.finalize());
                format!("{ANON_PREFIX}{}", &digest[..16])
            }
        }
    }
}

/// Whether a client key belongs to an unidentified caller.
pub fn is_anonymous(key: &str) -> bool {
    key.starts_with(ANON_PREFIX)
}
