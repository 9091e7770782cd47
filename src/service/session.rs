use crate::common::{FaceBankError, Result};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

type HmacSha256 = Hmac<Sha256>;

struct SessionEntry {
    identifier: String,
    expires_at: Instant,
}

/// Short-lived bearer tokens for the operations behind a login. A token is
/// `nonce.tag` where the tag is an HMAC over nonce and identifier under a
/// per-process secret, so a service restart invalidates everything
/// outstanding.
pub struct SessionManager {
    secret: [u8; 32],
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill(&mut secret[..]);
        Self {
            secret,
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mint(&self, identifier: &str) -> Result<String> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill(&mut nonce[..]);
        let nonce_hex = hex(&nonce);
        let tag = self.tag_for(&nonce_hex, identifier)?;

        let mut sessions = self.lock_sessions()?;
        sessions.insert(
            nonce_hex.clone(),
            SessionEntry {
                identifier: identifier.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(format!("{}.{}", nonce_hex, tag))
    }

    /// The identifier behind a token, or `None` for anything expired, forged
    /// or unknown. Callers cannot tell which.
    pub fn resolve(&self, token: &str) -> Result<Option<String>> {
        let (nonce_hex, presented_tag) = match token.split_once('.') {
            Some(parts) => parts,
            None => return Ok(None),
        };

        let mut sessions = self.lock_sessions()?;
        let now = Instant::now();
        sessions.retain(|_, entry| entry.expires_at > now);

        let entry = match sessions.get(nonce_hex) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let expected_tag = self.tag_for(nonce_hex, &entry.identifier)?;
        if !slices_eq(presented_tag.as_bytes(), expected_tag.as_bytes()) {
            return Ok(None);
        }
        Ok(Some(entry.identifier.clone()))
    }

    /// Forgets a session. Unknown and malformed tokens are a no-op.
    pub fn revoke(&self, token: &str) -> Result<()> {
        let nonce_hex = match token.split_once('.') {
            Some((nonce_hex, _)) => nonce_hex,
            None => return Ok(()),
        };
        let mut sessions = self.lock_sessions()?;
        sessions.remove(nonce_hex);
        Ok(())
    }

    fn tag_for(&self, nonce_hex: &str, identifier: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("Failed to key session HMAC: {}", e))?;
        mac.update(nonce_hex.as_bytes());
        mac.update(b".");
        mac.update(identifier.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(hex(&tag))
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<String, SessionEntry>>> {
        self.sessions
            .lock()
            .map_err(|_| FaceBankError::Storage("Session table lock poisoned".into()))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Equal length and content, without an early exit on the first differing
/// byte.
fn slices_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
