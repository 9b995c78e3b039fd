//! Session registry: opaque keys handed out in cookies, mapped to users.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use thingsync_core::{SessionKey, UserId};
use tracing::debug;

/// Random bytes behind each key; 24 bytes encode to 32 characters.
const KEY_BYTES: usize = 24;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub key: SessionKey,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn exists(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fresh key from the OS-seeded CSPRNG, URL-safe base64.
pub fn random_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

type KeyGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// In-memory session map. Sessions are never evicted; expiry is checked by
/// [`SessionRegistry::resolve`].
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    lifetime: Duration,
    generate: KeyGenerator,
}

impl SessionRegistry {
    pub fn new(lifetime: Duration) -> Self {
        Self::with_generator(lifetime, random_key)
    }

    /// Registry with a custom key source.
    pub fn with_generator<F>(lifetime: Duration, generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
            generate: Box::new(generate),
        }
    }

    /// Issue a session for `user_id` under a key no live session holds.
    pub fn create(&self, user_id: UserId) -> Session {
        self.create_at(user_id, Utc::now())
    }

    pub fn create_at(&self, user_id: UserId, now: DateTime<Utc>) -> Session {
        let mut sessions = self.sessions.write();
        let key = loop {
            let candidate = SessionKey::from_raw((self.generate)());
            if !candidate.is_empty() && !sessions.contains_key(&candidate) {
                break candidate;
            }
            debug!("session key collision, regenerating");
        };
        let session = Session {
            key: key.clone(),
            user_id,
            expires_at: now
                .checked_add_signed(self.lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let _ = sessions.insert(key, session.clone());
        session
    }

    /// Look up a key. Unknown keys yield an empty session.
    pub fn get(&self, key: &str) -> Session {
        self.sessions
            .read()
            .get(&SessionKey::from_raw(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Look up a key and treat expired sessions as absent.
    pub fn resolve(&self, key: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = self.get(key);
        (session.exists() && !session.is_expired(now)).then_some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    fn scripted(keys: &[&str]) -> impl Fn() -> String + Send + Sync + 'static {
        let queue = Mutex::new(keys.iter().map(|k| (*k).to_string()).collect::<VecDeque<_>>());
        move || queue.lock().unwrap().pop_front().unwrap_or_else(random_key)
    }

    #[test]
    fn random_keys_are_32_url_safe_chars() {
        let key = random_key();
        assert_eq!(key.len(), 32);
        assert!(
            key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "got: {key}"
        );
        assert_ne!(random_key(), key);
    }

    #[test]
    fn create_then_get() {
        let registry = SessionRegistry::new(Duration::days(14));
        let session = registry.create(7);
        assert!(session.exists());
        assert_eq!(registry.get(session.key.as_str()), session);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_key_is_empty_session() {
        let registry = SessionRegistry::new(Duration::days(1));
        let session = registry.get("nope");
        assert!(!session.exists());
        assert_eq!(session.user_id, 0);
    }

    #[test]
    fn colliding_key_is_regenerated() {
        let registry =
            SessionRegistry::with_generator(Duration::hours(1), scripted(&["dup", "dup", "fresh"]));
        let first = registry.create(1);
        let second = registry.create(2);
        assert_eq!(first.key.as_str(), "dup");
        assert_eq!(second.key.as_str(), "fresh");
        assert_eq!(registry.get("dup").user_id, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn empty_generated_key_is_skipped() {
        let registry = SessionRegistry::with_generator(Duration::hours(1), scripted(&["", "k"]));
        assert_eq!(registry.create(1).key.as_str(), "k");
    }

    #[test]
    fn expiry_follows_lifetime() {
        let registry = SessionRegistry::new(Duration::seconds(60));
        let now = Utc::now();
        let session = registry.create_at(3, now);
        assert_eq!(session.expires_at, now + Duration::seconds(60));

        assert!(registry.resolve(session.key.as_str(), now).is_some());
        assert!(
            registry
                .resolve(session.key.as_str(), now + Duration::seconds(61))
                .is_none()
        );
        // Expired sessions are still stored.
        assert!(registry.get(session.key.as_str()).exists());
    }

    #[test]
    fn resolve_rejects_unknown() {
        let registry = SessionRegistry::new(Duration::days(1));
        assert!(registry.resolve("", Utc::now()).is_none());
        assert!(registry.resolve("missing", Utc::now()).is_none());
    }
}
