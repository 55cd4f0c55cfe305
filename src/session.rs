//! Session binding for authenticated principals.
//!
//! The session is addressed by a cookie. Lookups never create a session; a
//! session is only created when a principal is bound, and binding always
//! issues a fresh id.

use async_trait::async_trait;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde_json::Value;
use std::{collections::HashMap, fmt, time::Duration};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};

use crate::engine::Principal;

/// Session attribute holding the bound principal.
pub const NTLM_USER_ACCOUNT: &str = "ntlmUserAccount";

pub const DEFAULT_SESSION_COOKIE: &str = "ntlm_session";

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 32 random bytes, base64url without padding.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = [0u8; 32];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Session ids are bearer secrets.
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(***)")
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to generate session id: {0}")]
    Random(#[from] rand::Error),
    #[error("failed to encode session attribute: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session store unavailable: {0}")]
    Store(String),
}

/// Result of [`SessionBinder::bind`].
#[derive(Clone, Debug)]
pub struct Binding {
    pub session: SessionId,
    /// `true` when the id changed and the caller needs a new cookie.
    pub created: bool,
}

#[async_trait]
pub trait SessionBinder: Send + Sync {
    /// The principal bound to `session`, if any. Never creates a session.
    async fn lookup(&self, session: Option<&SessionId>) -> Result<Option<Principal>, SessionError>;

    /// Store `principal` in `session`. Implementations should issue a new id
    /// on every bind so a pre-authentication id never carries a principal.
    async fn bind(
        &self,
        session: Option<&SessionId>,
        principal: &Principal,
    ) -> Result<Binding, SessionError>;
}

pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SESSION_CAPACITY: usize = 4096;

struct Session {
    attributes: HashMap<String, Value>,
    last_seen: Instant,
}

/// Process-local session store.
///
/// Sessions expire after `idle_ttl` without a lookup or bind. When the store
/// is full, binding evicts the least recently seen session.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    idle_ttl: Duration,
    capacity: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl: DEFAULT_SESSION_IDLE_TTL,
            capacity: DEFAULT_SESSION_CAPACITY,
        }
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub async fn invalidate(&self, session: &SessionId) {
        self.sessions.lock().await.remove(session);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionBinder for MemorySessionStore {
    async fn lookup(&self, id: Option<&SessionId>) -> Result<Option<Principal>, SessionError> {
        let Some(id) = id else {
            return Ok(None);
        };
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };
        if session.last_seen.elapsed() >= self.idle_ttl {
            sessions.remove(id);
            return Ok(None);
        }
        session.last_seen = Instant::now();

        match session.attributes.get(NTLM_USER_ACCOUNT) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn bind(
        &self,
        session: Option<&SessionId>,
        principal: &Principal,
    ) -> Result<Binding, SessionError> {
        let value = serde_json::to_value(principal)?;
        let id = SessionId::generate()?;

        let mut sessions = self.sessions.lock().await;
        let idle_ttl = self.idle_ttl;
        sessions.retain(|_, entry| entry.last_seen.elapsed() < idle_ttl);

        // Rotate: attributes move to the new id, the old id stops working.
        let mut attributes = session
            .and_then(|old| sessions.remove(old))
            .map(|old| old.attributes)
            .unwrap_or_default();
        attributes.insert(NTLM_USER_ACCOUNT.to_string(), value);

        while sessions.len() >= self.capacity {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
        }

        sessions.insert(
            id.clone(),
            Session {
                attributes,
                last_seen: Instant::now(),
            },
        );

        Ok(Binding {
            session: id,
            created: true,
        })
    }
}

/// Read the session id from the `Cookie` header(s).
pub fn extract_session_id(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            let val = parts.next()?.trim();
            (key == cookie_name && !val.is_empty()).then(|| SessionId::new(val))
        })
}

/// Build an `HttpOnly` cookie carrying the session id.
///
/// # Errors
/// Returns an error if the cookie name contains invalid header characters.
pub fn session_cookie(
    cookie_name: &str,
    session: &SessionId,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{cookie_name}={}; Path=/; HttpOnly; SameSite=Lax",
        session.as_str()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_never_creates_a_session() {
        let store = MemorySessionStore::new();
        assert_eq!(store.lookup(None).await.unwrap(), None);
        assert_eq!(
            store.lookup(Some(&SessionId::new("unknown"))).await.unwrap(),
            None
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn bind_creates_session_lazily() {
        let store = MemorySessionStore::new();
        let principal = Principal::new("alice").with_domain("CORP");

        let binding = store.bind(None, &principal).await.unwrap();
        assert!(binding.created);
        assert_eq!(store.len().await, 1);

        let found = store.lookup(Some(&binding.session)).await.unwrap();
        assert_eq!(found, Some(principal));
    }

    #[tokio::test]
    async fn bind_rotates_existing_session() {
        let store = MemorySessionStore::new();
        let first = store.bind(None, &Principal::new("alice")).await.unwrap();

        let second = store
            .bind(Some(&first.session), &Principal::new("bob"))
            .await
            .unwrap();
        assert!(second.created);
        assert_ne!(second.session, first.session);
        assert_eq!(store.len().await, 1);

        assert_eq!(store.lookup(Some(&first.session)).await.unwrap(), None);
        let found = store.lookup(Some(&second.session)).await.unwrap();
        assert_eq!(found.map(|p| p.username), Some("bob".to_string()));
    }

    #[tokio::test]
    async fn bind_with_unknown_id_creates_fresh_session() {
        let store = MemorySessionStore::new();
        let stale = SessionId::new("expired");
        let binding = store.bind(Some(&stale), &Principal::new("alice")).await.unwrap();
        assert!(binding.created);
        assert_ne!(binding.session, stale);
    }

    #[tokio::test]
    async fn invalidate_drops_principal() {
        let store = MemorySessionStore::new();
        let binding = store.bind(None, &Principal::new("alice")).await.unwrap();
        store.invalidate(&binding.session).await;
        assert_eq!(store.lookup(Some(&binding.session)).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let store = MemorySessionStore::new().with_idle_ttl(Duration::from_secs(60));
        let binding = store.bind(None, &Principal::new("alice")).await.unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(store.lookup(Some(&binding.session)).await.unwrap().is_some());

        // The lookup above refreshed the idle clock.
        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(store.lookup(Some(&binding.session)).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.lookup(Some(&binding.session)).await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn bind_prunes_expired_sessions() {
        let store = MemorySessionStore::new().with_idle_ttl(Duration::from_secs(60));
        for user in ["alice", "bob", "carol"] {
            store.bind(None, &Principal::new(user)).await.unwrap();
        }
        assert_eq!(store.len().await, 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        store.bind(None, &Principal::new("dave")).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn repeated_binds_stay_within_capacity() {
        let store = MemorySessionStore::new();
        for _ in 0..10_000 {
            store.bind(None, &Principal::new("svc")).await.unwrap();
        }
        assert_eq!(store.len().await, DEFAULT_SESSION_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn full_store_evicts_least_recently_seen() {
        let store = MemorySessionStore::new().with_capacity(2);
        let alice = store.bind(None, &Principal::new("alice")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let bob = store.bind(None, &Principal::new("bob")).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.lookup(Some(&alice.session)).await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(1)).await;

        let carol = store.bind(None, &Principal::new("carol")).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.lookup(Some(&bob.session)).await.unwrap(), None);
        assert!(store.lookup(Some(&alice.session)).await.unwrap().is_some());
        assert!(store.lookup(Some(&carol.session)).await.unwrap().is_some());
    }

    #[test]
    fn generated_ids_are_unique_and_url_safe() {
        let first = SessionId::generate().unwrap();
        let second = SessionId::generate().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 43);
        assert!(first
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(format!("{first:?}"), "SessionId(***)");
    }

    #[test]
    fn extract_session_id_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; ntlm_session=abc123; other=1"),
        );
        assert_eq!(
            extract_session_id(&headers, DEFAULT_SESSION_COOKIE),
            Some(SessionId::new("abc123"))
        );
        assert_eq!(extract_session_id(&headers, "missing"), None);
    }

    #[test]
    fn extract_session_id_ignores_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("ntlm_session="));
        assert_eq!(extract_session_id(&headers, DEFAULT_SESSION_COOKIE), None);
    }

    #[test]
    fn session_cookie_flags() {
        let id = SessionId::new("abc");
        let cookie = session_cookie(DEFAULT_SESSION_COOKIE, &id, true).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "ntlm_session=abc; Path=/; HttpOnly; SameSite=Lax; Secure"
        );
        let cookie = session_cookie(DEFAULT_SESSION_COOKIE, &id, false).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Secure"));
    }
}
