//! Server-side sessions keyed by an opaque cookie id.
//!
//! A session is either anonymous (no record, or a record without principal)
//! or authenticated. Records are only ever written whole.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{BoxError, Error};
use crate::types::{Principal, SessionId};

pub const DEFAULT_SESSION_COOKIE: &str = "__gateway_session";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::minutes(30);
pub const DEFAULT_MAX_AGE: Duration = Duration::days(7);

/// Persisted session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(default)]
    pub principal: Option<Principal>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
}

impl Session {
    /// When the record stops being valid under the given policy.
    #[must_use]
    pub fn expires_at(&self, idle_timeout: Duration, max_age: Duration) -> OffsetDateTime {
        (self.last_seen_at + idle_timeout).min(self.created_at + max_age)
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime, idle_timeout: Duration, max_age: Duration) -> bool {
        now >= self.expires_at(idle_timeout, max_age)
    }
}

/// Consumer-provided session persistence.
///
/// Records are opaque strings; the [`SessionManager`] owns the encoding.
/// Implementations must serialize writes to the same id (last write wins) and
/// should not block reads of other ids while doing so.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisSessions {
///     async fn load(&self, id: &SessionId) -> Result<Option<String>, BoxError> {
///         Ok(self.conn().await?.get(id.as_str()).await?)
///     }
///
///     async fn save(&self, id: &SessionId, data: String, expires_at: OffsetDateTime)
///         -> Result<(), BoxError> {
///         let ttl = (expires_at - OffsetDateTime::now_utc()).whole_seconds().max(1);
///         Ok(self.conn().await?.set_ex(id.as_str(), data, ttl as u64).await?)
///     }
///
///     async fn delete(&self, id: &SessionId) -> Result<(), BoxError> {
///         Ok(self.conn().await?.del(id.as_str()).await?)
///     }
///
///     async fn delete_expired(&self, _now: OffsetDateTime) -> Result<usize, BoxError> {
///         Ok(0) // Redis expires keys itself
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    fn load(&self, id: &SessionId) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    /// Replace the record for `id`. `expires_at` lets stores evict on their own.
    fn save(
        &self,
        id: &SessionId,
        data: String,
        expires_at: OffsetDateTime,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    fn delete(&self, id: &SessionId) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Drop every record whose `expires_at` is not after `now`. Returns how many.
    fn delete_expired(
        &self,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<usize, BoxError>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for SessionStore (needed for Arc<dyn>).
trait SessionStoreDyn: Send + Sync {
    fn load_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<Option<String>, BoxError>>;

    fn save_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        data: String,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    fn delete_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), BoxError>>;

    fn delete_expired_dyn(&self, now: OffsetDateTime) -> BoxFuture<'_, Result<usize, BoxError>>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn load_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<Option<String>, BoxError>> {
        Box::pin(self.load(id))
    }

    fn save_dyn<'a>(
        &'a self,
        id: &'a SessionId,
        data: String,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.save(id, data, expires_at))
    }

    fn delete_dyn<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.delete(id))
    }

    fn delete_expired_dyn(&self, now: OffsetDateTime) -> BoxFuture<'_, Result<usize, BoxError>> {
        Box::pin(self.delete_expired(now))
    }
}

#[derive(Debug)]
struct StoredSession {
    data: String,
    expires_at: OffsetDateTime,
}

/// Process-local [`SessionStore`]. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, StoredSession>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<String>, BoxError> {
        Ok(self.sessions.get(id).map(|entry| entry.data.clone()))
    }

    async fn save(
        &self,
        id: &SessionId,
        data: String,
        expires_at: OffsetDateTime,
    ) -> Result<(), BoxError> {
        self.sessions
            .insert(id.clone(), StoredSession { data, expires_at });
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), BoxError> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<usize, BoxError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, stored| stored.expires_at > now);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// Owns session lifecycle: establish, read, touch, clear, expire.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStoreDyn>,
    cookie_name: Arc<str>,
    idle_timeout: Duration,
    max_age: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_name", &self.cookie_name)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(store: impl SessionStore) -> Self {
        Self {
            store: Arc::new(store),
            cookie_name: DEFAULT_SESSION_COOKIE.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        let name: String = name.into();
        self.cookie_name = name.into();
        self
    }

    /// Sessions idle for longer than this read as anonymous.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Absolute lifetime measured from session creation.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Attach `principal` to the browser's session, replacing any previous one.
    ///
    /// Every call issues a fresh id; the previous record, if any, is deleted.
    /// A live previous session only contributes its creation time, so the
    /// absolute lifetime is not extended by logging in again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the record cannot be written.
    pub async fn establish(
        &self,
        current: Option<&SessionId>,
        principal: Principal,
    ) -> Result<SessionId, Error> {
        let now = OffsetDateTime::now_utc();
        let previous = match current {
            Some(id) => self.load_live(id, now).await,
            None => None,
        };

        let session = Session {
            id: SessionId::generate(),
            principal: Some(principal),
            created_at: previous.as_ref().map_or(now, |s| s.created_at),
            last_seen_at: now,
        };
        self.write(&session).await?;

        if let Some(old) = current {
            self.discard(old).await;
        }
        Ok(session.id)
    }

    /// Remove the principal by destroying the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store refuses the delete.
    pub async fn clear(&self, id: &SessionId) -> Result<(), Error> {
        self.store
            .delete_dyn(id)
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    /// The principal of a live session, if any. Never fails: store errors,
    /// undecodable and expired records all read as anonymous.
    pub async fn current_principal(&self, id: &SessionId) -> Option<Principal> {
        self.session(id).await?.principal
    }

    /// The full live record, if any.
    pub async fn session(&self, id: &SessionId) -> Option<Session> {
        self.load_live(id, OffsetDateTime::now_utc()).await
    }

    /// Refresh `last_seen_at` of a live session. Returns the refreshed record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the record cannot be written.
    pub async fn touch(&self, id: &SessionId) -> Result<Option<Session>, Error> {
        let now = OffsetDateTime::now_utc();
        let Some(mut session) = self.load_live(id, now).await else {
            return Ok(None);
        };
        session.last_seen_at = now;
        self.write(&session).await?;
        Ok(Some(session))
    }

    /// Delete every expired record from the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails.
    pub async fn purge_expired(&self) -> Result<usize, Error> {
        self.store
            .delete_expired_dyn(OffsetDateTime::now_utc())
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    async fn write(&self, session: &Session) -> Result<(), Error> {
        let data = serde_json::to_string(session)
            .map_err(|e| Error::Store(format!("encode session: {e}")))?;
        let expires_at = session.expires_at(self.idle_timeout, self.max_age);
        self.store
            .save_dyn(&session.id, data, expires_at)
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    async fn load_live(&self, id: &SessionId, now: OffsetDateTime) -> Option<Session> {
        let data = match self.store.load_dyn(id).await {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed");
                return None;
            }
        };

        let session = match serde_json::from_str::<Session>(&data) {
            Ok(session) if session.id == *id => session,
            Ok(_) => {
                tracing::warn!("Session record stored under a different id; discarding");
                self.discard(id).await;
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable session record; discarding");
                self.discard(id).await;
                return None;
            }
        };

        if session.is_expired(now, self.idle_timeout, self.max_age) {
            tracing::debug!(session_id = %id, "Session expired");
            self.discard(id).await;
            return None;
        }

        Some(session)
    }

    async fn discard(&self, id: &SessionId) {
        if let Err(e) = self.store.delete_dyn(id).await {
            tracing::warn!(error = %e, "Failed to delete stale session");
        }
    }
}
