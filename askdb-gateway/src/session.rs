//! Sessions: cookie-keyed state that owns a database handle.
//!
//! The store is a `tokio::sync::RwLock<HashMap>`. Handlers clone the
//! `Arc<dyn Database>` out of a session and drop the lock before any I/O.

use crate::database::Database;
use crate::performance::{PerformanceConfig, PerformanceUpdate};
use crate::routes::AppState;
use askdb_common::{Error, Result};
use askdb_memory::SchemaMemory;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "askdb_session";

/// Session identifier attached to each `/api` request by [`session_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-caller server-side state.
pub struct Session {
    pub id: String,
    pub database: Option<Arc<dyn Database>>,
    pub performance: PerformanceConfig,
    pub created_at: Instant,
    pub last_access: Instant,
}

impl Session {
    fn new(id: String, performance: PerformanceConfig) -> Self {
        let now = Instant::now();
        Self {
            id,
            database: None,
            performance,
            created_at: now,
            last_access: now,
        }
    }
}

/// Counts reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active: usize,
    pub connected: usize,
}

// ============================================================================
// Store
// ============================================================================

/// In-process session table.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    defaults: PerformanceConfig,
}

impl SessionStore {
    pub fn new(ttl: Duration, defaults: PerformanceConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            defaults,
        }
    }

    /// Refresh a known session, or create one under a fresh ID.
    ///
    /// Returns the session ID and whether it was newly created.
    pub async fn touch_or_create(&self, presented: Option<&str>) -> (String, bool) {
        let mut sessions = self.sessions.write().await;
        if let Some(id) = presented {
            if let Some(session) = sessions.get_mut(id) {
                session.last_access = Instant::now();
                return (id.to_string(), false);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        sessions.insert(id.clone(), Session::new(id.clone(), self.defaults.clone()));
        tracing::debug!(session_id = %id, "Created session");
        (id, true)
    }

    /// The session's database handle, or `NoConnection`.
    pub async fn database(&self, id: &str) -> Result<Arc<dyn Database>> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|s| s.database.clone())
            .ok_or(Error::NoConnection)
    }

    /// Attach a handle, returning the one it replaces.
    pub async fn attach(&self, id: &str, database: Arc<dyn Database>) -> Option<Arc<dyn Database>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id.to_string(), self.defaults.clone()));
        session.last_access = Instant::now();
        session.database.replace(database)
    }

    /// Detach the session's handle, if any.
    pub async fn detach(&self, id: &str) -> Option<Arc<dyn Database>> {
        self.sessions
            .write()
            .await
            .get_mut(id)
            .and_then(|s| s.database.take())
    }

    pub async fn performance(&self, id: &str) -> PerformanceConfig {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| s.performance.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Validate and store a partial update; on error nothing is applied.
    pub async fn update_performance(
        &self,
        id: &str,
        update: &PerformanceUpdate,
    ) -> Result<PerformanceConfig> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id.to_string(), self.defaults.clone()));
        let next = session
            .performance
            .apply(update)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        session.performance = next.clone();
        Ok(next)
    }

    /// Remove sessions idle past the TTL and hand them back for cleanup.
    pub async fn purge_expired(&self) -> Vec<Session> {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_access) > self.ttl)
            .map(|s| s.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions = self.sessions.read().await;
        SessionStats {
            active: sessions.len(),
            connected: sessions.values().filter(|s| s.database.is_some()).count(),
        }
    }

    /// Drop every session, closing its handle. Used on shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<Session> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            if let Some(db) = session.database {
                db.close().await;
            }
        }
    }
}

/// Close handles and drop stored schema vectors of expired sessions.
pub async fn release_sessions(expired: Vec<Session>, memory: Option<SchemaMemory>) {
    for session in expired {
        tracing::info!(session_id = %session.id, "Session expired");
        if let Some(db) = session.database {
            db.close().await;
        }
        if let Some(memory) = &memory {
            if let Err(e) = memory.forget_session(&session.id).await {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to drop session vectors");
            }
        }
    }
}

// ============================================================================
// Cookie
// ============================================================================

/// Encodes and verifies the `askdb_session` cookie.
///
/// With a secret the value is `<id>.<hex hmac-sha256(id)>`; without one it is
/// the bare session ID.
#[derive(Clone)]
pub struct SessionCookie {
    secret: Option<Arc<String>>,
    secure: bool,
}

impl SessionCookie {
    pub fn new(secret: Option<&str>, secure: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(|s| Arc::new(s.to_string())),
            secure,
        }
    }

    fn sign(secret: &str, id: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(id.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Cookie value for a session ID.
    pub fn encode(&self, id: &str) -> String {
        match self.secret.as_deref().and_then(|secret| Self::sign(secret, id)) {
            Some(signature) => format!("{}.{}", id, signature),
            None => id.to_string(),
        }
    }

    /// Session ID from a cookie value; `None` if unsigned, tampered or malformed.
    pub fn decode(&self, value: &str) -> Option<String> {
        let id = match self.secret.as_deref() {
            Some(secret) => {
                let (id, signature) = value.rsplit_once('.')?;
                let expected = hex::decode(signature).ok()?;
                let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
                mac.update(id.as_bytes());
                mac.verify_slice(&expected).ok()?;
                id
            }
            None => value,
        };
        uuid::Uuid::parse_str(id).ok().map(|_| id.to_string())
    }

    /// Session ID presented in the request's `Cookie` headers.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|c| c.ok())
            .filter(|c| c.name() == SESSION_COOKIE_NAME)
            .find_map(|c| self.decode(c.value()))
    }

    /// `Set-Cookie` header value issuing `id`.
    pub fn set_cookie(&self, id: &str) -> String {
        Cookie::build((SESSION_COOKIE_NAME, self.encode(id)))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
            .to_string()
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolve (or issue) the caller's session and purge expired ones.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let expired = state.sessions.purge_expired().await;
    if !expired.is_empty() {
        let memory = state.schema_memory.clone();
        tokio::spawn(release_sessions(expired, memory));
    }

    let presented = state.cookies.from_headers(request.headers());
    let (id, created) = state.sessions.touch_or_create(presented.as_deref()).await;
    request.extensions_mut().insert(SessionId(id.clone()));

    let mut response = next.run(request).await;

    if created {
        if let Ok(value) = HeaderValue::from_str(&state.cookies.set_cookie(&id)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ColumnInfo, QueryOutcome};
    use async_trait::async_trait;

    struct NullDatabase;

    #[async_trait]
    impl Database for NullDatabase {
        fn database_name(&self) -> &str {
            "shop"
        }
        fn host(&self) -> &str {
            "localhost"
        }
        async fn connection_id(&self) -> Result<u64> {
            Ok(1)
        }
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn describe_table(&self, _table: &str) -> Result<Vec<ColumnInfo>> {
            Ok(vec![])
        }
        async fn explain(&self, _sql: &str) -> Result<()> {
            Ok(())
        }
        async fn execute(&self, _sql: &str, _max_rows: usize) -> Result<QueryOutcome> {
            Ok(QueryOutcome::default())
        }
        async fn close(&self) {}
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), PerformanceConfig::default())
    }

    #[tokio::test]
    async fn unknown_ids_get_a_fresh_session() {
        let store = store();
        let (id, created) = store.touch_or_create(Some("not-a-session")).await;
        assert!(created);
        assert_ne!(id, "not-a-session");

        let (again, created) = store.touch_or_create(Some(&id)).await;
        assert!(!created);
        assert_eq!(again, id);
    }

    #[tokio::test]
    async fn attach_detach_lifecycle() {
        let store = store();
        let (id, _) = store.touch_or_create(None).await;
        assert!(matches!(store.database(&id).await, Err(Error::NoConnection)));

        assert!(store.attach(&id, Arc::new(NullDatabase)).await.is_none());
        assert!(store.attach(&id, Arc::new(NullDatabase)).await.is_some());
        assert_eq!(store.stats().await, SessionStats { active: 1, connected: 1 });

        assert!(store.detach(&id).await.is_some());
        assert!(store.detach(&id).await.is_none());
        assert!(matches!(store.database(&id).await, Err(Error::NoConnection)));
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let store = store();
        let (id, _) = store.touch_or_create(None).await;
        store.attach(&id, Arc::new(NullDatabase)).await;

        assert!(store.purge_expired().await.is_empty());

        let later = Instant::now() + Duration::from_secs(120);
        let expired = store.purge_expired_at(later).await;
        assert_eq!(expired.len(), 1);
        assert!(expired[0].database.is_some());
        assert_eq!(store.stats().await.active, 0);
    }

    #[tokio::test]
    async fn rejected_update_leaves_config_untouched() {
        let store = store();
        let (id, _) = store.touch_or_create(None).await;
        let before = store.performance(&id).await;

        let bad = PerformanceUpdate {
            use_faster_model: Some(true),
            max_results: Some(0),
            ..Default::default()
        };
        let err = store.update_performance(&id, &bad).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(store.performance(&id).await, before);
    }

    #[test]
    fn signed_cookie_round_trip() {
        let cookies = SessionCookie::new(Some("s3cret"), false);
        let id = uuid::Uuid::new_v4().to_string();
        let value = cookies.encode(&id);
        assert!(value.starts_with(&format!("{}.", id)));
        assert_eq!(cookies.decode(&value), Some(id.clone()));
    }

    #[test]
    fn tampered_or_unsigned_cookie_is_ignored() {
        let cookies = SessionCookie::new(Some("s3cret"), false);
        let id = uuid::Uuid::new_v4().to_string();
        let other = uuid::Uuid::new_v4().to_string();
        let value = cookies.encode(&id);
        let signature = value.rsplit_once('.').unwrap().1;

        assert_eq!(cookies.decode(&id), None);
        assert_eq!(cookies.decode(&format!("{}.{}", other, signature)), None);
        assert_eq!(cookies.decode(&format!("{}.zz", id)), None);

        let foreign = SessionCookie::new(Some("other"), false);
        assert_eq!(foreign.decode(&value), None);
    }

    #[test]
    fn unsigned_mode_requires_uuid() {
        let cookies = SessionCookie::new(None, false);
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(cookies.encode(&id), id);
        assert_eq!(cookies.decode(&id), Some(id.clone()));
        assert_eq!(cookies.decode("garbage"), None);
    }

    #[test]
    fn set_cookie_attributes() {
        let header = SessionCookie::new(None, true).set_cookie("abc");
        assert!(header.starts_with("askdb_session=abc"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Secure"));
    }

    #[test]
    fn reads_cookie_among_others() {
        let cookies = SessionCookie::new(None, false);
        let id = uuid::Uuid::new_v4().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {}={}", SESSION_COOKIE_NAME, id)
                .parse()
                .unwrap(),
        );
        assert_eq!(cookies.from_headers(&headers), Some(id));
    }
}
