//! Browser session store.
//!
//! Each session owns one append-only transcript, kept in process memory for
//! the duration of the interactive session. Session identity travels in the
//! `compass_session` cookie; the server issues a v4 UUID on first contact.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use compass_core::Transcript;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "compass_session";

/// Cap on concurrently tracked sessions. Guards the map; a live session's
/// transcript is never truncated, only whole idle sessions are dropped.
const MAX_SESSIONS: usize = 512;

struct SessionEntry {
    transcript: Transcript,
    last_active: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session if it does not exist and mark it active.
    pub async fn ensure(&self, id: Uuid) {
        let mut sessions = self.inner.write().await;
        let now = Utc::now();
        sessions
            .entry(id)
            .and_modify(|entry| entry.last_active = now)
            .or_insert_with(|| SessionEntry { transcript: Transcript::new(), last_active: now });
        prune(&mut sessions, id);
    }

    pub async fn snapshot(&self, id: Uuid) -> Transcript {
        let sessions = self.inner.read().await;
        sessions.get(&id).map(|entry| entry.transcript.clone()).unwrap_or_default()
    }

    pub async fn append_user(&self, id: Uuid, content: &str) {
        let mut sessions = self.inner.write().await;
        let now = Utc::now();
        let entry = sessions
            .entry(id)
            .or_insert_with(|| SessionEntry { transcript: Transcript::new(), last_active: now });
        entry.last_active = now;
        entry.transcript.push_user(content);
    }

    pub async fn append_assistant(&self, id: Uuid, content: &str) {
        let mut sessions = self.inner.write().await;
        let now = Utc::now();
        let entry = sessions
            .entry(id)
            .or_insert_with(|| SessionEntry { transcript: Transcript::new(), last_active: now });
        entry.last_active = now;
        entry.transcript.push_assistant(content);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    #[cfg(test)]
    async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.contains_key(&id)
    }
}

fn prune(sessions: &mut HashMap<Uuid, SessionEntry>, keep: Uuid) {
    while sessions.len() > MAX_SESSIONS {
        let oldest = sessions
            .iter()
            .filter(|(id, _)| **id != keep)
            .min_by_key(|(_, entry)| entry.last_active)
            .map(|(id, _)| *id);
        match oldest {
            Some(id) => {
                sessions.remove(&id);
            }
            None => break,
        }
    }
}

/// Extract the session id from the request's cookies, if any.
pub fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get_all(COOKIE).iter().find_map(|value| {
        let raw = value.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let id = pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('=')?;
            Uuid::parse_str(id).ok()
        })
    })
}

/// Resolve or issue the session for a request. Returns the session id and,
/// when a new id was issued, the `Set-Cookie` value to attach.
pub async fn establish(
    sessions: &SessionStore,
    headers: &HeaderMap,
) -> (Uuid, Option<HeaderValue>) {
    match session_from_headers(headers) {
        Some(id) => {
            sessions.ensure(id).await;
            (id, None)
        }
        None => {
            let id = Uuid::new_v4();
            sessions.ensure(id).await;
            let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
            (id, HeaderValue::from_str(&cookie).ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    use super::{establish, session_from_headers, SessionStore, MAX_SESSIONS, SESSION_COOKIE};

    #[tokio::test]
    async fn transcript_grows_append_only_per_session() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.ensure(id).await;

        store.append_user(id, "Does our plan comply with HIPAA?").await;
        store.append_assistant(id, "Mostly, with two gaps.").await;

        let transcript = store.snapshot(id).await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].content, "Does our plan comply with HIPAA?");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.append_user(first, "question one").await;
        store.append_user(second, "question two").await;

        assert_eq!(store.snapshot(first).await.len(), 1);
        assert_eq!(store.snapshot(second).await.len(), 1);
        assert_eq!(store.snapshot(Uuid::new_v4()).await.len(), 0);
    }

    #[test]
    fn cookie_parsing_finds_the_session_among_other_cookies() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}; lang=en"))
                .expect("header value"),
        );

        assert_eq!(session_from_headers(&headers), Some(id));
    }

    #[test]
    fn malformed_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("compass_session=not-a-uuid"),
        );

        assert_eq!(session_from_headers(&headers), None);
    }

    #[tokio::test]
    async fn establish_issues_a_cookie_only_for_new_sessions() {
        let store = SessionStore::new();
        let headers = HeaderMap::new();

        let (id, cookie) = establish(&store, &headers).await;
        let cookie = cookie.expect("new session should set a cookie");
        let cookie = cookie.to_str().expect("cookie should be ascii");
        assert!(cookie.contains(&id.to_string()));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let mut returning = HeaderMap::new();
        returning.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE}={id}")).expect("header value"),
        );
        let (same, reissued) = establish(&store, &returning).await;
        assert_eq!(same, id);
        assert!(reissued.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn garbage_cookie_gets_a_fresh_session_and_cookie() {
        let store = SessionStore::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("compass_session=definitely-not-a-uuid"),
        );

        let (id, cookie) = establish(&store, &headers).await;

        let cookie = cookie.expect("unparseable cookie should be replaced");
        assert!(cookie.to_str().expect("ascii cookie").contains(&id.to_string()));
        assert!(store.contains(id).await);
    }

    #[tokio::test]
    async fn pruning_drops_the_least_recently_active_session() {
        let store = SessionStore::new();
        let first = Uuid::new_v4();
        store.append_user(first, "keep me").await;

        for _ in 0..MAX_SESSIONS - 1 {
            store.ensure(Uuid::new_v4()).await;
        }
        assert_eq!(store.len().await, MAX_SESSIONS);

        // Touch the oldest session, then push the map over the cap. The
        // evicted entry must be an idle one, never the just-touched
        // transcript and never the newcomer.
        store.ensure(first).await;
        let newcomer = Uuid::new_v4();
        store.ensure(newcomer).await;

        assert_eq!(store.len().await, MAX_SESSIONS);
        assert!(store.contains(first).await);
        assert!(store.contains(newcomer).await);
        assert_eq!(store.snapshot(first).await.len(), 1);
    }
}
