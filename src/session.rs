//! Conversation state storage with time-based expiry.
//!
//! The [`SessionStore`] trait is the seam between the HTTP layer and the
//! storage backend. [`InMemorySessionStore`] is the only implementation: a
//! `HashMap` of sessions plus a min-heap of expiry deadlines behind a
//! `std::sync::RwLock`.
//!
//! # Expiry
//!
//! Expiry is lazy. A session whose `last_activity` is more than `ttl` in the
//! past is evicted the next time it is read with [`SessionStore::get`].
//! [`SessionStore::update`] additionally drains any heap entries whose
//! deadline has passed, so abandoned sessions do not accumulate. There is no
//! background sweeper.
//!
//! # Concurrency
//!
//! Individual operations are atomic, but a read → process → update cycle is
//! not serialized per session id. Two concurrent requests for the same
//! session are last-write-wins.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{ConversationStage, Details, Intent, Session, Turn};

/// Default session lifetime: 30 minutes.
pub const DEFAULT_TTL_MS: i64 = 30 * 60 * 1000;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and the CLI.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fields to shallow-merge into a session. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub conversation_stage: Option<ConversationStage>,
    pub last_intent: Option<Intent>,
    pub case_details: Option<Details>,
    pub user_info: Option<Details>,
    pub conversation_history: Option<Vec<Turn>>,
    pub lead_score: Option<i32>,
}

impl SessionPatch {
    /// A patch that overwrites every mergeable field with `session`'s values.
    pub fn from_session(session: Session) -> Self {
        Self {
            conversation_stage: Some(session.conversation_stage),
            last_intent: session.last_intent,
            case_details: Some(session.case_details),
            user_info: Some(session.user_info),
            conversation_history: Some(session.conversation_history),
            lead_score: session.lead_score,
        }
    }

    fn apply(self, session: &mut Session) {
        if let Some(stage) = self.conversation_stage {
            session.conversation_stage = stage;
        }
        if let Some(intent) = self.last_intent {
            session.last_intent = Some(intent);
        }
        if let Some(details) = self.case_details {
            session.case_details = details;
        }
        if let Some(info) = self.user_info {
            session.user_info = info;
        }
        if let Some(history) = self.conversation_history {
            session.conversation_history = history;
        }
        if let Some(score) = self.lead_score {
            session.lead_score = Some(score);
        }
    }
}

/// Session storage backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session. Expired sessions are evicted and reported as absent.
    ///
    /// Reading does not refresh `last_activity`.
    async fn get(&self, id: &str) -> Option<Session>;

    /// Fetch-or-create `id`, merge `patch` over it, stamp `last_activity`,
    /// store and return the result.
    async fn update(&self, id: &str, patch: SessionPatch) -> Session;

    /// Remove a session. Returns `true` if one was stored.
    async fn delete(&self, id: &str) -> bool;

    /// Number of stored sessions, including expired ones not yet evicted.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    deadlines: BinaryHeap<Reverse<(DateTime<Utc>, String)>>,
}

/// In-memory [`SessionStore`] with lazy TTL eviction.
pub struct InMemorySessionStore {
    inner: RwLock<Inner>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
            clock,
        }
    }

    /// A store with the default 30-minute TTL on the system clock.
    pub fn with_defaults() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_TTL_MS), Arc::new(SystemClock))
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.last_activity) > self.ttl
    }

    /// Saturates at the latest representable instant.
    fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Drop every session whose deadline has passed. Heap entries left behind
    /// by sessions that were refreshed later are discarded without effect.
    fn purge_expired(&self, inner: &mut Inner, now: DateTime<Utc>) {
        while let Some(Reverse((deadline, _))) = inner.deadlines.peek() {
            if *deadline >= now {
                break;
            }
            let Some(Reverse((_, id))) = inner.deadlines.pop() else {
                break;
            };
            let expired = inner
                .sessions
                .get(&id)
                .is_some_and(|s| self.is_expired(s, now));
            if expired {
                inner.sessions.remove(&id);
                tracing::debug!(session_id = %id, "session expired");
            }
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            match inner.sessions.get(id) {
                None => return None,
                Some(s) if !self.is_expired(s, now) => return Some(s.clone()),
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner
            .sessions
            .get(id)
            .is_some_and(|s| self.is_expired(s, now))
        {
            inner.sessions.remove(id);
            tracing::debug!(session_id = %id, "session expired");
        }
        None
    }

    async fn update(&self, id: &str, patch: SessionPatch) -> Session {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        self.purge_expired(&mut inner, now);

        let mut session = match inner.sessions.remove(id) {
            Some(s) if !self.is_expired(&s, now) => s,
            _ => Session::new(id, now),
        };
        patch.apply(&mut session);
        session.last_activity = now;

        inner
            .deadlines
            .push(Reverse((self.deadline(now), id.to_string())));
        inner.sessions.insert(id.to_string(), session.clone());
        session
    }

    async fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sessions.remove(id).is_some()
    }

    async fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    fn store() -> (InMemorySessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = InMemorySessionStore::new(Duration::milliseconds(DEFAULT_TTL_MS), clock.clone());
        (store, clock)
    }

    fn user_turn(clock: &ManualClock, text: &str) -> Turn {
        Turn {
            role: Role::User,
            message: text.to_string(),
            intent: Intent::Greeting,
            confidence: Some(1.0),
            timestamp: clock.now(),
        }
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let (store, _) = store();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_update_creates_default_session() {
        let (store, clock) = store();
        let session = store.update("s1", SessionPatch::default()).await;
        assert_eq!(session.id, "s1");
        assert_eq!(session.conversation_stage, ConversationStage::Initial);
        assert!(session.conversation_history.is_empty());
        assert_eq!(session.created_at, clock.now());
        assert_eq!(store.get("s1").await, Some(session));
    }

    #[tokio::test]
    async fn test_update_merges_only_given_fields() {
        let (store, clock) = store();
        let mut details = Details::new();
        details.insert("injuryType".into(), json!("sprain"));
        store
            .update(
                "s1",
                SessionPatch {
                    case_details: Some(details.clone()),
                    ..Default::default()
                },
            )
            .await;

        clock.advance(Duration::seconds(5));
        let merged = store
            .update(
                "s1",
                SessionPatch {
                    conversation_history: Some(vec![user_turn(&clock, "hi")]),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(merged.case_details, details);
        assert_eq!(merged.conversation_history.len(), 1);
        assert_eq!(merged.last_activity, clock.now());
        assert!(merged.created_at < merged.last_activity);
    }

    #[tokio::test]
    async fn test_get_does_not_refresh_activity() {
        let (store, clock) = store();
        let created = store.update("s1", SessionPatch::default()).await;
        clock.advance(Duration::minutes(10));
        let read = store.get("s1").await.unwrap();
        assert_eq!(read.last_activity, created.last_activity);
    }

    #[tokio::test]
    async fn test_expired_session_is_evicted_and_reset() {
        let (store, clock) = store();
        store
            .update(
                "s1",
                SessionPatch {
                    conversation_history: Some(vec![user_turn(&clock, "hello")]),
                    ..Default::default()
                },
            )
            .await;

        clock.advance(Duration::milliseconds(DEFAULT_TTL_MS + 1));
        assert!(store.get("s1").await.is_none());
        assert_eq!(store.len().await, 0);

        let fresh = store.update("s1", SessionPatch::default()).await;
        assert!(fresh.conversation_history.is_empty());
        assert_eq!(fresh.created_at, clock.now());
    }

    #[tokio::test]
    async fn test_exactly_at_ttl_is_still_live() {
        let (store, clock) = store();
        store.update("s1", SessionPatch::default()).await;
        clock.advance(Duration::milliseconds(DEFAULT_TTL_MS));
        assert!(store.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = InMemorySessionStore::new(Duration::days(400_000_000), clock.clone());

        let session = store.update("s1", SessionPatch::default()).await;
        assert_eq!(session.id, "s1");
        clock.advance(Duration::days(3650));
        assert!(store.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn test_update_purges_other_expired_sessions() {
        let (store, clock) = store();
        store.update("old", SessionPatch::default()).await;
        clock.advance(Duration::minutes(20));
        store.update("recent", SessionPatch::default()).await;
        clock.advance(Duration::minutes(15));

        store.update("new", SessionPatch::default()).await;
        assert_eq!(store.len().await, 2);
        assert!(store.get("recent").await.is_some());
    }

    #[tokio::test]
    async fn test_refreshed_session_survives_stale_deadline() {
        let (store, clock) = store();
        store.update("s1", SessionPatch::default()).await;
        clock.advance(Duration::minutes(25));
        store.update("s1", SessionPatch::default()).await;
        clock.advance(Duration::minutes(10));

        // First deadline has passed, the refreshed one has not.
        store.update("other", SessionPatch::default()).await;
        assert!(store.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _) = store();
        store.update("s1", SessionPatch::default()).await;
        assert!(store.delete("s1").await);
        assert!(!store.delete("s1").await);
        assert!(store.is_empty().await);
    }
}
