use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::error::StoreError;
use crate::models::AnalysisResult;

pub const SESSION_COOKIE: &str = "testscore_session";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 1_000;

#[derive(Debug, Clone)]
pub struct SessionState {
    result: Option<AnalysisResult>,
    flash: Option<String>,
    touched_at: Instant,
    /// Monotonic write order, used to pick the least recently used entry.
    touched_seq: u64,
}

/// In-process sessions, expired after `ttl` and capped at `max_entries`.
#[derive(Debug)]
pub struct MemorySessions {
    entries: DashMap<Uuid, SessionState>,
    ttl: Duration,
    max_entries: usize,
    clock: AtomicU64,
}

impl MemorySessions {
    fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
        }
    }

    fn is_live(&self, state: &SessionState) -> bool {
        state.touched_at.elapsed() < self.ttl
    }

    /// Drops expired entries, then the least recently used ones until `session` fits.
    fn make_room(&self, session: Uuid) {
        let before = self.entries.len();
        self.entries.retain(|_, state| state.touched_at.elapsed() < self.ttl);

        while !self.entries.contains_key(&session) && self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().touched_seq)
                .map(|entry| *entry.key());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "evicted sessions");
        }
    }

    fn update(&self, session: Uuid, apply: impl FnOnce(&mut SessionState)) {
        self.make_room(session);
        let seq = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut state = self.entries.entry(session).or_insert_with(|| SessionState {
            result: None,
            flash: None,
            touched_at: Instant::now(),
            touched_seq: seq,
        });
        state.touched_at = Instant::now();
        state.touched_seq = seq;
        apply(state.value_mut());
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Session storage keyed by the session cookie. Entries never leak across keys.
#[derive(Debug, Clone)]
pub enum SessionStore {
    Memory(Arc<MemorySessions>),
    Postgres { pool: PgPool, ttl: Duration },
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self::in_memory_with(DEFAULT_SESSION_TTL, DEFAULT_MAX_SESSIONS)
    }

    pub fn in_memory_with(ttl: Duration, max_entries: usize) -> Self {
        Self::Memory(Arc::new(MemorySessions::new(ttl, max_entries)))
    }

    pub fn postgres(pool: PgPool, ttl: Duration) -> Self {
        Self::Postgres { pool, ttl }
    }

    /// Number of live in-memory sessions; always 0 for Postgres.
    pub fn memory_len(&self) -> usize {
        match self {
            Self::Memory(sessions) => sessions.len(),
            Self::Postgres { .. } => 0,
        }
    }

    pub async fn load_result(&self, session: Uuid) -> Result<Option<AnalysisResult>, StoreError> {
        match self {
            Self::Memory(sessions) => Ok(sessions
                .entries
                .get(&session)
                .filter(|state| sessions.is_live(state))
                .and_then(|state| state.result.clone())),
            Self::Postgres { pool, ttl } => Ok(db::fetch_result(pool, session, *ttl).await?),
        }
    }

    /// Replaces whatever result the session held before.
    pub async fn save_result(
        &self,
        session: Uuid,
        result: AnalysisResult,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(sessions) => {
                sessions.update(session, |state| state.result = Some(result));
                Ok(())
            }
            Self::Postgres { pool, ttl } => {
                let purged = db::purge_sessions(pool, *ttl).await?;
                if purged > 0 {
                    debug!(purged, "purged expired sessions");
                }
                Ok(db::save_result(pool, session, &result).await?)
            }
        }
    }

    pub async fn push_flash(&self, session: Uuid, message: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(sessions) => {
                sessions.update(session, |state| state.flash = Some(message.to_string()));
                Ok(())
            }
            Self::Postgres { pool, .. } => Ok(db::push_flash(pool, session, message).await?),
        }
    }

    pub async fn take_flash(&self, session: Uuid) -> Result<Option<String>, StoreError> {
        match self {
            Self::Memory(sessions) => Ok(sessions
                .entries
                .get_mut(&session)
                .filter(|state| sessions.is_live(state))
                .and_then(|mut state| state.flash.take())),
            Self::Postgres { pool, .. } => Ok(db::take_flash(pool, session).await?),
        }
    }
}
