//! Session store and per-request session snapshot
//!
//! Flash data follows a read-once convention: whatever a response flashes
//! is handed to the next request that opens the session, and removed from
//! the store at that moment.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::FieldErrors;

/// Key-value map stored in a session
pub type SessionMap = Map<String, Value>;

/// Flash key holding validation errors
pub const ERRORS_KEY: &str = "_errors";
/// Flash key holding the submitted form input
pub const OLD_INPUT_KEY: &str = "_old_input";

/// What the store keeps for one session id
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    #[serde(default)]
    pub data: SessionMap,
    #[serde(default)]
    pub flash: SessionMap,
}

/// Server-side session storage keyed by session id.
///
/// Concurrent transactions for the same session are expected to be
/// serialized by the host; the store only guarantees each call is atomic.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &str) -> Option<SessionRecord>;
    fn save(&self, id: &str, record: SessionRecord);

    /// Move the flash map out of a stored record
    fn take_flash(&self, id: &str) -> Option<SessionRecord> {
        let mut record = self.load(id)?;
        let flash = std::mem::take(&mut record.flash);
        self.save(id, record.clone());
        record.flash = flash;
        Some(record)
    }

    /// Merge new flash entries into a stored record
    fn put_flash(&self, id: &str, flash: SessionMap) {
        let mut record = self.load(id).unwrap_or_default();
        record.flash.extend(flash);
        self.save(id, record);
    }
}

/// Idle time after which [`MemorySessionStore`] forgets a session
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Process-local session store.
///
/// Records untouched for longer than the idle timeout are evicted whenever
/// a record is written.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, (Instant, SessionRecord)>>,
    idle_timeout: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(&self, sessions: &mut HashMap<String, (Instant, SessionRecord)>, now: Instant) {
        sessions.retain(|_, (seen, _)| now.duration_since(*seen) <= self.idle_timeout);
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &str) -> Option<SessionRecord> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|(seen, _)| seen.elapsed() <= self.idle_timeout)
            .map(|(_, record)| record.clone())
    }

    fn save(&self, id: &str, record: SessionRecord) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut sessions, now);
        sessions.insert(id.to_string(), (now, record));
    }

    fn take_flash(&self, id: &str) -> Option<SessionRecord> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let (seen, stored) = sessions.get_mut(id)?;
        if now.duration_since(*seen) > self.idle_timeout {
            sessions.remove(id);
            return None;
        }
        *seen = now;
        let flash = std::mem::take(&mut stored.flash);
        Some(SessionRecord {
            data: stored.data.clone(),
            flash,
        })
    }

    fn put_flash(&self, id: &str, flash: SessionMap) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut sessions, now);
        let (seen, record) = sessions
            .entry(id.to_string())
            .or_insert_with(|| (now, SessionRecord::default()));
        *seen = now;
        record.flash.extend(flash);
    }
}

/// Read-only session view captured when a request is constructed
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    fresh: bool,
    data: SessionMap,
    flash: SessionMap,
}

impl Session {
    /// Open the session `id` from `store`, consuming its pending flash data.
    ///
    /// Unknown or missing ids start a fresh session with a new id.
    pub fn open(store: &dyn SessionStore, id: Option<&str>) -> Self {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if let Some(record) = store.take_flash(id) {
                return Self {
                    id: id.to_string(),
                    fresh: false,
                    data: record.data,
                    flash: record.flash,
                };
            }
        }
        Self::fresh()
    }

    /// A new, empty session not yet known to any store
    pub fn fresh() -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            fresh: true,
            data: SessionMap::new(),
            flash: SessionMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when the client has no session cookie yet
    pub const fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Value stored in the session, falling back to flash data
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key).or_else(|| self.flash.get(key))
    }

    /// Flash value set by the previous response
    pub fn flash(&self, key: &str) -> Option<&Value> {
        self.flash.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Validation errors flashed by the previous response
    pub fn errors(&self) -> FieldErrors {
        self.flash
            .get(ERRORS_KEY)
            .and_then(Value::as_object)
            .map(|errors| {
                errors
                    .iter()
                    .map(|(field, message)| {
                        let message = message
                            .as_str()
                            .map_or_else(|| message.to_string(), ToString::to_string);
                        (field.clone(), message)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Submitted value of `key` from the previous form post
    pub fn old(&self, key: &str) -> Option<&str> {
        self.flash
            .get(OLD_INPUT_KEY)
            .and_then(|input| input.get(key))
            .and_then(Value::as_str)
    }

    pub const fn data(&self) -> &SessionMap {
        &self.data
    }

    pub const fn flashed(&self) -> &SessionMap {
        &self.flash
    }

    /// Build a session view directly, without a store
    pub fn with_values(id: impl Into<String>, data: SessionMap, flash: SessionMap) -> Self {
        Self {
            id: id.into(),
            fresh: false,
            data,
            flash,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::fresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flash_map(key: &str, value: Value) -> SessionMap {
        let mut map = SessionMap::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn test_unknown_id_starts_fresh() {
        let store = MemorySessionStore::new();
        let session = Session::open(&store, Some("nope"));
        assert!(session.is_fresh());
        assert_ne!(session.id(), "nope");
        assert!(Session::open(&store, None).is_fresh());
    }

    #[test]
    fn test_flash_is_read_once() {
        let store = MemorySessionStore::new();
        store.put_flash("abc", flash_map("sucesso", json!("Arte salva")));

        let first = Session::open(&store, Some("abc"));
        assert!(!first.is_fresh());
        assert_eq!(first.flash("sucesso"), Some(&json!("Arte salva")));

        let second = Session::open(&store, Some("abc"));
        assert_eq!(second.flash("sucesso"), None);
        assert!(!second.is_fresh());
    }

    #[test]
    fn test_errors_and_old_input() {
        let mut flash = flash_map(ERRORS_KEY, json!({"titulo": "obrigatório", "preco": 3}));
        flash.insert(OLD_INPUT_KEY.to_string(), json!({"artista": "Tarsila"}));
        let session = Session::with_values("s1", SessionMap::new(), flash);

        let errors = session.errors();
        assert_eq!(errors.get("titulo").map(String::as_str), Some("obrigatório"));
        assert_eq!(errors.get("preco").map(String::as_str), Some("3"));
        assert_eq!(session.old("artista"), Some("Tarsila"));
        assert_eq!(session.old("titulo"), None);
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let store = MemorySessionStore::with_idle_timeout(Duration::from_millis(20));
        store.put_flash("antiga", flash_map("k", json!(1)));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.load("antiga"), None);
        store.put_flash("nova", flash_map("k", json!(2)));
        assert_eq!(store.len(), 1);
        assert!(Session::open(&store, Some("antiga")).is_fresh());
        assert!(!Session::open(&store, Some("nova")).is_fresh());
    }

    #[test]
    fn test_default_trait_methods() {
        // Exercise the provided take/put implementations through a plain store
        struct Plain(MemorySessionStore);
        impl SessionStore for Plain {
            fn load(&self, id: &str) -> Option<SessionRecord> {
                self.0.load(id)
            }
            fn save(&self, id: &str, record: SessionRecord) {
                self.0.save(id, record);
            }
        }

        let store = Plain(MemorySessionStore::new());
        store.put_flash("id", flash_map("k", json!(1)));
        let record = store.take_flash("id").unwrap();
        assert_eq!(record.flash.get("k"), Some(&json!(1)));
        assert!(store.load("id").unwrap().flash.is_empty());
    }
}
