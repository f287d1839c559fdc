//! Server-side sessions.
//!
//! A [`Session`] is opened once per request by the dispatcher: the record is
//! loaded from the [`SessionStore`] into a snapshot, reads are served from
//! that snapshot, and every write saves the whole record back. A request
//! therefore never observes a half-written session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use rand::Rng;

use crate::error::{BoxError, Error};

/// Session id length in random bytes (256 bits).
const SESSION_ID_BYTES: usize = 32;

const FLASH_PREFIX: &str = "_flash.";

/// Contents of one session record.
pub type SessionData = HashMap<String, String>;

/// Opaque session identifier carried in the session cookie.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh, URL-safe id with 256 bits of entropy.
    pub fn generate() -> Self {
        Self(random_token(SESSION_ID_BYTES))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL-safe base64 of `bytes` random bytes from the thread-local CSPRNG.
pub(crate) fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    URL_SAFE_NO_PAD.encode(&buf)
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Backing storage for sessions, addressed by [`SessionId`].
///
/// Records are read and written whole. Implementations must make `save`
/// atomic with respect to `load` for the same id.
pub trait SessionStore: Send + Sync {
    /// Returns the record, or `None` if it does not exist or has expired.
    fn load(&self, id: &SessionId) -> Result<Option<SessionData>, BoxError>;
    fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), BoxError>;
    fn destroy(&self, id: &SessionId) -> Result<(), BoxError>;
}

struct Entry {
    data: SessionData,
    touched: Instant,
}

/// In-process session store with inactivity expiry.
pub struct MemorySessionStore {
    entries: Mutex<HashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl }
    }

    /// Drops every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.touched.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &SessionId) -> Result<Option<SessionData>, BoxError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get_mut(id) {
            None => return Ok(None),
            Some(e) if e.touched.elapsed() >= self.ttl => true,
            Some(e) => {
                e.touched = Instant::now();
                return Ok(Some(e.data.clone()));
            }
        };
        if expired {
            entries.remove(id);
        }
        Ok(None)
    }

    fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), BoxError> {
        self.entries.lock().insert(
            id.clone(),
            Entry { data: data.clone(), touched: Instant::now() },
        );
        Ok(())
    }

    fn destroy(&self, id: &SessionId) -> Result<(), BoxError> {
        self.entries.lock().remove(id);
        Ok(())
    }
}

// ── Session handle ────────────────────────────────────────────────────────────

/// The session owned by the current request.
///
/// A new session lives only in memory until its first write, so requests
/// that never touch the session (probes, 404s, redirects) leave nothing in
/// the store and get no cookie.
pub struct Session {
    id: SessionId,
    data: SessionData,
    store: Arc<dyn SessionStore>,
    issued: bool,
    stored: bool,
}

impl Session {
    /// Loads the session named by `cookie`, or starts a new one when the
    /// cookie is absent, unknown or expired.
    pub fn open(store: Arc<dyn SessionStore>, cookie: Option<&str>) -> Result<Self, Error> {
        if let Some(raw) = cookie.filter(|c| !c.is_empty()) {
            let id = SessionId::from(raw);
            if let Some(data) = store.load(&id).map_err(Error::Session)? {
                return Ok(Self { id, data, store, issued: false, stored: true });
            }
        }
        Ok(Self {
            id: SessionId::generate(),
            data: SessionData::new(),
            store,
            issued: true,
            stored: false,
        })
    }

    pub fn id(&self) -> &SessionId { &self.id }

    /// True when the client must be handed this session's id: the record
    /// exists in the store under an id the client does not hold yet.
    pub fn is_issued(&self) -> bool { self.issued && self.stored }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), Error> {
        self.data.insert(key.to_owned(), value.into());
        self.persist()
    }

    pub fn unset(&mut self, key: &str) -> Result<(), Error> {
        if self.data.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Stores a message for the next request only.
    pub fn flash(&mut self, key: &str, message: impl Into<String>) -> Result<(), Error> {
        self.set(&format!("{FLASH_PREFIX}{key}"), message)
    }

    /// Reads and removes a flash message.
    pub fn take_flash(&mut self, key: &str) -> Result<Option<String>, Error> {
        let key = format!("{FLASH_PREFIX}{key}");
        let Some(message) = self.data.remove(&key) else {
            return Ok(None);
        };
        self.persist()?;
        Ok(Some(message))
    }

    /// Moves the data to a new id and deletes the old record.
    pub fn regenerate(&mut self) -> Result<(), Error> {
        let old = std::mem::replace(&mut self.id, SessionId::generate());
        let had_record = self.stored;
        self.persist()?;
        if had_record {
            self.store.destroy(&old).map_err(Error::Session)?;
        }
        self.issued = true;
        Ok(())
    }

    /// Deletes the record and continues with a fresh, empty session that is
    /// stored right away, so the client's old cookie gets replaced.
    pub fn invalidate(&mut self) -> Result<(), Error> {
        if self.stored {
            self.store.destroy(&self.id).map_err(Error::Session)?;
        }
        self.id = SessionId::generate();
        self.data.clear();
        self.issued = true;
        self.persist()
    }

    fn persist(&mut self) -> Result<(), Error> {
        self.store.save(&self.id, &self.data).map_err(Error::Session)?;
        self.stored = true;
        Ok(())
    }
}
