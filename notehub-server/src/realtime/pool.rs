//! Live document pool
//!
//! Every note with at least one connected editor has one [`LiveNote`] in the
//! pool. The live document is the source of truth while it exists: edits
//! are transformed against concurrent history, applied, and broadcast to
//! all clients under the document lock, so every client observes the same
//! revision order. The database copy is refreshed by periodic flushes and
//! when the last client leaves.
//!
//! A note is never written by both the pool and the HTTP update path: an
//! HTTP update needs an [`HttpUpdateGuard`], which is refused while the note
//! is live, and a live session cannot start while a guard is held.

use chrono::{DateTime, Utc};
use notehub_common::authorship::Authorship;
use notehub_common::config::RealtimeConfig;
use notehub_common::ot::{OtError, TextOperation};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::notes::{self, SaveContent};

/// Operations kept for transforming late edits
const MAX_HISTORY: usize = 500;

/// Per-note broadcast buffer
const EVENT_CAPACITY: usize = 256;

/// Pool failures reported to a single client
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("note is being updated, try again later")]
    Busy,

    #[error("too many users on this note")]
    Full,

    #[error("note not found")]
    NotFound,

    #[error("not allowed to edit this note")]
    ReadOnly,

    #[error("revision {revision} is too old, oldest known is {oldest}")]
    StaleRevision { revision: u64, oldest: u64 },

    #[error("revision {revision} is ahead of the document revision {current}")]
    FutureRevision { revision: u64, current: u64 },

    #[error("note session has ended")]
    Closed,

    #[error(transparent)]
    Operation(#[from] OtError),

    #[error(transparent)]
    Storage(#[from] notehub_common::Error),
}

/// A connected editor as seen by other editors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    pub client_id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
}

/// Messages fanned out to every client of a note
#[derive(Debug, Clone)]
pub enum PoolEvent {
    UserJoined(OnlineUser),
    UserLeft { client_id: Uuid },
    Operation {
        /// Client that sent the operation
        origin: Uuid,
        revision: u64,
        operation: TextOperation,
        user_id: Option<Uuid>,
    },
    /// The note was deleted; clients must close
    Deleted,
}

/// Document state as of one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSnapshot {
    pub content: String,
    pub revision: u64,
    pub users: Vec<OnlineUser>,
}

/// Identity of a joining client
#[derive(Debug, Clone)]
pub struct NewClient {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub can_edit: bool,
}

/// Handle returned to a joined client
#[derive(Debug)]
pub struct ClientSession {
    pub note_id: Uuid,
    pub client_id: Uuid,
    pub can_edit: bool,
    /// Events after `snapshot.revision`
    pub events: broadcast::Receiver<PoolEvent>,
    /// Cancelled when the note is disconnected
    pub cancel: CancellationToken,
    pub snapshot: DocSnapshot,
}

#[derive(Debug, Clone)]
struct ClientInfo {
    user_id: Option<Uuid>,
    name: String,
    can_edit: bool,
}

#[derive(Debug)]
struct DocState {
    loaded: bool,
    /// Set once the note has left the pool; joiners must retry
    closed: bool,
    content: String,
    revision: u64,
    /// Operations producing revisions `history_base + 1 ..= revision`
    history: Vec<TextOperation>,
    history_base: u64,
    authorship: Authorship,
    clients: HashMap<Uuid, ClientInfo>,
    dirty: bool,
    last_change_user: Option<Uuid>,
    last_change_at: DateTime<Utc>,
}

impl DocState {
    fn empty() -> Self {
        Self {
            loaded: false,
            closed: false,
            content: String::new(),
            revision: 0,
            history: Vec::new(),
            history_base: 0,
            authorship: Authorship::default(),
            clients: HashMap::new(),
            dirty: false,
            last_change_user: None,
            last_change_at: Utc::now(),
        }
    }

    fn users(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .clients
            .iter()
            .map(|(client_id, info)| OnlineUser {
                client_id: *client_id,
                user_id: info.user_id,
                name: info.name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.client_id.cmp(&b.client_id)));
        users
    }

    fn snapshot(&self) -> DocSnapshot {
        DocSnapshot {
            content: self.content.clone(),
            revision: self.revision,
            users: self.users(),
        }
    }
}

struct LiveNote {
    id: Uuid,
    state: tokio::sync::Mutex<DocState>,
    events: broadcast::Sender<PoolEvent>,
    cancel: CancellationToken,
}

impl LiveNote {
    fn new(id: Uuid) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            state: tokio::sync::Mutex::new(DocState::empty()),
            events,
            cancel: CancellationToken::new(),
        }
    }

    fn broadcast(&self, event: PoolEvent) {
        // No receivers is fine: the last client may just have left
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
struct Registry {
    live: HashMap<Uuid, Arc<LiveNote>>,
    http_locked: HashSet<Uuid>,
}

struct PoolInner {
    db: SqlitePool,
    config: RealtimeConfig,
    registry: Mutex<Registry>,
}

impl PoolInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held while an HTTP request rewrites a note; releases the note on drop
pub struct HttpUpdateGuard {
    inner: Arc<PoolInner>,
    note_id: Uuid,
}

impl Drop for HttpUpdateGuard {
    fn drop(&mut self) {
        self.inner.registry().http_locked.remove(&self.note_id);
    }
}

/// Shared registry of live notes
#[derive(Clone)]
pub struct NotePool {
    inner: Arc<PoolInner>,
}

impl NotePool {
    pub fn new(db: SqlitePool, config: RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db,
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    fn live(&self, note_id: Uuid) -> Option<Arc<LiveNote>> {
        self.inner.registry().live.get(&note_id).cloned()
    }

    fn remove_if_same(&self, live: &Arc<LiveNote>) {
        let mut registry = self.inner.registry();
        if registry
            .live
            .get(&live.id)
            .is_some_and(|current| Arc::ptr_eq(current, live))
        {
            registry.live.remove(&live.id);
        }
    }

    /// Whether the note has a live session
    pub fn is_note_in_pool(&self, note_id: Uuid) -> bool {
        self.inner.registry().live.contains_key(&note_id)
    }

    /// Current live state of a note, if it is in the pool
    pub async fn get_note_from_pool(&self, note_id: Uuid) -> Option<DocSnapshot> {
        let live = self.live(note_id)?;
        let doc = live.state.lock().await;
        if doc.closed || !doc.loaded {
            return None;
        }
        Some(doc.snapshot())
    }

    /// Number of notes with a live session
    pub fn live_count(&self) -> usize {
        self.inner.registry().live.len()
    }

    /// Register a client on a note, loading the note into the pool if needed
    pub async fn join(&self, note_id: Uuid, client: NewClient) -> Result<ClientSession, PoolError> {
        loop {
            let live = {
                let mut registry = self.inner.registry();
                if registry.http_locked.contains(&note_id) {
                    return Err(PoolError::Busy);
                }
                registry
                    .live
                    .entry(note_id)
                    .or_insert_with(|| Arc::new(LiveNote::new(note_id)))
                    .clone()
            };

            let mut doc = live.state.lock().await;
            if doc.closed {
                // Lost a race with the last leaver or an eviction
                continue;
            }

            if !doc.loaded {
                match notes::get_note(&self.inner.db, note_id).await {
                    Ok(Some(note)) => {
                        let len = note.content.chars().count();
                        doc.authorship = Authorship::from_spans(&note.authorship, len);
                        doc.content = note.content;
                        doc.last_change_user = note.last_change_user_id;
                        doc.loaded = true;
                        debug!(note_id = %note_id, "Loaded note into pool");
                    }
                    Ok(None) => {
                        doc.closed = true;
                        self.remove_if_same(&live);
                        return Err(PoolError::NotFound);
                    }
                    Err(e) => {
                        doc.closed = true;
                        self.remove_if_same(&live);
                        return Err(e.into());
                    }
                }
            }

            if doc.clients.len() >= self.inner.config.max_clients_per_note.max(1) {
                return Err(PoolError::Full);
            }

            let client_id = Uuid::new_v4();
            let events = live.events.subscribe();
            doc.clients.insert(
                client_id,
                ClientInfo {
                    user_id: client.user_id,
                    name: client.name.clone(),
                    can_edit: client.can_edit,
                },
            );
            live.broadcast(PoolEvent::UserJoined(OnlineUser {
                client_id,
                user_id: client.user_id,
                name: client.name,
            }));

            info!(note_id = %note_id, client_id = %client_id, clients = doc.clients.len(), "Client joined note");

            return Ok(ClientSession {
                note_id,
                client_id,
                can_edit: client.can_edit,
                events,
                cancel: live.cancel.child_token(),
                snapshot: doc.snapshot(),
            });
        }
    }

    /// Apply a client's operation made against `revision`
    ///
    /// Returns the revision the operation produced.
    pub async fn apply_operation(
        &self,
        note_id: Uuid,
        client_id: Uuid,
        revision: u64,
        operation: TextOperation,
    ) -> Result<u64, PoolError> {
        let live = self.live(note_id).ok_or(PoolError::Closed)?;
        let mut doc = live.state.lock().await;
        if doc.closed {
            return Err(PoolError::Closed);
        }

        let client = doc.clients.get(&client_id).cloned().ok_or(PoolError::Closed)?;
        if !client.can_edit {
            return Err(PoolError::ReadOnly);
        }
        if revision > doc.revision {
            return Err(PoolError::FutureRevision {
                revision,
                current: doc.revision,
            });
        }
        if revision < doc.history_base {
            return Err(PoolError::StaleRevision {
                revision,
                oldest: doc.history_base,
            });
        }

        let mut operation = operation;
        let start = (revision - doc.history_base) as usize;
        for concurrent in &doc.history[start..] {
            operation = TextOperation::transform(&operation, concurrent)?.0;
        }

        let content = operation.apply(&doc.content)?;
        let now = Utc::now();
        doc.authorship
            .apply(&operation, client.user_id, now.timestamp_millis())?;

        doc.content = content;
        doc.revision += 1;
        doc.history.push(operation.clone());
        if doc.history.len() > MAX_HISTORY {
            let excess = doc.history.len() - MAX_HISTORY;
            doc.history.drain(..excess);
            doc.history_base += excess as u64;
        }
        doc.dirty = true;
        doc.last_change_user = client.user_id;
        doc.last_change_at = now;

        let revision = doc.revision;
        live.broadcast(PoolEvent::Operation {
            origin: client_id,
            revision,
            operation,
            user_id: client.user_id,
        });
        Ok(revision)
    }

    /// Current snapshot of a live note
    pub async fn snapshot(&self, note_id: Uuid) -> Option<DocSnapshot> {
        self.get_note_from_pool(note_id).await
    }

    /// Unregister a client; the last one out saves and closes the note
    pub async fn leave(&self, note_id: Uuid, client_id: Uuid) {
        let Some(live) = self.live(note_id) else {
            return;
        };
        let mut doc = live.state.lock().await;
        if doc.clients.remove(&client_id).is_none() {
            return;
        }
        live.broadcast(PoolEvent::UserLeft { client_id });
        info!(note_id = %note_id, client_id = %client_id, clients = doc.clients.len(), "Client left note");

        if doc.clients.is_empty() && !doc.closed {
            if doc.dirty {
                if let Err(e) = flush_doc(&self.inner.db, note_id, &mut doc).await {
                    // Stays in the pool; the periodic flush retries and evicts it
                    error!(note_id = %note_id, "Failed to save note on close: {}", e);
                    return;
                }
            }
            doc.closed = true;
            self.remove_if_same(&live);
            debug!(note_id = %note_id, "Note left pool");
        }
    }

    /// Drop a note from the pool without saving and end every session on it
    pub async fn disconnect_note(&self, note_id: Uuid) {
        let live = self.inner.registry().live.remove(&note_id);
        let Some(live) = live else {
            return;
        };

        let mut doc = live.state.lock().await;
        doc.closed = true;
        doc.dirty = false;
        let clients = doc.clients.len();
        doc.clients.clear();
        live.broadcast(PoolEvent::Deleted);
        live.cancel.cancel();
        info!(note_id = %note_id, clients, "Disconnected note sessions");
    }

    /// Claim a note for an HTTP content update
    ///
    /// `None` while the note has a live session or another update holds it.
    pub fn lock_for_http_update(&self, note_id: Uuid) -> Option<HttpUpdateGuard> {
        let mut registry = self.inner.registry();
        if registry.live.contains_key(&note_id) || !registry.http_locked.insert(note_id) {
            return None;
        }
        Some(HttpUpdateGuard {
            inner: Arc::clone(&self.inner),
            note_id,
        })
    }

    /// Save every modified live note and evict notes nobody is editing
    ///
    /// Returns how many notes were written.
    pub async fn flush_dirty(&self) -> usize {
        let lives: Vec<Arc<LiveNote>> = self.inner.registry().live.values().cloned().collect();

        let mut flushed = 0;
        for live in lives {
            let mut doc = live.state.lock().await;
            if doc.closed {
                continue;
            }
            if doc.dirty {
                match flush_doc(&self.inner.db, live.id, &mut doc).await {
                    Ok(()) => flushed += 1,
                    Err(e) => {
                        error!(note_id = %live.id, "Failed to save note: {}", e);
                        continue;
                    }
                }
            }
            if doc.clients.is_empty() {
                doc.closed = true;
                self.remove_if_same(&live);
            }
        }

        if flushed > 0 {
            debug!(notes = flushed, "Flushed live notes");
        }
        flushed
    }

    /// Run [`NotePool::flush_dirty`] every `save_interval_secs` until cancelled
    pub fn spawn_flush_task(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = self.clone();
        let period = Duration::from_secs(self.inner.config.save_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Flush task stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        pool.flush_dirty().await;
                    }
                }
            }
        })
    }
}

async fn flush_doc(db: &SqlitePool, note_id: Uuid, doc: &mut DocState) -> notehub_common::Result<()> {
    let spans = doc.authorship.spans();
    let saved = notes::save_content(
        db,
        note_id,
        SaveContent {
            content: &doc.content,
            authorship: &spans,
            user_id: doc.last_change_user,
            at: doc.last_change_at,
        },
    )
    .await?;
    if !saved {
        warn!(note_id = %note_id, "Live note no longer exists in database");
    }
    doc.dirty = false;
    Ok(())
}
