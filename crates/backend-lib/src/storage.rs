// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Storage abstraction for sessions and users, with an in-memory and a
//! flat-file implementation.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundation_common::{NewUser, Session, User, UserId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs as tokio_fs;
use tracing::warn;

use crate::auth::token_generator::is_well_formed;

/// Errors from a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session already exists")]
    DuplicateSession,

    #[error("username already taken: {0}")]
    DuplicateUser(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("{primary}; compensating delete also failed: {compensation}")]
    Combined {
        primary: Box<StorageError>,
        compensation: Box<StorageError>,
    },
}

/// Durable session rows
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new row; fails if the id is already taken
    async fn insert(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a row by id. Expired rows are still returned.
    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError>;

    /// Delete a row; deleting a missing id is not an error
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Delete every row with `expires_at < before`, returning the count
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Swap `old_id` for `new`, the write behind a rotation.
    ///
    /// The default is insert-then-delete with a compensating delete; stores
    /// that can do both in one step should override it.
    async fn replace(&self, old_id: &str, new: &Session) -> Result<(), StorageError> {
        replace_with_compensation(self, old_id, new).await
    }
}

/// Insert `new`, then delete `old_id`. If the delete fails the new row is
/// removed again so one user never ends up with two live sessions. A crash
/// between the steps can still leave two rows (or none).
pub async fn replace_with_compensation<S>(
    store: &S,
    old_id: &str,
    new: &Session,
) -> Result<(), StorageError>
where
    S: SessionStore + ?Sized,
{
    store.insert(new).await?;

    if let Err(primary) = store.delete(old_id).await {
        return match store.delete(&new.id).await {
            Ok(()) => Err(primary),
            Err(compensation) => Err(StorageError::Combined {
                primary: Box::new(primary),
                compensation: Box::new(compensation),
            }),
        };
    }

    Ok(())
}

/// Credential lookup
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StorageError>;

    /// Create a user, assigning its id; usernames are unique
    async fn insert_user(&self, new_user: NewUser) -> Result<User, StorageError>;
}

fn build_user(id: UserId, new_user: NewUser) -> User {
    let now = Utc::now();
    User {
        id,
        display_name: new_user.display_name,
        user_name: new_user.user_name,
        hashed_password: new_user.hashed_password,
        created_at: now,
        updated_at: now,
    }
}

/// In-memory storage, used by tests and ephemeral setups
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: RwLock<HashMap<String, Session>>,
    users: RwLock<Vec<User>>,
    /// Replace via insert + delete instead of under one lock
    non_atomic_replace: bool,
    /// Ids whose delete should fail
    failing_deletes: Mutex<HashSet<String>>,
    fail_all_deletes: AtomicBool,
    fail_lookups: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `replace` goes through the compensating insert/delete
    /// path, like a backend without transactions.
    pub fn non_atomic() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                non_atomic_replace: true,
                ..MemoryInner::default()
            }),
        }
    }

    /// Make every future delete of `id` fail
    pub fn fail_delete_of(&self, id: &str) {
        self.inner.failing_deletes.lock().insert(id.to_owned());
    }

    /// Make every future delete fail (or succeed again)
    pub fn fail_all_deletes(&self, fail: bool) {
        self.inner.fail_all_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every future user lookup fail (or succeed again)
    pub fn fail_lookups(&self, fail: bool) {
        self.inner.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of session rows, expired ones included
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// All session rows bound to `user_id`
    pub fn sessions_for_user(&self, user_id: UserId) -> Vec<Session> {
        self.inner
            .sessions
            .read()
            .values()
            .filter(|s| s.user_id == Some(user_id))
            .cloned()
            .collect()
    }

    fn check_delete(&self, id: &str) -> Result<(), StorageError> {
        if self.inner.fail_all_deletes.load(Ordering::SeqCst)
            || self.inner.failing_deletes.lock().contains(id)
        {
            return Err(StorageError::Unavailable(format!(
                "delete refused for {}",
                foundation_common::redact(id)
            )));
        }
        Ok(())
    }

    fn check_lookup(&self) -> Result<(), StorageError> {
        if self.inner.fail_lookups.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("user lookup refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn insert(&self, session: &Session) -> Result<(), StorageError> {
        let mut sessions = self.inner.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(StorageError::DuplicateSession);
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.inner.sessions.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.check_delete(id)?;
        self.inner.sessions.write().remove(id);
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut sessions = self.inner.sessions.write();
        let count = sessions.len();
        sessions.retain(|_, s| s.expires_at >= before);
        Ok(count - sessions.len())
    }

    async fn replace(&self, old_id: &str, new: &Session) -> Result<(), StorageError> {
        if self.inner.non_atomic_replace {
            return replace_with_compensation(self, old_id, new).await;
        }

        // Both writes under one lock: either both happen or neither does
        self.check_delete(old_id)?;
        let mut sessions = self.inner.sessions.write();
        if sessions.contains_key(&new.id) {
            return Err(StorageError::DuplicateSession);
        }
        sessions.remove(old_id);
        sessions.insert(new.id.clone(), new.clone());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStorage {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        self.check_lookup()?;
        Ok(self
            .inner
            .users
            .read()
            .iter()
            .find(|u| u.user_name == username)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StorageError> {
        self.check_lookup()?;
        Ok(self.inner.users.read().iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, StorageError> {
        let mut users = self.inner.users.write();
        if users.iter().any(|u| u.user_name == new_user.user_name) {
            return Err(StorageError::DuplicateUser(new_user.user_name));
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = build_user(id, new_user);
        users.push(user.clone());
        Ok(user)
    }
}

/// Flat-file implementation: one JSON file per session plus a `users.json`
#[derive(Clone, Debug)]
pub struct FlatFileStorage {
    root: PathBuf,
    /// Serialises read-modify-write cycles on `users.json`
    users_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("sessions"))?;
        Ok(Self {
            root,
            users_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Path of a session file; `None` for ids that are not valid tokens
    fn session_path(&self, id: &str) -> Option<PathBuf> {
        is_well_formed(id).then(|| self.root.join("sessions").join(format!("{id}.json")))
    }

    fn users_path(&self) -> PathBuf {
        self.root.join("users.json")
    }

    async fn load_users(&self) -> Result<Vec<User>, StorageError> {
        match tokio_fs::read_to_string(self.users_path()).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write through a temp file so readers never see a partial document
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    tokio_fs::write(&tmp, contents).await?;
    tokio_fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SessionStore for FlatFileStorage {
    async fn insert(&self, session: &Session) -> Result<(), StorageError> {
        let path = self
            .session_path(&session.id)
            .ok_or_else(|| StorageError::Unavailable("malformed session id".to_string()))?;
        if tokio_fs::try_exists(&path).await? {
            return Err(StorageError::DuplicateSession);
        }
        let json = serde_json::to_vec(session)?;
        write_atomically(&path, &json).await
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let Some(path) = self.session_path(id) else {
            return Ok(None);
        };
        match tokio_fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let Some(path) = self.session_path(id) else {
            return Ok(());
        };
        match tokio_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut dir = tokio_fs::read_dir(self.root.join("sessions")).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let session: Session = match tokio_fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "skipping unreadable session file"
                        );
                        continue;
                    },
                },
                // Deleted concurrently
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if session.expires_at < before {
                self.delete(&session.id).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl UserStore for FlatFileStorage {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .load_users()
            .await?
            .into_iter()
            .find(|u| u.user_name == username))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(self.load_users().await?.into_iter().find(|u| u.id == id))
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, StorageError> {
        let _guard = self.users_lock.lock().await;
        let mut users = self.load_users().await?;
        if users.iter().any(|u| u.user_name == new_user.user_name) {
            return Err(StorageError::DuplicateUser(new_user.user_name));
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = build_user(id, new_user);
        users.push(user.clone());
        write_atomically(&self.users_path(), &serde_json::to_vec_pretty(&users)?).await?;
        Ok(user)
    }
}
