//! Per-turn host session with its own file storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChatUser, SessionError};

/// Client type recorded on sessions created by the bridge.
pub const CLIENT_TYPE: &str = "msagents";

/// A file stored in a session's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFile {
    /// File key.
    pub id: String,
    /// Original file name.
    pub name: String,
    /// Location on disk.
    pub path: PathBuf,
    /// MIME type.
    pub mime: String,
}

/// Host execution context for one turn.
///
/// Files live under `{files_root}/{session_id}` and are removed by
/// [`HttpSession::delete`].
#[derive(Debug)]
pub struct HttpSession {
    id: String,
    thread_id: String,
    user: ChatUser,
    files_dir: PathBuf,
    files: Mutex<HashMap<String, PersistedFile>>,
    current_run: Mutex<Option<String>>,
    user_session: Mutex<Map<String, Value>>,
}

impl HttpSession {
    /// Create a session with a fresh random id.
    pub fn new(thread_id: String, user: ChatUser, files_root: &Path) -> Self {
        let id = Uuid::new_v4().to_string();
        let files_dir = files_root.join(&id);
        Self {
            id,
            thread_id,
            user,
            files_dir,
            files: Mutex::new(HashMap::new()),
            current_run: Mutex::new(None),
            user_session: Mutex::new(Map::new()),
        }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deterministic thread id.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// User the session runs as.
    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    /// Always [`CLIENT_TYPE`].
    pub fn client_type(&self) -> &'static str {
        CLIENT_TYPE
    }

    /// Directory holding this session's files.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Store `content` as a new session file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the directory or file cannot be written.
    pub async fn persist_file(
        &self,
        name: &str,
        mime: &str,
        content: &[u8],
    ) -> Result<PersistedFile, SessionError> {
        tokio::fs::create_dir_all(&self.files_dir)
            .await
            .map_err(|source| SessionError::Io {
                path: self.files_dir.clone(),
                source,
            })?;
        let id = Uuid::new_v4().to_string();
        let path = self.files_dir.join(&id);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;

        let file = PersistedFile {
            id: id.clone(),
            name: name.to_owned(),
            path,
            mime: mime.to_owned(),
        };
        if let Ok(mut files) = self.files.lock() {
            files.insert(id, file.clone());
        }
        debug!(session_id = %self.id, file = name, mime, bytes = content.len(), "persisted session file");
        Ok(file)
    }

    /// Look up a persisted file by key.
    pub fn file(&self, key: &str) -> Option<PersistedFile> {
        self.files.lock().ok().and_then(|files| files.get(key).cloned())
    }

    /// Id of the run currently in progress.
    pub fn current_run(&self) -> Option<String> {
        self.current_run.lock().ok().and_then(|run| run.clone())
    }

    /// Replace the current run id.
    pub fn set_current_run(&self, run_id: Option<String>) {
        if let Ok(mut run) = self.current_run.lock() {
            *run = run_id;
        }
    }

    /// Store a user-session value.
    pub fn set(&self, key: &str, value: Value) {
        if let Ok(mut store) = self.user_session.lock() {
            store.insert(key.to_owned(), value);
        }
    }

    /// Read a user-session value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.user_session
            .lock()
            .ok()
            .and_then(|store| store.get(key).cloned())
    }

    /// Snapshot stored as thread metadata.
    pub fn to_persistable(&self) -> Value {
        let user_session = self
            .user_session
            .lock()
            .map(|store| store.clone())
            .unwrap_or_default();
        json!({
            "id": self.id,
            "client_type": CLIENT_TYPE,
            "thread_id": self.thread_id,
            "user_identifier": self.user.identifier(),
            "user_session": user_session,
        })
    }

    /// Release the session and remove its stored files.
    pub async fn delete(&self) {
        match tokio::fs::remove_dir_all(&self.files_dir).await {
            Ok(()) => debug!(session_id = %self.id, "session files removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                session_id = %self.id,
                path = %self.files_dir.display(),
                error = %e,
                "failed to remove session files"
            ),
        }
        if let Ok(mut files) = self.files.lock() {
            files.clear();
        }
    }
}
