//! File-backed token store
//!
//! Keeps a JSON file mapping user ids to their records. All writes use atomic
//! temp-file + rename. A tokio Mutex serializes writers; each write is staged
//! on a copy of the map and only committed in memory once the file is renamed
//! into place, so a failed write leaves both copies at the previous state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use provider::ProviderTokenTriple;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::{StoreFuture, TokenStore};

/// One authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable provider-issued identifier (primary key)
    pub id: String,
    pub email: String,
    pub tokens: ProviderTokenTriple,
    pub updated_at: DateTime<Utc>,
}

/// JSON-file token store.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<HashMap<String, UserRecord>>,
}

impl FileTokenStore {
    /// Load records from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with no
    /// users).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Persistence(format!("reading token store: {e}")))?;
            let records: HashMap<String, UserRecord> = serde_json::from_str(&contents)
                .map_err(|e| Error::Persistence(format!("parsing token store: {e}")))?;
            info!(path = %path.display(), users = records.len(), "loaded token store");
            records
        } else {
            info!(path = %path.display(), "token store not found, starting empty");
            let records = HashMap::new();
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Full record for a user, including email and update time.
    pub async fn record(&self, user_id: &str) -> Option<UserRecord> {
        let state = self.state.lock().await;
        state.get(user_id).cloned()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn upsert_record(
        &self,
        user_id: &str,
        email: &str,
        tokens: ProviderTokenTriple,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        staged.insert(
            user_id.to_string(),
            UserRecord {
                id: user_id.to_string(),
                email: email.to_string(),
                tokens,
                updated_at: Utc::now(),
            },
        );
        write_atomic(&self.path, &staged).await?;
        *state = staged;
        debug!(user_id, "upserted user record");
        Ok(())
    }

    async fn replace_tokens(&self, user_id: &str, tokens: ProviderTokenTriple) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.contains_key(user_id) {
            return Err(Error::NotFound(user_id.to_string()));
        }
        let mut staged = state.clone();
        if let Some(record) = staged.get_mut(user_id) {
            record.tokens = tokens;
            record.updated_at = Utc::now();
        }
        write_atomic(&self.path, &staged).await?;
        *state = staged;
        debug!(user_id, "updated tokens");
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, ProviderTokenTriple> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .get(user_id)
                .map(|record| record.tokens.clone())
                .ok_or_else(|| Error::NotFound(user_id.to_string()))
        })
    }

    fn upsert<'a>(
        &'a self,
        user_id: &'a str,
        email: &'a str,
        tokens: ProviderTokenTriple,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.upsert_record(user_id, email, tokens))
    }

    fn update_tokens<'a>(
        &'a self,
        user_id: &'a str,
        tokens: ProviderTokenTriple,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.replace_tokens(user_id, tokens))
    }
}

/// Write records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains provider tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, UserRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Persistence(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Persistence("token store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Persistence(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}
