//! Channel identity to host user mapping.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::activity::ChannelAccount;
use crate::host::{ChatUser, DataLayer, User};

/// Prefix of host user identifiers created for channel users.
pub const IDENTIFIER_PREFIX: &str = "msagents_";

/// Process-wide map from channel account id to host user.
///
/// Entries are added once and never replaced or evicted. The lock is
/// never held across the data-layer call; when two turns race on a new
/// account, the first insert wins and both return it.
#[derive(Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<String, ChatUser>>,
    data_layer: Option<Arc<dyn DataLayer>>,
}

impl std::fmt::Debug for UserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.users.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("UserRegistry")
            .field("cached", &cached)
            .field("data_layer", &self.data_layer.is_some())
            .finish()
    }
}

impl UserRegistry {
    /// Create an empty registry. Users are persisted through `data_layer`
    /// when one is given.
    pub fn new(data_layer: Option<Arc<dyn DataLayer>>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            data_layer,
        }
    }

    /// Number of cached users.
    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no user has been mapped yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the host user for `account`, creating it on first sight.
    ///
    /// Data-layer failures are logged and leave the user anonymous.
    pub async fn get_user(&self, account: &ChannelAccount) -> ChatUser {
        let cached = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&account.id)
            .cloned();
        if let Some(user) = cached {
            return user;
        }

        let name = account.name.clone().unwrap_or_else(|| account.id.clone());
        let mut metadata = Map::new();
        metadata.insert("name".to_owned(), Value::String(name.clone()));
        metadata.insert("id".to_owned(), Value::String(account.id.clone()));
        let user = User {
            identifier: format!("{IDENTIFIER_PREFIX}{name}"),
            metadata,
        };

        let resolved = match &self.data_layer {
            Some(data_layer) => match data_layer.create_user(&user).await {
                Ok(Some(persisted)) => ChatUser::Persisted(persisted),
                Ok(None) => ChatUser::Anonymous(user),
                Err(e) => {
                    error!(identifier = %user.identifier, error = %e, "failed to persist user");
                    ChatUser::Anonymous(user)
                }
            },
            None => ChatUser::Anonymous(user),
        };

        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let entry = users.entry(account.id.clone()).or_insert(resolved);
        debug!(channel_user = %account.id, identifier = entry.identifier(), "mapped channel user");
        entry.clone()
    }
}
