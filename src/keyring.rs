// Copyright 2024 Dmitry Tantsur <dtantsur@protonmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Optional caching of access information in a secret store.
//!
//! An [IdentityPlugin](../auth/struct.IdentityPlugin.html) with a [Keyring]
//! looks for a previously stored [AccessInfo] before authenticating and
//! stores the new one afterwards. The store itself is pluggable through the
//! [SecretStore] trait; [MemoryStore] keeps entries in the process memory.
//!
//! Caching is best effort: a missing store, a store error or a corrupted
//! entry is logged and the plugin simply authenticates.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use log::{debug, warn};

use crate::identity::{AccessInfo, Credentials};
use crate::utils::normalize_url;
use crate::{IdOrName, Result};

/// Storage for secrets.
pub trait SecretStore: fmt::Debug + Send + Sync {
    /// Get a value, `None` if it is not stored.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing the existing one.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Secret store in the process memory.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _ = self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .finish()
    }
}

/// Access information cache on top of a secret store.
#[derive(Clone, Debug, Default)]
pub struct Keyring {
    store: Option<Arc<dyn SecretStore>>,
    force_new_token: bool,
}

impl Keyring {
    /// Cache using the given store.
    pub fn new(store: Arc<dyn SecretStore>) -> Keyring {
        Keyring {
            store: Some(store),
            force_new_token: false,
        }
    }

    /// Keyring without a store: every lookup misses.
    pub fn unavailable() -> Keyring {
        Keyring::default()
    }

    /// Ignore stored entries, but still store new ones.
    #[inline]
    pub fn with_force_new_token(mut self, force_new_token: bool) -> Keyring {
        self.force_new_token = force_new_token;
        self
    }

    /// Whether a store is configured.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Cache key for the given authentication parameters.
    ///
    /// Consists of the values of all parameters that affect the resulting
    /// token, ordered by parameter name and joined with `/`. Missing values
    /// are replaced with `?`. The password is never part of the key.
    pub fn key_for(auth_url: &str, credentials: &Credentials) -> String {
        let scope = credentials.scope();
        let project = scope.project.as_ref();
        let project_domain = project.and_then(|p| p.domain.as_ref());
        let (token, user, user_domain) = match credentials {
            Credentials::Password(pw) => (None, Some(&pw.user), pw.user_domain.as_ref()),
            Credentials::Token(tok) => (Some(tok.token.as_str()), None, None),
        };

        // Ordered by parameter name: auth_url, domain_id, domain_name,
        // project_domain_id, project_domain_name, project_id, project_name,
        // token, trust_id, user_domain_id, user_domain_name, user_id, username.
        let values = [
            Some(normalize_url(auth_url)),
            scope.domain.as_ref().and_then(IdOrName::id),
            scope.domain.as_ref().and_then(IdOrName::name),
            project_domain.and_then(IdOrName::id),
            project_domain.and_then(IdOrName::name),
            project.and_then(|p| p.project.id()),
            project.and_then(|p| p.project.name()),
            token,
            scope.trust_id.as_deref(),
            user_domain.and_then(IdOrName::id),
            user_domain.and_then(IdOrName::name),
            user.and_then(IdOrName::id),
            user.and_then(IdOrName::name),
        ];
        values
            .iter()
            .map(|value| value.unwrap_or("?"))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Load a stored entry unless it will expire within `threshold`.
    pub(crate) fn load(&self, key: &str, threshold: Duration) -> Option<AccessInfo> {
        if self.force_new_token {
            return None;
        }
        let store = match self.store {
            Some(ref store) => store,
            None => {
                warn!("No secret store available, access information will not be cached");
                return None;
            }
        };

        let raw = match store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot read from the secret store: {}", e);
                return None;
            }
        };
        let info: AccessInfo = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(e) => {
                warn!("Ignoring a corrupted secret store entry: {}", e);
                return None;
            }
        };

        if info.will_expire_soon(threshold) {
            debug!("Ignoring a stored token that expires soon");
            None
        } else {
            debug!("Using a stored token for user {}", info.user_id());
            Some(info)
        }
    }

    /// Store an entry, logging any failure.
    pub(crate) fn store(&self, key: &str, info: &AccessInfo) {
        let store = match self.store {
            Some(ref store) => store,
            None => return,
        };
        match serde_json::to_string(info) {
            Ok(raw) => {
                if let Err(e) = store.set(key, &raw) {
                    warn!("Cannot write to the secret store: {}", e);
                }
            }
            Err(e) => warn!("Cannot serialize access information: {}", e),
        }
    }
}
