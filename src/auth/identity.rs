// Copyright 2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Identity plugin: token caching and re-authentication.

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use log::{debug, info, trace};
use reqwest::Url;
use static_assertions::assert_impl_all;
use tokio::sync::RwLock;

use super::base::{AuthPlugin, EndpointFilter};
use crate::discovery::DiscoveryCache;
use crate::http::HttpClient;
use crate::identity::{self, AccessInfo, Credentials, IdentityVersion};
use crate::keyring::Keyring;
use crate::utils::{normalize_url, parse_url};
use crate::{IdOrName, Result};

/// Default time before expiration when a token is considered stale.
pub const DEFAULT_STALE_DURATION: i64 = 30;

/// Observable state of an identity plugin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PluginState {
    /// No access information is cached.
    Unauthenticated,
    /// Cached access information is valid.
    Authenticated,
    /// Cached access information expires within the stale duration.
    Stale,
}

/// Authentication plugin using a specific Identity API version.
///
/// The access information is obtained on first use and cached. It is
/// replaced when it is about to expire (unless re-authentication is
/// disabled) or after [invalidate](trait.AuthPlugin.html#tymethod.invalidate).
/// A failed authentication leaves the cache untouched.
///
/// ```rust,no_run
/// # async fn example() -> keystoneauth::Result<()> {
/// use keystoneauth::IdOrName;
/// use keystoneauth::auth::IdentityPlugin;
///
/// let auth = IdentityPlugin::v3_password(
///     "https://cloud.local/identity/v3",
///     IdOrName::from_name("admin"),
///     "pa$$w0rd",
/// )?
/// .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));
///
/// let session = keystoneauth::Session::new(auth)?;
/// let token = session.get_token().await?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct IdentityPlugin {
    auth_url: String,
    version: IdentityVersion,
    credentials: Credentials,
    cached: RwLock<Option<Arc<AccessInfo>>>,
    discovery: Arc<DiscoveryCache>,
    reauthenticate: bool,
    stale_duration: Duration,
    keyring: Option<Keyring>,
}

assert_impl_all!(IdentityPlugin: Send, Sync);

impl IdentityPlugin {
    /// Create a plugin for the versioned Identity endpoint `auth_url`.
    pub fn new<U: AsRef<str>>(
        auth_url: U,
        version: IdentityVersion,
        credentials: Credentials,
    ) -> Result<IdentityPlugin> {
        let auth_url = auth_url.as_ref();
        let _ = parse_url(auth_url)?;
        Ok(IdentityPlugin {
            auth_url: normalize_url(auth_url).to_string(),
            version,
            credentials,
            cached: RwLock::new(None),
            discovery: Arc::new(DiscoveryCache::new()),
            reauthenticate: true,
            stale_duration: Duration::seconds(DEFAULT_STALE_DURATION),
            keyring: None,
        })
    }

    /// Password authentication using Identity API v2.
    pub fn v2_password<U, S>(auth_url: U, user: IdOrName, password: S) -> Result<IdentityPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        IdentityPlugin::new(
            auth_url,
            IdentityVersion::V2,
            Credentials::password(user, password),
        )
    }

    /// Password authentication using Identity API v3.
    ///
    /// Use [with_user_domain](#method.with_user_domain) when the user is
    /// given by name.
    pub fn v3_password<U, S>(auth_url: U, user: IdOrName, password: S) -> Result<IdentityPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        IdentityPlugin::new(
            auth_url,
            IdentityVersion::V3,
            Credentials::password(user, password),
        )
    }

    /// Token authentication using Identity API v2.
    pub fn v2_token<U, S>(auth_url: U, token: S) -> Result<IdentityPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        IdentityPlugin::new(auth_url, IdentityVersion::V2, Credentials::token(token))
    }

    /// Token authentication using Identity API v3.
    pub fn v3_token<U, S>(auth_url: U, token: S) -> Result<IdentityPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        IdentityPlugin::new(auth_url, IdentityVersion::V3, Credentials::token(token))
    }

    /// Set the domain of the user (password credentials only).
    #[inline]
    pub fn with_user_domain(mut self, domain: IdOrName) -> IdentityPlugin {
        self.credentials = self.credentials.with_user_domain(domain);
        self
    }

    /// Scope the token to a project.
    #[inline]
    pub fn with_project_scope(
        mut self,
        project: IdOrName,
        domain: impl Into<Option<IdOrName>>,
    ) -> IdentityPlugin {
        self.credentials = self.credentials.with_project_scope(project, domain);
        self
    }

    /// Scope the token to a domain (Identity API v3 only).
    #[inline]
    pub fn with_domain_scope(mut self, domain: IdOrName) -> IdentityPlugin {
        self.credentials = self.credentials.with_domain_scope(domain);
        self
    }

    /// Use a trust for delegation.
    #[inline]
    pub fn with_trust<S: Into<String>>(mut self, trust_id: S) -> IdentityPlugin {
        self.credentials = self.credentials.with_trust(trust_id);
        self
    }

    /// Whether to authenticate again when the token is about to expire.
    ///
    /// Enabled by default. When disabled, a stale token keeps being returned.
    #[inline]
    pub fn with_reauthenticate(mut self, reauthenticate: bool) -> IdentityPlugin {
        self.reauthenticate = reauthenticate;
        self
    }

    /// Time before expiration when a token is considered stale.
    #[inline]
    pub fn with_stale_duration(mut self, stale_duration: Duration) -> IdentityPlugin {
        self.stale_duration = stale_duration;
        self
    }

    /// Seed the cache with existing access information.
    #[inline]
    pub fn with_access_info(self, info: AccessInfo) -> IdentityPlugin {
        IdentityPlugin {
            cached: RwLock::new(Some(Arc::new(info))),
            ..self
        }
    }

    /// Use a shared discovery cache.
    #[inline]
    pub fn with_discovery_cache(mut self, discovery: Arc<DiscoveryCache>) -> IdentityPlugin {
        self.discovery = discovery;
        self
    }

    /// Cache access information in a secret store.
    #[inline]
    pub fn with_keyring(mut self, keyring: Keyring) -> IdentityPlugin {
        self.keyring = Some(keyring);
        self
    }

    /// Authentication URL.
    #[inline]
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Identity API version in use.
    #[inline]
    pub fn version(&self) -> IdentityVersion {
        self.version
    }

    /// Credentials in use.
    #[inline]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Discovery cache in use.
    #[inline]
    pub fn discovery_cache(&self) -> &Arc<DiscoveryCache> {
        &self.discovery
    }

    /// Current state of the plugin.
    pub async fn state(&self) -> PluginState {
        match self.cached.read().await.deref() {
            None => PluginState::Unauthenticated,
            Some(info) if info.will_expire_soon(self.stale_duration) => PluginState::Stale,
            Some(_) => PluginState::Authenticated,
        }
    }

    /// Cached access information without any network access.
    pub async fn access_info(&self) -> Option<Arc<AccessInfo>> {
        self.cached.read().await.clone()
    }

    /// Replace the cached access information.
    pub async fn set_access_info(&self, info: AccessInfo) {
        *self.cached.write().await = Some(Arc::new(info));
    }

    /// Get valid access information, authenticating if needed.
    pub async fn get_access(&self, client: &dyn HttpClient) -> Result<Arc<AccessInfo>> {
        // Executed for every request, so start with a read lock.
        if let Some(info) = self.usable(&*self.cached.read().await) {
            return Ok(info);
        }

        let mut lock = self.cached.write().await;
        // Another task may have authenticated while we were waiting.
        if let Some(info) = self.usable(&*lock) {
            return Ok(info);
        }

        let info = Arc::new(self.authenticate(client).await?);
        *lock = Some(Arc::clone(&info));
        Ok(info)
    }

    fn usable(&self, cached: &Option<Arc<AccessInfo>>) -> Option<Arc<AccessInfo>> {
        let info = cached.as_ref()?;
        if !self.reauthenticate || !info.will_expire_soon(self.stale_duration) {
            Some(Arc::clone(info))
        } else {
            trace!("Cached token expires within {}", self.stale_duration);
            None
        }
    }

    async fn authenticate(&self, client: &dyn HttpClient) -> Result<AccessInfo> {
        self.credentials.validate()?;

        let key = self
            .keyring
            .as_ref()
            .map(|_| Keyring::key_for(&self.auth_url, &self.credentials));
        if let (Some(keyring), Some(key)) = (&self.keyring, &key) {
            if let Some(info) = keyring.load(key, self.stale_duration) {
                return Ok(info);
            }
        }

        debug!(
            "Authenticating at {} using Identity API {}",
            self.auth_url, self.version
        );
        let info =
            identity::authenticate(client, &self.auth_url, &self.credentials, self.version).await?;
        info!(
            "Received a new token for user {}, expiring at {}",
            info.user_id(),
            info.expires_at()
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| String::from("unknown time"))
        );

        if let (Some(keyring), Some(key)) = (&self.keyring, &key) {
            keyring.store(key, &info);
        }
        Ok(info)
    }
}

#[async_trait]
impl AuthPlugin for IdentityPlugin {
    async fn get_token(&self, client: &dyn HttpClient) -> Result<String> {
        let info = self.get_access(client).await?;
        Ok(info.token().to_string())
    }

    async fn get_endpoint(&self, client: &dyn HttpClient, filter: &EndpointFilter) -> Result<Url> {
        debug!("Requesting a catalog endpoint for {:?}", filter);
        let info = self.get_access(client).await?;
        let url = info.url_for(
            &filter.service_type,
            filter.interface(),
            filter.region.as_deref(),
        )?;

        match filter.version {
            Some(version) => {
                let result = self.discovery.discover(client, url.as_str()).await?;
                let data = result.url_for_version(version, filter.allow_unstable)?;
                debug!(
                    "Using version {} of {} at {}",
                    data.version, filter.service_type, data.url
                );
                Ok(data.url.clone())
            }
            None => Ok(url),
        }
    }

    async fn invalidate(&self) -> bool {
        self.cached.write().await.take().is_some()
    }
}
