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

//! Version-agnostic authentication.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use log::{debug, info};
use reqwest::Url;
use static_assertions::assert_impl_all;
use tokio::sync::OnceCell;

use super::base::{AuthPlugin, EndpointFilter};
use super::identity::{IdentityPlugin, PluginState, DEFAULT_STALE_DURATION};
use crate::discovery::{DiscoveryCache, DiscoveryResult};
use crate::http::HttpClient;
use crate::identity::{Credentials, IdentityVersion};
use crate::keyring::Keyring;
use crate::utils::{normalize_url, parse_url};
use crate::{Error, ErrorKind, IdOrName, Result};

/// Authentication plugin that picks the Identity API version itself.
///
/// `auth_url` is the unversioned (or any) Identity endpoint. On first use the
/// plugin runs version discovery against it and creates an
/// [IdentityPlugin](struct.IdentityPlugin.html) for the chosen version
/// (see [select_version]). The choice is kept for the lifetime of the plugin.
#[derive(Debug)]
pub struct GenericPlugin {
    auth_url: String,
    credentials: Credentials,
    discovery: Arc<DiscoveryCache>,
    reauthenticate: bool,
    stale_duration: Duration,
    keyring: Option<Keyring>,
    delegate: OnceCell<IdentityPlugin>,
}

assert_impl_all!(GenericPlugin: Send, Sync);

/// Choose the Identity API version for the credentials.
///
/// 1. If the credentials carry v3-only fields (any domain) and v3 is
///    available, use v3.
/// 2. Otherwise, if v2 is available, use v2.
/// 3. Otherwise, if v3 is available, use v3.
///
/// Fails with `DiscoveryFailure` if neither version is available.
pub fn select_version(
    result: &DiscoveryResult,
    credentials: &Credentials,
) -> Result<(IdentityVersion, Url)> {
    let find = |version: IdentityVersion| {
        result
            .url_for_version(version.api_version(), false)
            .ok()
            .map(|data| (version, data.url.clone()))
    };
    let v2 = find(IdentityVersion::V2);
    let v3 = find(IdentityVersion::V3);

    let selected = if credentials.has_v3_fields() && v3.is_some() {
        v3
    } else {
        v2.or(v3)
    };
    selected.ok_or_else(|| {
        Error::new(
            ErrorKind::DiscoveryFailure,
            format!("no usable auth URL found at {}", result.url()),
        )
    })
}

impl GenericPlugin {
    /// Create a plugin with the given credentials.
    pub fn new<U: AsRef<str>>(auth_url: U, credentials: Credentials) -> Result<GenericPlugin> {
        let auth_url = auth_url.as_ref();
        let _ = parse_url(auth_url)?;
        Ok(GenericPlugin {
            auth_url: normalize_url(auth_url).to_string(),
            credentials,
            discovery: Arc::new(DiscoveryCache::new()),
            reauthenticate: true,
            stale_duration: Duration::seconds(DEFAULT_STALE_DURATION),
            keyring: None,
            delegate: OnceCell::new(),
        })
    }

    /// Password authentication.
    pub fn password<U, S>(auth_url: U, user: IdOrName, password: S) -> Result<GenericPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        GenericPlugin::new(auth_url, Credentials::password(user, password))
    }

    /// Token authentication.
    pub fn token<U, S>(auth_url: U, token: S) -> Result<GenericPlugin>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        GenericPlugin::new(auth_url, Credentials::token(token))
    }

    /// Set the domain of the user (password credentials only).
    #[inline]
    pub fn with_user_domain(mut self, domain: IdOrName) -> GenericPlugin {
        self.credentials = self.credentials.with_user_domain(domain);
        self
    }

    /// Scope the token to a project.
    #[inline]
    pub fn with_project_scope(
        mut self,
        project: IdOrName,
        domain: impl Into<Option<IdOrName>>,
    ) -> GenericPlugin {
        self.credentials = self.credentials.with_project_scope(project, domain);
        self
    }

    /// Scope the token to a domain.
    #[inline]
    pub fn with_domain_scope(mut self, domain: IdOrName) -> GenericPlugin {
        self.credentials = self.credentials.with_domain_scope(domain);
        self
    }

    /// Use a trust for delegation.
    #[inline]
    pub fn with_trust<S: Into<String>>(mut self, trust_id: S) -> GenericPlugin {
        self.credentials = self.credentials.with_trust(trust_id);
        self
    }

    /// Whether to authenticate again when the token is about to expire.
    #[inline]
    pub fn with_reauthenticate(mut self, reauthenticate: bool) -> GenericPlugin {
        self.reauthenticate = reauthenticate;
        self
    }

    /// Time before expiration when a token is considered stale.
    #[inline]
    pub fn with_stale_duration(mut self, stale_duration: Duration) -> GenericPlugin {
        self.stale_duration = stale_duration;
        self
    }

    /// Use a shared discovery cache.
    #[inline]
    pub fn with_discovery_cache(mut self, discovery: Arc<DiscoveryCache>) -> GenericPlugin {
        self.discovery = discovery;
        self
    }

    /// Cache access information in a secret store.
    #[inline]
    pub fn with_keyring(mut self, keyring: Keyring) -> GenericPlugin {
        self.keyring = Some(keyring);
        self
    }

    /// Authentication URL.
    #[inline]
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Credentials in use.
    #[inline]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The chosen Identity API version, if already known.
    #[inline]
    pub fn delegate_version(&self) -> Option<IdentityVersion> {
        self.delegate.get().map(IdentityPlugin::version)
    }

    /// The underlying plugin, if already created.
    #[inline]
    pub fn delegate(&self) -> Option<&IdentityPlugin> {
        self.delegate.get()
    }

    /// Current state of the plugin.
    pub async fn state(&self) -> PluginState {
        match self.delegate.get() {
            Some(delegate) => delegate.state().await,
            None => PluginState::Unauthenticated,
        }
    }

    async fn get_delegate(&self, client: &dyn HttpClient) -> Result<&IdentityPlugin> {
        self.delegate
            .get_or_try_init(|| async {
                let result = self.discovery.discover(client, &self.auth_url).await?;
                let (version, url) = select_version(&result, &self.credentials)?;
                info!("Using Identity API {} at {}", version, url);
                self.make_delegate(version, &url)
            })
            .await
    }

    fn make_delegate(&self, version: IdentityVersion, url: &Url) -> Result<IdentityPlugin> {
        let mut delegate = IdentityPlugin::new(url.as_str(), version, self.credentials.clone())?
            .with_reauthenticate(self.reauthenticate)
            .with_stale_duration(self.stale_duration)
            .with_discovery_cache(Arc::clone(&self.discovery));
        if let Some(ref keyring) = self.keyring {
            delegate = delegate.with_keyring(keyring.clone());
        }
        Ok(delegate)
    }
}

#[async_trait]
impl AuthPlugin for GenericPlugin {
    async fn get_token(&self, client: &dyn HttpClient) -> Result<String> {
        self.get_delegate(client).await?.get_token(client).await
    }

    async fn get_endpoint(&self, client: &dyn HttpClient, filter: &EndpointFilter) -> Result<Url> {
        self.get_delegate(client)
            .await?
            .get_endpoint(client, filter)
            .await
    }

    async fn invalidate(&self) -> bool {
        match self.delegate.get() {
            Some(delegate) => delegate.invalidate().await,
            None => {
                debug!("Nothing to invalidate, no authentication was done yet");
                false
            }
        }
    }
}
