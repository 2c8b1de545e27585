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

//! API version discovery.
//!
//! A versioned API root (e.g. `https://cloud.local/identity`) returns a
//! document listing the versions it serves. [DiscoveryCache] fetches and
//! remembers these documents, [DiscoveryResult::url_for_version] picks the
//! best matching version.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, trace, warn};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use static_assertions::assert_impl_all;
use tokio::sync::OnceCell;

use crate::http::{send_following_redirects, HttpClient, HttpRequest};
use crate::utils::{normalize_url, parse_url, trim_last_segment};
use crate::{ApiVersion, Error, ErrorKind, Result};

/// Stability of an API version.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum VersionStatus {
    /// Stable, supported or deprecated version.
    Stable,
    /// Experimental, alpha or beta version.
    Unstable,
}

/// A version advertised by a discovery document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionData {
    /// Version number.
    pub version: ApiVersion,
    /// Concrete versioned URL.
    pub url: Url,
    /// Normalized stability.
    pub status: VersionStatus,
    /// Status exactly as the server reported it.
    pub raw_status: String,
}

/// Versions available under one base URL.
#[derive(Clone, Debug)]
pub struct DiscoveryResult {
    url: String,
    versions: BTreeMap<ApiVersion, VersionData>,
    raw_versions: Vec<Value>,
}

/// Cache of discovery results keyed by normalized URL.
///
/// Every URL is probed at most once: concurrent callers wait for the probe
/// in flight instead of issuing their own. Failed probes are not cached.
#[derive(Default)]
pub struct DiscoveryCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<DiscoveryResult>>>>>,
}

assert_impl_all!(DiscoveryCache: Send, Sync);

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    #[serde(default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionList {
    Values { values: Vec<Value> },
    Plain(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    versions: Option<VersionList>,
}

impl VersionStatus {
    /// Classify a status string reported by a server.
    pub fn from_raw(status: &str) -> VersionStatus {
        match status.to_lowercase().as_str() {
            "experimental" | "alpha" | "beta" | "unstable" => VersionStatus::Unstable,
            _ => VersionStatus::Stable,
        }
    }
}

impl DiscoveryResult {
    /// Parse a discovery document received from `url`.
    ///
    /// Accepts `{"version": {...}}`, `{"versions": {"values": [...]}}` and
    /// `{"versions": [...]}`. Entries without a valid ID or a self link are
    /// skipped, a document without any usable entry is an error.
    pub fn from_json(url: &str, body: &Value) -> Result<DiscoveryResult> {
        let doc: DiscoveryDocument = serde_json::from_value(body.clone()).map_err(|e| {
            Error::new(
                ErrorKind::InvalidResponse,
                format!("Malformed version discovery document at {}: {}", url, e),
            )
        })?;

        let raw_versions = match (doc.version, doc.versions) {
            (Some(single), _) => vec![single],
            (None, Some(VersionList::Values { values })) => values,
            (None, Some(VersionList::Plain(values))) => values,
            (None, None) => Vec::new(),
        };

        let base = parse_url(url)?;
        let mut versions = BTreeMap::new();
        for raw in &raw_versions {
            let data = match parse_entry(&base, raw) {
                Some(data) => data,
                None => {
                    warn!("Skipping invalid version entry {} from {}", raw, url);
                    continue;
                }
            };
            if versions.contains_key(&data.version) {
                warn!(
                    "Ignoring duplicate version {} received from {}",
                    data.version, url
                );
                continue;
            }
            let _ = versions.insert(data.version, data);
        }

        if versions.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidResponse,
                format!("No usable versions found in discovery document at {}", url),
            ));
        }

        Ok(DiscoveryResult {
            url: normalize_url(url).to_string(),
            versions,
            raw_versions,
        })
    }

    /// URL this result was discovered at.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// All versions ordered from the oldest to the newest.
    pub fn versions(&self) -> impl Iterator<Item = &VersionData> {
        self.versions.values()
    }

    /// Version entries exactly as they were received.
    #[inline]
    pub fn raw_versions(&self) -> &[Value] {
        &self.raw_versions
    }

    /// Exact version lookup.
    #[inline]
    pub fn get(&self, version: ApiVersion) -> Option<&VersionData> {
        self.versions.get(&version)
    }

    /// Best version compatible with `required`.
    ///
    /// A candidate has the same major version and a minor version no older
    /// than required. Unstable versions are only considered when
    /// `allow_unstable` is set. Stable candidates are preferred, then the
    /// smallest minor version.
    pub fn url_for_version(
        &self,
        required: ApiVersion,
        allow_unstable: bool,
    ) -> Result<&VersionData> {
        self.versions
            .values()
            .filter(|v| v.version.is_compatible_with(required))
            .filter(|v| allow_unstable || v.status == VersionStatus::Stable)
            .min_by_key(|v| (v.status != VersionStatus::Stable, v.version.1))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::VersionNotAvailable,
                    format!(
                        "No version compatible with {} is available at {}",
                        required, self.url
                    ),
                )
            })
    }
}

fn parse_entry(base: &Url, raw: &Value) -> Option<VersionData> {
    let entry: VersionEntry = serde_json::from_value(raw.clone()).ok()?;
    let version = entry.id.parse().ok()?;
    let href = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("self"))?
        .href
        .as_str();
    let url = base.join(href).ok()?;
    let raw_status = entry.status.unwrap_or_else(|| String::from("stable"));
    Some(VersionData {
        version,
        url,
        status: VersionStatus::from_raw(&raw_status),
        raw_status,
    })
}

impl DiscoveryCache {
    /// Create an empty cache.
    pub fn new() -> DiscoveryCache {
        DiscoveryCache::default()
    }

    fn cell(&self, key: &str) -> Arc<OnceCell<Arc<DiscoveryResult>>> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(entries.entry(key.to_string()).or_default())
    }

    /// Cached result for a URL, without any network access.
    pub fn get(&self, url: &str) -> Option<Arc<DiscoveryResult>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(normalize_url(url))
            .and_then(|cell| cell.get().cloned())
    }

    /// Discover versions available at `url`.
    ///
    /// Returns a cached result when there is one. Otherwise probes the URL,
    /// and if that fails, probes once more with the last path segment
    /// removed. The result is cached under every URL that was tried.
    pub async fn discover(
        &self,
        client: &dyn HttpClient,
        url: &str,
    ) -> Result<Arc<DiscoveryResult>> {
        let key = normalize_url(url);
        let cell = self.cell(key);
        let result = cell
            .get_or_try_init(|| self.discover_uncached(client, key))
            .await?;
        Ok(Arc::clone(result))
    }

    async fn discover_uncached(
        &self,
        client: &dyn HttpClient,
        url: &str,
    ) -> Result<Arc<DiscoveryResult>> {
        let first_error = match probe(client, url).await {
            Ok(result) => return Ok(Arc::new(result)),
            Err(e) => e,
        };

        let trimmed = match trim_last_segment(url) {
            Some(trimmed) => trimmed,
            None => return Err(discovery_failure(url, &first_error)),
        };
        debug!(
            "Discovery at {} failed ({}), retrying at {}",
            url, first_error, trimmed
        );

        let cell = self.cell(&trimmed);
        let result = cell
            .get_or_try_init(|| async {
                probe(client, &trimmed)
                    .await
                    .map(Arc::new)
                    .map_err(|e| discovery_failure(&trimmed, &e))
            })
            .await?;
        Ok(Arc::clone(result))
    }
}

impl fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut urls: Vec<_> = entries
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(url, _)| url.as_str())
            .collect();
        urls.sort_unstable();
        f.debug_struct("DiscoveryCache").field("urls", &urls).finish()
    }
}

fn discovery_failure(url: &str, cause: &Error) -> Error {
    Error::new_with_details(
        ErrorKind::DiscoveryFailure,
        cause.status(),
        Some(format!("Unable to discover versions at {}: {}", url, cause)),
    )
}

async fn probe(client: &dyn HttpClient, url: &str) -> Result<DiscoveryResult> {
    debug!("Probing {} for available versions", url);
    let request = HttpRequest::new(Method::GET, parse_url(url)?).accept_json();
    let resp = send_following_redirects(client, request).await?;
    // Keystone answers its root with 300 Multiple Choices.
    if !resp.is_success() && resp.status != StatusCode::MULTIPLE_CHOICES {
        let kind = Error::kind_for_status(resp.status);
        return Err(Error::from_status(kind, resp.status, &resp.body));
    }

    let body: Value = resp.json()?;
    let result = DiscoveryResult::from_json(url, &body)?;
    trace!("Discovered versions at {}: {:?}", url, result.versions);
    Ok(result)
}
