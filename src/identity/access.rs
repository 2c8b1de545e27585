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

//! Result of a successful authentication.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use log::trace;
use reqwest::Url;
use serde::de::Error as DeserError;
use serde::{Deserialize, Deserializer};

use super::catalog::{InterfaceType, ServiceCatalog};
use super::IdentityVersion;
use crate::{Error, ErrorKind, Result};

/// Snapshot of a successful authentication: token, identity, scope and catalog.
///
/// Never modified after creation. A re-authentication produces a new value
/// that replaces the old one as a whole.
#[derive(Clone, Deserialize, PartialEq, Eq, Serialize)]
pub struct AccessInfo {
    #[serde(deserialize_with = "non_empty")]
    token: String,
    expires_at: Option<DateTime<Utc>>,
    version: IdentityVersion,
    #[serde(deserialize_with = "non_empty")]
    user_id: String,
    user_name: Option<String>,
    user_domain_id: Option<String>,
    user_domain_name: Option<String>,
    project_id: Option<String>,
    project_name: Option<String>,
    project_domain_id: Option<String>,
    project_domain_name: Option<String>,
    domain_id: Option<String>,
    domain_name: Option<String>,
    trust_id: Option<String>,
    #[serde(default)]
    catalog: ServiceCatalog,
}

fn non_empty<'de, D>(deserializer: D) -> ::std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.is_empty() {
        Err(D::Error::custom("value must not be empty"))
    } else {
        Ok(value)
    }
}

impl AccessInfo {
    /// Create an unscoped access info without a catalog.
    ///
    /// Both the token and the user ID must be non-empty.
    pub fn new<S1, S2>(version: IdentityVersion, token: S1, user_id: S2) -> Result<AccessInfo>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::new(
                ErrorKind::AuthorizationFailure,
                "Token didn't provide token_id",
            ));
        }
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(Error::new(
                ErrorKind::AuthorizationFailure,
                "Token didn't provide user_id",
            ));
        }

        Ok(AccessInfo {
            token,
            expires_at: None,
            version,
            user_id,
            user_name: None,
            user_domain_id: None,
            user_domain_name: None,
            project_id: None,
            project_name: None,
            project_domain_id: None,
            project_domain_name: None,
            domain_id: None,
            domain_name: None,
            trust_id: None,
            catalog: ServiceCatalog::default(),
        })
    }

    /// Set the expiration time.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> AccessInfo {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the user name.
    pub fn with_user_name<S: Into<String>>(mut self, name: S) -> AccessInfo {
        self.user_name = Some(name.into());
        self
    }

    /// Set the user domain.
    pub fn with_user_domain(mut self, id: Option<String>, name: Option<String>) -> AccessInfo {
        self.user_domain_id = id;
        self.user_domain_name = name;
        self
    }

    /// Scope to a project, removing any domain scope.
    pub fn with_project<S: Into<String>>(mut self, id: S, name: Option<String>) -> AccessInfo {
        self.project_id = Some(id.into());
        self.project_name = name;
        self.domain_id = None;
        self.domain_name = None;
        self
    }

    /// Set the domain of the scoped project.
    pub fn with_project_domain(mut self, id: Option<String>, name: Option<String>) -> AccessInfo {
        self.project_domain_id = id;
        self.project_domain_name = name;
        self
    }

    /// Scope to a domain, removing any project scope.
    pub fn with_domain<S: Into<String>>(mut self, id: S, name: Option<String>) -> AccessInfo {
        self.domain_id = Some(id.into());
        self.domain_name = name;
        self.project_id = None;
        self.project_name = None;
        self.project_domain_id = None;
        self.project_domain_name = None;
        self
    }

    /// Set the trust.
    pub fn with_trust_id<S: Into<String>>(mut self, trust_id: S) -> AccessInfo {
        self.trust_id = Some(trust_id.into());
        self
    }

    /// Set the service catalog.
    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> AccessInfo {
        self.catalog = catalog;
        self
    }

    /// Authentication token.
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiration time (if known).
    #[inline]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Identity API version that issued the token.
    #[inline]
    pub fn version(&self) -> IdentityVersion {
        self.version
    }

    /// User ID.
    #[inline]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// User name.
    #[inline]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// ID of the user domain.
    #[inline]
    pub fn user_domain_id(&self) -> Option<&str> {
        self.user_domain_id.as_deref()
    }

    /// Name of the user domain.
    #[inline]
    pub fn user_domain_name(&self) -> Option<&str> {
        self.user_domain_name.as_deref()
    }

    /// Project ID (if project scoped).
    #[inline]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Project name (if project scoped).
    #[inline]
    pub fn project_name(&self) -> Option<&str> {
        self.project_name.as_deref()
    }

    /// ID of the project domain.
    #[inline]
    pub fn project_domain_id(&self) -> Option<&str> {
        self.project_domain_id.as_deref()
    }

    /// Name of the project domain.
    #[inline]
    pub fn project_domain_name(&self) -> Option<&str> {
        self.project_domain_name.as_deref()
    }

    /// Domain ID (if domain scoped).
    #[inline]
    pub fn domain_id(&self) -> Option<&str> {
        self.domain_id.as_deref()
    }

    /// Domain name (if domain scoped).
    #[inline]
    pub fn domain_name(&self) -> Option<&str> {
        self.domain_name.as_deref()
    }

    /// Trust ID (if trust scoped).
    #[inline]
    pub fn trust_id(&self) -> Option<&str> {
        self.trust_id.as_deref()
    }

    /// Service catalog.
    #[inline]
    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Whether the token is scoped to a project.
    #[inline]
    pub fn is_project_scoped(&self) -> bool {
        self.project_id.is_some()
    }

    /// Whether the token is scoped to a domain.
    #[inline]
    pub fn is_domain_scoped(&self) -> bool {
        self.domain_id.is_some()
    }

    /// Whether the token was issued using a trust.
    #[inline]
    pub fn is_trust_scoped(&self) -> bool {
        self.trust_id.is_some()
    }

    /// Whether the token expires within `threshold` from now.
    ///
    /// A token without a known expiration time is considered expired.
    #[inline]
    pub fn will_expire_soon(&self, threshold: Duration) -> bool {
        self.will_expire_soon_at(Utc::now(), threshold)
    }

    /// Whether the token expires within `threshold` from `now`.
    ///
    /// The boundary is inclusive: remaining validity equal to the threshold
    /// counts as expiring.
    pub fn will_expire_soon_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let left = expires_at.signed_duration_since(now);
                trace!("Token is valid for {:?}", left);
                left <= threshold
            }
            None => true,
        }
    }

    /// URL of a service from the catalog.
    pub fn url_for(
        &self,
        service_type: &str,
        interface: InterfaceType,
        region: Option<&str>,
    ) -> Result<Url> {
        self.catalog.url_for(service_type, interface, region)
    }

    /// First admin endpoint of the identity service.
    pub fn management_url(&self) -> Option<Url> {
        self.catalog
            .url_for("identity", InterfaceType::Admin, None)
            .ok()
    }
}

impl fmt::Debug for AccessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.token.hash(&mut hasher);
        f.debug_struct("AccessInfo")
            .field("token", &format_args!("hash({})", hasher.finish()))
            .field("expires_at", &self.expires_at)
            .field("version", &self.version)
            .field("user_id", &self.user_id)
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .field("trust_id", &self.trust_id)
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
pub mod test {
    use chrono::{Duration, TimeZone, Utc};

    use super::AccessInfo;
    use crate::identity::catalog::test::demo_catalog;
    use crate::identity::IdentityVersion;
    use crate::ErrorKind;

    fn access() -> AccessInfo {
        AccessInfo::new(IdentityVersion::V3, "abcd", "u1")
            .unwrap()
            .with_catalog(demo_catalog())
    }

    #[test]
    fn test_new_requires_token_and_user() {
        let err = AccessInfo::new(IdentityVersion::V3, "", "u1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        let err = AccessInfo::new(IdentityVersion::V3, "abcd", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
    }

    #[test]
    fn test_scopes_are_exclusive() {
        let unscoped = access();
        assert!(!unscoped.is_project_scoped());
        assert!(!unscoped.is_domain_scoped());

        let project = access().with_project("p1", None);
        assert!(project.is_project_scoped());
        assert!(!project.is_domain_scoped());

        let domain = project.with_domain("default", Some("Default".into()));
        assert!(domain.is_domain_scoped());
        assert!(!domain.is_project_scoped());
    }

    #[test]
    fn test_will_expire_soon_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let info = access().with_expires_at(now + Duration::seconds(30));

        assert!(info.will_expire_soon_at(now, Duration::seconds(30)));
        assert!(info.will_expire_soon_at(now, Duration::seconds(31)));
        assert!(!info.will_expire_soon_at(now, Duration::seconds(29)));
        assert!(info.will_expire_soon_at(now + Duration::seconds(60), Duration::zero()));
    }

    #[test]
    fn test_missing_expiry_is_expired() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(access().will_expire_soon_at(now, Duration::zero()));
    }

    #[test]
    fn test_management_url() {
        assert_eq!(
            access().management_url().unwrap().as_str(),
            "https://admin.one:35357/v3"
        );
        let bare = AccessInfo::new(IdentityVersion::V2, "abcd", "u1").unwrap();
        assert!(bare.management_url().is_none());
    }

    #[test]
    fn test_deserialize_requires_token_and_user() {
        let mut value = serde_json::to_value(access()).unwrap();
        let parsed: AccessInfo = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(parsed, access());

        value["token"] = "".into();
        assert!(serde_json::from_value::<AccessInfo>(value.clone()).is_err());
        value["token"] = "abcd".into();
        value["user_id"] = "".into();
        assert!(serde_json::from_value::<AccessInfo>(value).is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let info = AccessInfo::new(IdentityVersion::V3, "gAAAAA-secret-token", "u1").unwrap();
        assert!(!format!("{:?}", info).contains("gAAAAA-secret-token"));
    }
}
