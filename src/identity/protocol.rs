// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
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

//! JSON structures and protocol bits for the Identity V2 and V3 APIs.

#![allow(missing_docs)]

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, ErrorKind, IdOrName, Result};

// Requests borrow from the credentials and are never printed: they contain
// passwords.

#[derive(Serialize)]
pub struct V2AuthRoot<'a> {
    pub auth: V2Auth<'a>,
}

#[derive(Default, Serialize)]
pub struct V2Auth<'a> {
    #[serde(
        rename = "passwordCredentials",
        skip_serializing_if = "Option::is_none"
    )]
    pub password_credentials: Option<V2PasswordCredentials<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenId<'a>>,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<&'a str>,
    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_id: Option<&'a str>,
}

#[derive(Serialize)]
pub struct V2PasswordCredentials<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct TokenId<'a> {
    pub id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct V2AccessRoot {
    pub access: V2Access,
}

#[derive(Debug, Deserialize)]
pub struct V2Access {
    pub token: Option<V2TokenInfo>,
    pub user: Option<V2User>,
    #[serde(rename = "serviceCatalog")]
    pub service_catalog: Option<Vec<V2Service>>,
    pub trust: Option<TrustRef>,
}

#[derive(Debug, Deserialize)]
pub struct V2TokenInfo {
    pub id: Option<String>,
    pub expires: Option<String>,
    pub tenant: Option<IdAndName>,
}

#[derive(Debug, Deserialize)]
pub struct V2User {
    pub id: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct V2Service {
    #[serde(rename = "type")]
    pub service_type: String,
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<V2Endpoint>,
}

#[derive(Debug, Deserialize)]
pub struct V2Endpoint {
    pub region: Option<String>,
    #[serde(rename = "publicURL")]
    pub public_url: Option<String>,
    #[serde(rename = "internalURL")]
    pub internal_url: Option<String>,
    #[serde(rename = "adminURL")]
    pub admin_url: Option<String>,
}

#[derive(Serialize)]
pub struct V3AuthRoot<'a> {
    pub auth: V3Auth<'a>,
}

#[derive(Serialize)]
pub struct V3Auth<'a> {
    pub identity: V3Identity<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<V3Scope<'a>>,
}

#[derive(Serialize)]
pub struct V3Identity<'a> {
    pub methods: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<V3PasswordMethod<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenId<'a>>,
}

#[derive(Serialize)]
pub struct V3PasswordMethod<'a> {
    pub user: V3UserAndPassword<'a>,
}

#[derive(Serialize)]
pub struct V3UserAndPassword<'a> {
    #[serde(flatten)]
    pub user: &'a IdOrName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<&'a IdOrName>,
    pub password: &'a str,
}

#[derive(Default, Serialize)]
pub struct V3Scope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<V3Project<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<&'a IdOrName>,
    #[serde(rename = "OS-TRUST:trust", skip_serializing_if = "Option::is_none")]
    pub trust: Option<TokenId<'a>>,
}

#[derive(Serialize)]
pub struct V3Project<'a> {
    #[serde(flatten)]
    pub project: &'a IdOrName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<&'a IdOrName>,
}

#[derive(Debug, Deserialize)]
pub struct V3TokenRoot {
    pub token: V3Token,
}

#[derive(Debug, Deserialize)]
pub struct V3Token {
    pub expires_at: Option<String>,
    pub user: Option<V3Owned>,
    pub project: Option<V3Owned>,
    pub domain: Option<IdAndName>,
    #[serde(rename = "OS-TRUST:trust")]
    pub trust: Option<TrustRef>,
    pub catalog: Option<Vec<V3Service>>,
}

/// A user or a project together with its domain.
#[derive(Debug, Deserialize)]
pub struct V3Owned {
    pub id: Option<String>,
    pub name: Option<String>,
    pub domain: Option<IdAndName>,
}

#[derive(Debug, Deserialize)]
pub struct V3Service {
    #[serde(rename = "type")]
    pub service_type: String,
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<V3Endpoint>,
}

#[derive(Debug, Deserialize)]
pub struct V3Endpoint {
    pub interface: String,
    pub region: Option<String>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct IdAndName {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrustRef {
    pub id: String,
}

/// Parse an expiration timestamp.
///
/// Keystone returns RFC 3339, older deployments may omit the time zone, which
/// then means UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            Error::new(
                ErrorKind::AuthorizationFailure,
                format!("Invalid token expiration time {}: {}", value, e),
            )
        })
}
