// Copyright 2019-2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Identity API wire protocols and the data they produce.
//!
//! Both Identity API v2 (`POST /tokens`) and v3 (`POST /auth/tokens`) are
//! supported. [authenticate] performs a single authentication request and
//! returns an [AccessInfo], caching and refreshing are the job of
//! [IdentityPlugin](../auth/struct.IdentityPlugin.html).

mod access;
mod catalog;
mod credentials;
pub(crate) mod protocol;
mod v2;
mod v3;

use std::fmt;

use log::debug;
use reqwest::Method;
use serde::Serialize;

use crate::http::{send_following_redirects, HttpClient, HttpRequest, HttpResponse};
use crate::utils::parse_url;
use crate::{ApiVersion, Error, ErrorKind, Result};

pub use self::access::AccessInfo;
pub use self::catalog::{Endpoint, InterfaceType, ServiceCatalog, ServiceEntry};
pub use self::credentials::{
    Credentials, PasswordCredentials, ProjectScope, ScopeRequest, TokenCredentials,
};

#[cfg(test)]
pub(crate) use self::catalog::test::demo_catalog;

/// Identity API protocol version.
#[derive(Copy, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum IdentityVersion {
    /// Identity API v2 (deprecated upstream, still deployed).
    #[serde(rename = "v2")]
    V2,
    /// Identity API v3.
    #[serde(rename = "v3")]
    V3,
}

impl IdentityVersion {
    /// The minimum API version discovery has to find for this protocol.
    #[inline]
    pub fn api_version(&self) -> ApiVersion {
        match self {
            IdentityVersion::V2 => ApiVersion(2, 0),
            IdentityVersion::V3 => ApiVersion(3, 0),
        }
    }
}

impl fmt::Display for IdentityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentityVersion::V2 => "v2",
            IdentityVersion::V3 => "v3",
        })
    }
}

/// Authenticate once using the given protocol version.
///
/// `auth_url` is the versioned Identity endpoint, e.g.
/// `https://cloud.local/identity/v3`. Scope conflicts are detected before
/// any request is sent.
pub async fn authenticate(
    client: &dyn HttpClient,
    auth_url: &str,
    credentials: &Credentials,
    version: IdentityVersion,
) -> Result<AccessInfo> {
    match version {
        IdentityVersion::V2 => v2::authenticate(client, auth_url, credentials).await,
        IdentityVersion::V3 => v3::authenticate(client, auth_url, credentials).await,
    }
}

#[inline]
pub(crate) fn auth_failure<S: Into<String>>(message: S) -> Error {
    Error::new(ErrorKind::AuthorizationFailure, message)
}

/// Send an authentication request, following redirects.
///
/// Unsuccessful responses become `AuthorizationFailure` with the status and
/// the server message attached.
pub(crate) async fn post_auth_request<T: Serialize>(
    client: &dyn HttpClient,
    url: &str,
    body: &T,
    token: Option<&str>,
) -> Result<HttpResponse> {
    let mut request = HttpRequest::new(Method::POST, parse_url(url)?)
        .accept_json()
        .with_json(body)?;
    if let Some(token) = token {
        request = request.with_auth_token(token)?;
    }

    let resp = send_following_redirects(client, request).await?;
    if resp.is_success() {
        Ok(resp)
    } else {
        debug!(
            "Authentication at {} failed with status {}",
            resp.url, resp.status
        );
        Err(Error::from_status(
            ErrorKind::AuthorizationFailure,
            resp.status,
            &resp.body,
        ))
    }
}
