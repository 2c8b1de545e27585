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

//! Identity API v3 (`/auth/tokens`) authentication.

use log::{debug, error, warn};

use super::access::AccessInfo;
use super::catalog::{Endpoint, ServiceCatalog, ServiceEntry};
use super::credentials::Credentials;
use super::protocol::{self, parse_timestamp};
use super::{auth_failure, post_auth_request, IdentityVersion};
use crate::http::{HttpClient, SUBJECT_TOKEN_HEADER};
use crate::utils::url_join;
use crate::{IdOrName, Result};

const MISSING_SUBJECT_HEADER: &str = "Missing X-Subject-Token header";
const INVALID_SUBJECT_HEADER: &str = "Invalid X-Subject-Token header";

/// Authenticate against `{auth_url}/auth/tokens`.
pub(crate) async fn authenticate(
    client: &dyn HttpClient,
    auth_url: &str,
    credentials: &Credentials,
) -> Result<AccessInfo> {
    credentials.validate()?;
    let body = build_body(credentials);

    let token = match credentials {
        Credentials::Token(tok) => Some(tok.token.as_str()),
        Credentials::Password(_) => None,
    };
    let url = url_join(auth_url, "auth/tokens");
    debug!("Authenticating using Identity API v3 at {}", url);
    let resp = post_auth_request(client, &url, &body, token).await?;

    let subject_token = match resp.headers.get(SUBJECT_TOKEN_HEADER) {
        Some(hdr) => match hdr.to_str() {
            Ok(s) => s.to_string(),
            Err(e) => {
                error!(
                    "Invalid X-Subject-Token {:?} received from {}: {}",
                    hdr, resp.url, e
                );
                return Err(auth_failure(INVALID_SUBJECT_HEADER));
            }
        },
        None => {
            error!("No X-Subject-Token header received from {}", resp.url);
            return Err(auth_failure(MISSING_SUBJECT_HEADER));
        }
    };

    let root: protocol::V3TokenRoot = resp
        .json()
        .map_err(|e| auth_failure(format!("Malformed v3 token response: {}", e)))?;
    access_from_response(subject_token, root.token)
}

fn build_body(credentials: &Credentials) -> protocol::V3AuthRoot<'_> {
    let identity = match credentials {
        Credentials::Password(pw) => {
            // A user ID is globally unique, the domain only disambiguates names.
            let domain = match pw.user {
                IdOrName::Name(_) => pw.user_domain.as_ref(),
                IdOrName::Id(_) => None,
            };
            protocol::V3Identity {
                methods: vec!["password"],
                password: Some(protocol::V3PasswordMethod {
                    user: protocol::V3UserAndPassword {
                        user: &pw.user,
                        domain,
                        password: &pw.password,
                    },
                }),
                token: None,
            }
        }
        Credentials::Token(tok) => protocol::V3Identity {
            methods: vec!["token"],
            password: None,
            token: Some(protocol::TokenId { id: &tok.token }),
        },
    };

    let scope = credentials.scope();
    let v3_scope = if scope.is_empty() {
        None
    } else {
        Some(protocol::V3Scope {
            project: scope.project.as_ref().map(|p| protocol::V3Project {
                project: &p.project,
                domain: match p.project {
                    IdOrName::Name(_) => p.domain.as_ref(),
                    IdOrName::Id(_) => None,
                },
            }),
            domain: scope.domain.as_ref(),
            trust: scope
                .trust_id
                .as_deref()
                .map(|id| protocol::TokenId { id }),
        })
    };

    protocol::V3AuthRoot {
        auth: protocol::V3Auth {
            identity,
            scope: v3_scope,
        },
    }
}

fn access_from_response(token: String, body: protocol::V3Token) -> Result<AccessInfo> {
    let user = body
        .user
        .ok_or_else(|| auth_failure("Token didn't provide user_id"))?;
    let user_id = user
        .id
        .ok_or_else(|| auth_failure("Token didn't provide user_id"))?;

    let mut info = AccessInfo::new(IdentityVersion::V3, token, user_id)?;
    if let Some(ref expires) = body.expires_at {
        info = info.with_expires_at(parse_timestamp(expires)?);
    }
    if let Some(name) = user.name {
        info = info.with_user_name(name);
    }
    if let Some(domain) = user.domain {
        info = info.with_user_domain(domain.id, domain.name);
    }

    if let Some(project) = body.project {
        let id = project
            .id
            .ok_or_else(|| auth_failure("Token didn't provide project_id"))?;
        info = info.with_project(id, project.name);
        if let Some(domain) = project.domain {
            info = info.with_project_domain(domain.id, domain.name);
        }
    } else if let Some(domain) = body.domain {
        let id = domain
            .id
            .ok_or_else(|| auth_failure("Token didn't provide domain_id"))?;
        info = info.with_domain(id, domain.name);
    }

    if let Some(trust) = body.trust {
        info = info.with_trust_id(trust.id);
    }

    let catalog = body
        .catalog
        .unwrap_or_default()
        .into_iter()
        .map(service_from_v3)
        .collect();
    Ok(info.with_catalog(ServiceCatalog::new(catalog)))
}

fn service_from_v3(service: protocol::V3Service) -> ServiceEntry {
    let service_type = service.service_type;
    let endpoints = service
        .endpoints
        .into_iter()
        .filter_map(|endp| match endp.interface.parse() {
            Ok(interface) => Some(Endpoint {
                interface,
                region: endp.region,
                url: endp.url,
            }),
            Err(_) => {
                warn!(
                    "Skipping endpoint {} of service {} with unknown interface {}",
                    endp.url, service_type, endp.interface
                );
                None
            }
        })
        .collect();

    ServiceEntry {
        service_type,
        service_name: service.name,
        endpoints,
    }
}

#[cfg(test)]
pub mod test {
    #![allow(unused_results)]

    use chrono::{TimeZone, Utc};
    use reqwest::Method;
    use serde_json::json;

    use super::authenticate;
    use crate::http::test::{FakeClient, FakeResponse};
    use crate::identity::{Credentials, IdentityVersion, InterfaceType};
    use crate::{ErrorKind, IdOrName};

    pub const AUTH_URL: &str = "http://keystone.local:5000/v3";
    pub const TOKENS_URL: &str = "http://keystone.local:5000/v3/auth/tokens";
    pub const SUBJECT_TOKEN: &str = "gAAAAABmE2_subject_token";

    pub fn token_body(scope: serde_json::Value) -> serde_json::Value {
        let mut token = json!({
            "methods": ["password"],
            "expires_at": "2099-01-01T00:00:00.000000Z",
            "issued_at": "2024-01-01T00:00:00.000000Z",
            "user": {
                "id": "ee4dfb6e5540447cb3741905149d9b6e",
                "name": "admin",
                "domain": {"id": "default", "name": "Default"}
            },
            "catalog": [
                {
                    "type": "identity",
                    "name": "keystone",
                    "endpoints": [
                        {"interface": "public", "region": "RegionOne", "url": "http://keystone.local:5000/"},
                        {"interface": "admin", "region": "RegionOne", "url": "http://keystone.local:35357/"},
                        {"interface": "weird", "region": "RegionOne", "url": "http://keystone.weird/"}
                    ]
                },
                {
                    "type": "compute",
                    "name": "nova",
                    "endpoints": [
                        {"interface": "public", "region": "RegionOne", "url": "http://nova.local:8774/v2.1"}
                    ]
                }
            ]
        });
        if let Some(obj) = scope.as_object() {
            for (key, value) in obj {
                token[key] = value.clone();
            }
        }
        json!({ "token": token })
    }

    pub fn created(body: serde_json::Value) -> FakeResponse {
        FakeResponse::json(201, body).with_header("x-subject-token", SUBJECT_TOKEN)
    }

    #[tokio::test]
    async fn test_password_project_scoped() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            created(token_body(json!({
                "project": {"id": "p1", "name": "demo", "domain": {"id": "default", "name": "Default"}}
            }))),
        );
        let creds = Credentials::password(IdOrName::from_name("admin"), "pa$$w0rd")
            .with_user_domain(IdOrName::from_name("Default"))
            .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {"user": {
                        "name": "admin",
                        "domain": {"name": "Default"},
                        "password": "pa$$w0rd"
                    }}
                },
                "scope": {"project": {"name": "demo", "domain": {"id": "default"}}}
            }})
        );
        assert_eq!(info.token(), SUBJECT_TOKEN);
        assert_eq!(info.version(), IdentityVersion::V3);
        assert_eq!(
            info.expires_at(),
            Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(info.is_project_scoped());
        assert!(!info.is_domain_scoped());
        assert_eq!(info.project_domain_id(), Some("default"));
        assert_eq!(info.user_domain_name(), Some("Default"));
        // The endpoint with an unknown interface is dropped.
        assert_eq!(info.catalog().entries()[0].endpoints.len(), 2);
        assert_eq!(
            info.url_for("compute", InterfaceType::Public, Some("RegionOne"))
                .unwrap()
                .as_str(),
            "http://nova.local:8774/v2.1"
        );
    }

    #[tokio::test]
    async fn test_password_trust_scoped() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            created(token_body(json!({
                "OS-TRUST:trust": {
                    "id": "fe0aef",
                    "impersonation": false,
                    "trustee_user": {"id": "ee4dfb6e5540447cb3741905149d9b6e"},
                    "trustor_user": {"id": "3ec3164f750146be97f21559ee4d9c51"}
                }
            }))),
        );
        let creds = Credentials::password(IdOrName::from_id("U"), "P")
            .with_user_domain(IdOrName::from_id("ignored"))
            .with_trust("fe0aef");

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {"user": {"id": "U", "password": "P"}}
                },
                "scope": {"OS-TRUST:trust": {"id": "fe0aef"}}
            }})
        );
        assert!(info.is_trust_scoped());
        assert_eq!(info.trust_id(), Some("fe0aef"));
        assert!(!info.is_project_scoped());
    }

    #[tokio::test]
    async fn test_token_domain_scoped() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            created(token_body(json!({"domain": {"id": "default", "name": "Default"}}))),
        );
        let creds = Credentials::token("abcd").with_domain_scope(IdOrName::from_id("default"));

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {
                "identity": {"methods": ["token"], "token": {"id": "abcd"}},
                "scope": {"domain": {"id": "default"}}
            }})
        );
        assert_eq!(
            client.requests()[0].headers.get("x-auth-token").unwrap(),
            "abcd"
        );
        assert!(info.is_domain_scoped());
        assert!(!info.is_project_scoped());
        assert_eq!(info.domain_name(), Some("Default"));
    }

    #[tokio::test]
    async fn test_unscoped_has_no_scope() {
        let client = FakeClient::new();
        client.respond(Method::POST, TOKENS_URL, created(token_body(json!({}))));
        let creds = Credentials::password(IdOrName::from_id("U"), "P");

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert!(client.last_json()["auth"].get("scope").is_none());
        assert!(!info.is_project_scoped());
        assert!(!info.is_domain_scoped());
        assert!(!info.is_trust_scoped());
    }

    #[tokio::test]
    async fn test_scope_conflict_fails_before_request() {
        let client = FakeClient::new();
        let creds = Credentials::password(IdOrName::from_id("U"), "P")
            .with_project_scope(IdOrName::from_id("p1"), None)
            .with_domain_scope(IdOrName::from_id("default"));

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_subject_token() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::json(201, token_body(json!({}))),
        );
        let creds = Credentials::password(IdOrName::from_id("U"), "P");

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(err.message(), Some("Missing X-Subject-Token header"));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::new(201, "<html>oops</html>").with_header("x-subject-token", "abcd"),
        );
        let creds = Credentials::password(IdOrName::from_id("U"), "P");

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
    }

    #[tokio::test]
    async fn test_follows_redirect() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::new(301, "")
                .with_header("location", "https://keystone.secure/v3/auth/tokens"),
        );
        client.respond(
            Method::POST,
            "https://keystone.secure/v3/auth/tokens",
            created(token_body(json!({}))),
        );
        let creds = Credentials::password(IdOrName::from_id("U"), "P");

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(info.token(), SUBJECT_TOKEN);
        assert_eq!(client.total_calls(), 2);
        assert_eq!(client.last_json(), {
            let first = &client.requests()[0];
            serde_json::from_slice::<serde_json::Value>(first.body.as_ref().unwrap()).unwrap()
        });
    }
}
