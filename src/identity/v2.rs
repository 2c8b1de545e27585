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

//! Identity API v2 (`/tokens`) authentication.

use log::{debug, warn};

use super::access::AccessInfo;
use super::catalog::{Endpoint, InterfaceType, ServiceCatalog, ServiceEntry};
use super::credentials::Credentials;
use super::protocol::{self, parse_timestamp};
use super::{auth_failure, post_auth_request, IdentityVersion};
use crate::http::HttpClient;
use crate::utils::url_join;
use crate::{Error, ErrorKind, IdOrName, Result};

/// Authenticate against `{auth_url}/tokens`.
pub(crate) async fn authenticate(
    client: &dyn HttpClient,
    auth_url: &str,
    credentials: &Credentials,
) -> Result<AccessInfo> {
    credentials.validate()?;
    let body = build_body(credentials)?;

    let token = match credentials {
        Credentials::Token(tok) => Some(tok.token.as_str()),
        Credentials::Password(_) => None,
    };
    let url = url_join(auth_url, "tokens");
    debug!("Authenticating using Identity API v2 at {}", url);
    let resp = post_auth_request(client, &url, &body, token).await?;

    let root: protocol::V2AccessRoot = resp
        .json()
        .map_err(|e| auth_failure(format!("Malformed v2 token response: {}", e)))?;
    access_from_response(root.access)
}

fn build_body(credentials: &Credentials) -> Result<protocol::V2AuthRoot<'_>> {
    let scope = credentials.scope();
    if scope.domain.is_some() {
        return Err(Error::new(
            ErrorKind::AuthorizationFailure,
            "Identity API v2 does not support domain scope",
        ));
    }

    let mut auth = protocol::V2Auth {
        trust_id: scope.trust_id.as_deref(),
        ..Default::default()
    };

    match credentials {
        Credentials::Password(pw) => {
            if pw.user_domain.is_some() {
                warn!("User domain is ignored by Identity API v2");
            }
            auth.password_credentials = Some(protocol::V2PasswordCredentials {
                username: pw.user.name(),
                user_id: pw.user.id(),
                password: &pw.password,
            });
        }
        Credentials::Token(tok) => {
            auth.token = Some(protocol::TokenId { id: &tok.token });
        }
    }

    if let Some(ref project) = scope.project {
        if project.domain.is_some() {
            warn!("Project domain is ignored by Identity API v2");
        }
        match project.project {
            IdOrName::Id(ref id) => auth.tenant_id = Some(id.as_str()),
            IdOrName::Name(ref name) => auth.tenant_name = Some(name.as_str()),
        }
    }

    Ok(protocol::V2AuthRoot { auth })
}

fn access_from_response(access: protocol::V2Access) -> Result<AccessInfo> {
    let token = access
        .token
        .ok_or_else(|| auth_failure("Token didn't provide token_id"))?;
    let token_id = token
        .id
        .ok_or_else(|| auth_failure("Token didn't provide token_id"))?;
    let user = access
        .user
        .ok_or_else(|| auth_failure("Token didn't provide user_id"))?;
    let user_id = user
        .id
        .ok_or_else(|| auth_failure("Token didn't provide user_id"))?;

    let mut info = AccessInfo::new(IdentityVersion::V2, token_id, user_id)?;
    if let Some(expires) = token.expires {
        info = info.with_expires_at(parse_timestamp(&expires)?);
    }
    if let Some(name) = user.name.or(user.username) {
        info = info.with_user_name(name);
    }
    if let Some(tenant) = token.tenant {
        let id = tenant
            .id
            .ok_or_else(|| auth_failure("Token didn't provide tenant_id"))?;
        info = info.with_project(id, tenant.name);
    }
    if let Some(trust) = access.trust {
        info = info.with_trust_id(trust.id);
    }

    let catalog = access
        .service_catalog
        .unwrap_or_default()
        .into_iter()
        .map(service_from_v2)
        .collect();
    Ok(info.with_catalog(ServiceCatalog::new(catalog)))
}

fn service_from_v2(service: protocol::V2Service) -> ServiceEntry {
    let mut endpoints = Vec::with_capacity(service.endpoints.len() * 3);
    for endp in service.endpoints {
        let urls = [
            (InterfaceType::Public, endp.public_url),
            (InterfaceType::Internal, endp.internal_url),
            (InterfaceType::Admin, endp.admin_url),
        ];
        for (interface, url) in urls {
            if let Some(url) = url {
                endpoints.push(Endpoint {
                    interface,
                    region: endp.region.clone(),
                    url,
                });
            }
        }
    }

    ServiceEntry {
        service_type: service.service_type,
        service_name: service.name,
        endpoints,
    }
}

#[cfg(test)]
pub mod test {
    #![allow(unused_results)]

    use reqwest::Method;
    use serde_json::json;

    use super::authenticate;
    use crate::http::test::{FakeClient, FakeResponse};
    use crate::identity::{AccessInfo, Credentials, IdentityVersion, InterfaceType};
    use crate::{ErrorKind, IdOrName};

    pub const AUTH_URL: &str = "http://keystone.local:5000/v2.0";
    pub const TOKENS_URL: &str = "http://keystone.local:5000/v2.0/tokens";

    pub fn project_scoped_token() -> serde_json::Value {
        json!({
            "access": {
                "token": {
                    "id": "04c7d5ffaeef485f9dc69c06db285bdb",
                    "expires": "2099-01-01T00:00:00Z",
                    "tenant": {"id": "225da22d3ce34b15877ea70b2a575f58", "name": "exampleproject"}
                },
                "user": {
                    "id": "c4da488862bd435c9e6c0275a0d0e49a",
                    "name": "exampleuser",
                    "roles": [{"name": "Member"}]
                },
                "serviceCatalog": [
                    {
                        "type": "identity",
                        "name": "keystone",
                        "endpoints": [{
                            "region": "RegionOne",
                            "publicURL": "http://keystone.local:5000/v2.0",
                            "internalURL": "http://keystone.internal:5000/v2.0",
                            "adminURL": "http://keystone.local:35357/v2.0"
                        }]
                    },
                    {
                        "type": "compute",
                        "name": "nova",
                        "endpoints": [{
                            "region": "RegionOne",
                            "publicURL": "http://nova.local:8774/v2.1"
                        }]
                    }
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_password_project_scoped() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::json(200, project_scoped_token()),
        );
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "password")
            .with_project_scope(IdOrName::from_name("exampleproject"), None);

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {
                "passwordCredentials": {"username": "exampleuser", "password": "password"},
                "tenantName": "exampleproject"
            }})
        );
        assert_eq!(info.token(), "04c7d5ffaeef485f9dc69c06db285bdb");
        assert_eq!(info.version(), IdentityVersion::V2);
        assert!(info.is_project_scoped());
        assert!(!info.is_domain_scoped());
        assert_eq!(info.project_name(), Some("exampleproject"));
        assert_eq!(info.user_name(), Some("exampleuser"));
        assert_eq!(
            info.url_for("identity", InterfaceType::Internal, None)
                .unwrap()
                .as_str(),
            "http://keystone.internal:5000/v2.0"
        );
        assert_eq!(
            info.management_url().unwrap().as_str(),
            "http://keystone.local:35357/v2.0"
        );
    }

    #[tokio::test]
    async fn test_access_info_survives_serialization() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::json(200, project_scoped_token()),
        );
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "password")
            .with_project_scope(IdOrName::from_name("exampleproject"), None);
        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();

        let raw = serde_json::to_string(&info).unwrap();
        let back: AccessInfo = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.token(), info.token());
        assert_eq!(back.expires_at(), info.expires_at());
        assert_eq!(back.version(), IdentityVersion::V2);
        assert!(back.is_project_scoped());
        assert!(!back.is_domain_scoped());
        assert!(!back.is_trust_scoped());
        assert_eq!(back.catalog(), info.catalog());
        assert_eq!(back.catalog().entries().len(), 2);
        assert_eq!(
            back.url_for("compute", InterfaceType::Public, Some("RegionOne"))
                .unwrap()
                .as_str(),
            "http://nova.local:8774/v2.1"
        );
    }

    #[tokio::test]
    async fn test_token_with_trust() {
        let client = FakeClient::new();
        let mut body = project_scoped_token();
        body["access"]["trust"] = json!({"id": "fe0aef", "trustee_user_id": "u2"});
        client.respond(Method::POST, TOKENS_URL, FakeResponse::json(200, body));
        let creds = Credentials::token("abcd")
            .with_project_scope(IdOrName::from_id("p1"), None)
            .with_trust("fe0aef");

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {"token": {"id": "abcd"}, "tenantId": "p1", "trust_id": "fe0aef"}})
        );
        let req = &client.requests()[0];
        assert_eq!(req.headers.get("x-auth-token").unwrap(), "abcd");
        assert!(info.is_trust_scoped());
        assert_eq!(info.trust_id(), Some("fe0aef"));
    }

    #[tokio::test]
    async fn test_user_id_is_sent_as_user_id() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::json(200, project_scoped_token()),
        );
        let creds = Credentials::password(IdOrName::from_id("u1"), "password");

        let _ = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert_eq!(
            client.last_json(),
            json!({"auth": {"passwordCredentials": {"userId": "u1", "password": "password"}}})
        );
    }

    #[tokio::test]
    async fn test_unscoped() {
        let client = FakeClient::new();
        let mut body = project_scoped_token();
        body["access"]["token"]
            .as_object_mut()
            .unwrap()
            .remove("tenant");
        client.respond(Method::POST, TOKENS_URL, FakeResponse::json(200, body));
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "password");

        let info = authenticate(&client, AUTH_URL, &creds).await.unwrap();
        assert!(!info.is_project_scoped());
        assert!(!info.is_domain_scoped());
    }

    #[tokio::test]
    async fn test_domain_scope_rejected() {
        let client = FakeClient::new();
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "password")
            .with_domain_scope(IdOrName::from_id("default"));

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_user_id() {
        let client = FakeClient::new();
        let mut body = project_scoped_token();
        body["access"]["user"]
            .as_object_mut()
            .unwrap()
            .remove("id");
        client.respond(Method::POST, TOKENS_URL, FakeResponse::json(200, body));
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "password");

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(err.message(), Some("Token didn't provide user_id"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let client = FakeClient::new();
        client.respond(
            Method::POST,
            TOKENS_URL,
            FakeResponse::json(
                401,
                json!({"error": {"code": 401, "message": "Invalid user / password", "title": "Unauthorized"}}),
            ),
        );
        let creds = Credentials::password(IdOrName::from_name("exampleuser"), "wrong");

        let err = authenticate(&client, AUTH_URL, &creds).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
        assert_eq!(err.message(), Some("Invalid user / password"));
    }
}
