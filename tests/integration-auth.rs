// Copyright 2018 Dmitry Tantsur <divius.inside@gmail.com>
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

use std::sync::Once;

use httpmock::prelude::*;
use serde_json::json;

use keystoneauth::auth::{AuthPlugin, EndpointFilter, GenericPlugin, IdentityPlugin};
use keystoneauth::http::{HttpConfig, ReqwestClient};
use keystoneauth::identity::IdentityVersion;
use keystoneauth::{ErrorKind, IdOrName, RequestOptions, Session};

static INIT: Once = Once::new();

const SUBJECT_TOKEN: &str = "gAAAAABmE2_integration";

fn set_up() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn token_body(server: &MockServer) -> serde_json::Value {
    json!({"token": {
        "methods": ["password"],
        "expires_at": "2099-01-01T00:00:00.000000Z",
        "user": {"id": "u1", "name": "admin", "domain": {"id": "default"}},
        "project": {"id": "p1", "name": "demo", "domain": {"id": "default"}},
        "catalog": [{
            "type": "compute",
            "name": "nova",
            "endpoints": [
                {"interface": "public", "region": "RegionOne", "url": server.url("/compute/v2.1")}
            ]
        }]
    }})
}

fn password_body() -> serde_json::Value {
    json!({"auth": {
        "identity": {
            "methods": ["password"],
            "password": {"user": {
                "name": "admin",
                "domain": {"id": "default"},
                "password": "pa$$w0rd"
            }}
        },
        "scope": {"project": {"name": "demo", "domain": {"id": "default"}}}
    }})
}

#[tokio::test]
async fn test_v3_password_and_request() {
    set_up();
    let server = MockServer::start_async().await;
    let auth_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v3/auth/tokens")
                .json_body(password_body());
            then.status(201)
                .header("x-subject-token", SUBJECT_TOKEN)
                .json_body(token_body(&server));
        })
        .await;
    let servers_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/compute/v2.1/servers")
                .header("x-auth-token", SUBJECT_TOKEN);
            then.status(200).json_body(json!({"servers": []}));
        })
        .await;

    let auth = IdentityPlugin::v3_password(
        server.url("/v3"),
        IdOrName::from_name("admin"),
        "pa$$w0rd",
    )
    .expect("Invalid auth URL")
    .with_user_domain(IdOrName::from_id("default"))
    .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));
    let session = Session::new(auth).expect("Cannot create a session");

    assert_eq!(session.get_token().await.unwrap(), SUBJECT_TOKEN);
    let resp = session
        .get(
            "servers",
            RequestOptions::new().with_endpoint_filter(EndpointFilter::new("compute")),
        )
        .await
        .expect("Request failed");
    assert!(resp.is_success());
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body, json!({"servers": []}));

    // The token is cached, the Identity service is contacted once.
    auth_mock.assert_async().await;
    servers_mock.assert_async().await;
}

#[tokio::test]
async fn test_generic_discovers_v3() {
    set_up();
    let server = MockServer::start_async().await;
    let discovery_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/identity");
            then.status(300).json_body(json!({"versions": {"values": [
                {
                    "id": "v3.14",
                    "status": "stable",
                    "links": [{"rel": "self", "href": server.url("/identity/v3/")}]
                },
                {
                    "id": "v2.0",
                    "status": "deprecated",
                    "links": [{"rel": "self", "href": server.url("/identity/v2.0/")}]
                }
            ]}}));
        })
        .await;
    let auth_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/identity/v3/auth/tokens")
                .json_body(password_body());
            then.status(201)
                .header("x-subject-token", SUBJECT_TOKEN)
                .json_body(token_body(&server));
        })
        .await;

    let auth = GenericPlugin::password(
        server.url("/identity"),
        IdOrName::from_name("admin"),
        "pa$$w0rd",
    )
    .expect("Invalid auth URL")
    .with_user_domain(IdOrName::from_id("default"))
    .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));
    let session = Session::new(auth).expect("Cannot create a session");

    let endpoint = session
        .get_endpoint(EndpointFilter::new("compute"))
        .await
        .expect("No compute endpoint");
    assert_eq!(endpoint.as_str(), server.url("/compute/v2.1"));
    assert_eq!(session.get_token().await.unwrap(), SUBJECT_TOKEN);

    discovery_mock.assert_async().await;
    auth_mock.assert_async().await;
}

#[tokio::test]
async fn test_generic_plugin_with_reqwest_client() {
    set_up();
    let server = MockServer::start_async().await;
    let _discovery_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/identity");
            then.status(300).json_body(json!({"versions": {"values": [{
                "id": "v3.14",
                "status": "stable",
                "links": [{"rel": "self", "href": server.url("/identity/v3/")}]
            }]}}));
        })
        .await;
    let _auth_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/identity/v3/auth/tokens");
            then.status(201)
                .header("x-subject-token", SUBJECT_TOKEN)
                .json_body(token_body(&server));
        })
        .await;

    let auth = GenericPlugin::password(
        server.url("/identity"),
        IdOrName::from_name("admin"),
        "pa$$w0rd",
    )
    .expect("Invalid auth URL")
    .with_user_domain(IdOrName::from_id("default"));
    assert_eq!(auth.delegate_version(), None);

    let client = ReqwestClient::new(&HttpConfig::default()).expect("Cannot create a client");
    assert_eq!(auth.get_token(&client).await.unwrap(), SUBJECT_TOKEN);
    assert_eq!(auth.delegate_version(), Some(IdentityVersion::V3));
}

#[tokio::test]
async fn test_auth_follows_redirect() {
    set_up();
    let server = MockServer::start_async().await;
    let redirect_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/old/v3/auth/tokens");
            then.status(307)
                .header("location", server.url("/v3/auth/tokens"));
        })
        .await;
    let auth_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v3/auth/tokens")
                .json_body(password_body());
            then.status(201)
                .header("x-subject-token", SUBJECT_TOKEN)
                .json_body(token_body(&server));
        })
        .await;

    let auth = IdentityPlugin::v3_password(
        server.url("/old/v3"),
        IdOrName::from_name("admin"),
        "pa$$w0rd",
    )
    .expect("Invalid auth URL")
    .with_user_domain(IdOrName::from_id("default"))
    .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));
    let session = Session::new(auth).expect("Cannot create a session");

    assert_eq!(session.get_token().await.unwrap(), SUBJECT_TOKEN);
    redirect_mock.assert_async().await;
    auth_mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_credentials() {
    set_up();
    let server = MockServer::start_async().await;
    let auth_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(401).json_body(json!({"error": {
                "code": 401,
                "title": "Unauthorized",
                "message": "The request you have made requires authentication."
            }}));
        })
        .await;

    let auth = IdentityPlugin::v3_password(
        server.url("/v3"),
        IdOrName::from_name("admin"),
        "wrong",
    )
    .expect("Invalid auth URL")
    .with_user_domain(IdOrName::from_id("default"));
    assert_eq!(auth.version(), IdentityVersion::V3);
    let session = Session::new(auth).expect("Cannot create a session");

    let err = session.get_token().await.err().expect("Expected a failure");
    assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
    auth_mock.assert_async().await;
}
