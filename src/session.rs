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

//! Session structure definition.
//!
//! The Session object serves as a wrapper around an HTTP(s) client, handling
//! authentication, accessing the service catalog and token refresh.

use std::sync::Arc;

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, Url};
use serde::Serialize;
use static_assertions::assert_impl_all;

use crate::auth::{AuthPlugin, EndpointFilter};
use crate::http::{
    send_following_redirects, HttpClient, HttpConfig, HttpRequest, HttpResponse, ReqwestClient,
    DEFAULT_USER_AGENT,
};
use crate::identity::InterfaceType;
use crate::utils::{parse_url, url_join};
use crate::{Error, ErrorKind, Result};

const FORWARDED: &str = "forwarded";

/// Options of a single request sent through a [Session].
#[derive(Clone, Debug)]
pub struct RequestOptions {
    endpoint_filter: Option<EndpointFilter>,
    authenticated: Option<bool>,
    headers: HeaderMap,
    json: Option<serde_json::Value>,
    raise_exc: bool,
}

impl Default for RequestOptions {
    fn default() -> RequestOptions {
        RequestOptions {
            endpoint_filter: None,
            authenticated: None,
            headers: HeaderMap::new(),
            json: None,
            raise_exc: true,
        }
    }
}

impl RequestOptions {
    /// Default options.
    pub fn new() -> RequestOptions {
        RequestOptions::default()
    }

    /// Resolve the request URL relative to a catalog endpoint.
    #[inline]
    pub fn with_endpoint_filter(mut self, filter: EndpointFilter) -> RequestOptions {
        self.endpoint_filter = Some(filter);
        self
    }

    /// Whether to send the authentication token.
    ///
    /// By default the token is sent if the session has an authentication
    /// plugin.
    #[inline]
    pub fn with_authenticated(mut self, authenticated: bool) -> RequestOptions {
        self.authenticated = Some(authenticated);
        self
    }

    /// Add a header, overriding the defaults of the session.
    #[inline]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> RequestOptions {
        let _ = self.headers.insert(name, value);
        self
    }

    /// Send a JSON body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<RequestOptions> {
        self.json = Some(serde_json::to_value(body).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Cannot serialize request body: {}", e),
            )
        })?);
        Ok(self)
    }

    /// Whether to convert responses with status 400 and above into errors
    /// (the default).
    #[inline]
    pub fn with_raise_exc(mut self, raise_exc: bool) -> RequestOptions {
        self.raise_exc = raise_exc;
        self
    }
}

/// An OpenStack API session.
///
/// Cheap to clone: clones share the HTTP client and the authentication
/// plugin (and thus the cached token).
#[derive(Clone, Debug)]
pub struct Session {
    client: Arc<dyn HttpClient>,
    auth: Option<Arc<dyn AuthPlugin>>,
    user_agent: String,
    original_ip: Option<String>,
    interface: InterfaceType,
    region: Option<String>,
}

assert_impl_all!(Session: Send, Sync);

impl Session {
    /// Create a new session with a given authentication plugin.
    ///
    /// Uses the default HTTP client configuration.
    pub fn new<A: AuthPlugin + 'static>(auth: A) -> Result<Session> {
        Session::new_with_config(Arc::new(auth), &HttpConfig::default())
    }

    /// Create a new session with a shared plugin and HTTP configuration.
    pub fn new_with_config(auth: Arc<dyn AuthPlugin>, config: &HttpConfig) -> Result<Session> {
        let client = ReqwestClient::new(config)?;
        Ok(Session::from_parts(Arc::new(client), Some(auth)).with_user_agent(config.user_agent()))
    }

    /// Create a session from an HTTP client and an optional plugin.
    pub fn from_parts(client: Arc<dyn HttpClient>, auth: Option<Arc<dyn AuthPlugin>>) -> Session {
        Session {
            client,
            auth,
            user_agent: String::from(DEFAULT_USER_AGENT),
            original_ip: None,
            interface: InterfaceType::default(),
            region: None,
        }
    }

    /// Set the default endpoint interface.
    #[inline]
    pub fn with_endpoint_interface(mut self, interface: InterfaceType) -> Session {
        self.interface = interface;
        self
    }

    /// Set the default region.
    #[inline]
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Session {
        self.region = Some(region.into());
        self
    }

    /// Mark requests as forwarded on behalf of the given address.
    #[inline]
    pub fn with_original_ip<S: Into<String>>(mut self, original_ip: S) -> Session {
        self.original_ip = Some(original_ip.into());
        self
    }

    /// Set the `User-Agent` header.
    #[inline]
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Session {
        self.user_agent = user_agent.into();
        self
    }

    /// Authentication plugin (if any).
    #[inline]
    pub fn auth_plugin(&self) -> Option<&Arc<dyn AuthPlugin>> {
        self.auth.as_ref()
    }

    /// HTTP client in use.
    #[inline]
    pub fn client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Default endpoint interface.
    #[inline]
    pub fn endpoint_interface(&self) -> InterfaceType {
        self.interface
    }

    /// Default region.
    #[inline]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn plugin(&self) -> Result<&Arc<dyn AuthPlugin>> {
        self.auth.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::MissingAuthPlugin,
                "An authentication plugin is required for this request",
            )
        })
    }

    /// Get a valid token, authenticating if needed.
    pub async fn get_token(&self) -> Result<String> {
        self.plugin()?.get_token(self.client.as_ref()).await
    }

    /// Get a URL of a service.
    ///
    /// The interface and the region default to the ones of the session.
    pub async fn get_endpoint(&self, filter: EndpointFilter) -> Result<Url> {
        let filter = filter.with_defaults(self.interface, self.region.as_deref());
        self.plugin()?
            .get_endpoint(self.client.as_ref(), &filter)
            .await
    }

    /// Drop the cached authentication data.
    pub async fn invalidate(&self) -> bool {
        match self.auth {
            Some(ref auth) => auth.invalidate().await,
            None => false,
        }
    }

    /// Send a request.
    ///
    /// With an endpoint filter in the options, `url` is a path relative to
    /// the endpoint, otherwise it is an absolute URL.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        let url = match options.endpoint_filter {
            Some(filter) => {
                let endpoint = self.get_endpoint(filter).await?;
                parse_url(&url_join(endpoint.as_str(), url))?
            }
            None => parse_url(url)?,
        };

        let mut request = HttpRequest::new(method, url)
            .accept_json()
            .with_header(USER_AGENT, header_value(&self.user_agent)?);
        if let Some(ref original_ip) = self.original_ip {
            let forwarded = format!("for={};by={}", original_ip, self.user_agent);
            request =
                request.with_header(HeaderName::from_static(FORWARDED), header_value(&forwarded)?);
        }

        let authenticated = options.authenticated.unwrap_or(self.auth.is_some());
        if authenticated {
            let token = self.get_token().await?;
            request = request.with_auth_token(&token)?;
        }
        if let Some(ref json) = options.json {
            request = request.with_json(json)?;
        }
        for (name, value) in options.headers.iter() {
            let _ = request.headers.insert(name, value.clone());
        }

        debug!("Sending {} request to {}", request.method, request.url);
        let resp = send_following_redirects(self.client.as_ref(), request).await?;
        debug!("Received response {} from {}", resp.status, resp.url);
        if options.raise_exc {
            resp.error_for_status()
        } else {
            Ok(resp)
        }
    }

    /// Send a HEAD request.
    #[inline]
    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::HEAD, url, options).await
    }

    /// Send a GET request.
    #[inline]
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::GET, url, options).await
    }

    /// Send a POST request.
    #[inline]
    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::POST, url, options).await
    }

    /// Send a PUT request.
    #[inline]
    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::PUT, url, options).await
    }

    /// Send a PATCH request.
    #[inline]
    pub async fn patch(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::PATCH, url, options).await
    }

    /// Send a DELETE request.
    #[inline]
    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.request(Method::DELETE, url, options).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid header value {}", value),
        )
    })
}

#[cfg(test)]
pub mod test {
    #![allow(unused_results)]

    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use reqwest::header::{HeaderName, HeaderValue};
    use reqwest::Method;
    use serde_json::json;

    use super::{RequestOptions, Session};
    use crate::auth::{EndpointFilter, IdentityPlugin, TokenEndpoint};
    use crate::http::test::{FakeClient, FakeResponse};
    use crate::identity::{demo_catalog, AccessInfo, IdentityVersion, InterfaceType};
    use crate::{ErrorKind, IdOrName};

    const AUTH_URL: &str = "http://keystone.local:5000/v2.0";
    const TOKENS_URL: &str = "http://keystone.local:5000/v2.0/tokens";

    fn v2_token_response() -> FakeResponse {
        let expires = (Utc::now() + Duration::hours(1)).to_rfc3339();
        FakeResponse::json(
            200,
            json!({"access": {
                "token": {"id": "v2token", "expires": expires,
                          "tenant": {"id": "p1", "name": "demo"}},
                "user": {"id": "u1", "name": "admin"},
                "serviceCatalog": [{
                    "type": "compute",
                    "name": "nova",
                    "endpoints": [
                        {"region": "RegionOne",
                         "publicURL": "http://nova.local:8774/v2.1",
                         "internalURL": "http://nova.internal:8774/v2.1"},
                        {"region": "RegionTwo",
                         "publicURL": "http://nova.two:8774/v2.1"}
                    ]
                }]
            }}),
        )
    }

    fn v2_plugin() -> IdentityPlugin {
        IdentityPlugin::v2_password(AUTH_URL, IdOrName::from_name("admin"), "pa$$w0rd")
            .unwrap()
            .with_project_scope(IdOrName::from_name("demo"), None)
    }

    fn session_with(client: &Arc<FakeClient>, plugin: IdentityPlugin) -> Session {
        Session::from_parts(client.clone(), Some(Arc::new(plugin)))
    }

    #[tokio::test]
    async fn test_get_token_is_idempotent() {
        let client = Arc::new(FakeClient::new());
        client.respond(Method::POST, TOKENS_URL, v2_token_response());
        let session = session_with(&client, v2_plugin());

        assert_eq!(session.get_token().await.unwrap(), "v2token");
        assert_eq!(session.get_token().await.unwrap(), "v2token");
        assert_eq!(client.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_sessions_share_plugin() {
        let client = Arc::new(FakeClient::new());
        client.respond(Method::POST, TOKENS_URL, v2_token_response());
        let first = session_with(&client, v2_plugin());
        let second = Session::from_parts(client.clone(), first.auth_plugin().cloned())
            .with_endpoint_interface(InterfaceType::Internal);

        assert_eq!(first.get_token().await.unwrap(), "v2token");
        assert_eq!(second.get_token().await.unwrap(), "v2token");
        let url = second
            .get_endpoint(EndpointFilter::new("compute"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://nova.internal:8774/v2.1");
        assert_eq!(client.calls(Method::POST, TOKENS_URL), 1);
    }

    #[tokio::test]
    async fn test_get_endpoint_defaults() {
        let client = Arc::new(FakeClient::new());
        client.respond(Method::POST, TOKENS_URL, v2_token_response());
        let session = session_with(&client, v2_plugin()).with_region("RegionTwo");

        let url = session
            .get_endpoint(EndpointFilter::new("compute"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://nova.two:8774/v2.1");

        let url = session
            .get_endpoint(EndpointFilter::new("compute").with_region("RegionOne"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://nova.local:8774/v2.1");
    }

    #[tokio::test]
    async fn test_request_with_endpoint_filter() {
        let client = Arc::new(FakeClient::new());
        client.respond(Method::POST, TOKENS_URL, v2_token_response());
        client.respond(
            Method::GET,
            "http://nova.local:8774/v2.1/servers",
            FakeResponse::json(200, json!({"servers": []})),
        );
        let session = session_with(&client, v2_plugin())
            .with_original_ip("10.0.0.1")
            .with_user_agent("tester/1.0");

        let resp = session
            .get(
                "servers",
                RequestOptions::new().with_endpoint_filter(EndpointFilter::new("compute")),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.json::<serde_json::Value>().unwrap(),
            json!({"servers": []})
        );

        let requests = client.requests();
        let req = requests.last().unwrap();
        assert_eq!(req.headers.get("x-auth-token").unwrap(), "v2token");
        assert_eq!(req.headers.get("user-agent").unwrap(), "tester/1.0");
        assert_eq!(req.headers.get("accept").unwrap(), "application/json");
        assert_eq!(
            req.headers.get("forwarded").unwrap(),
            "for=10.0.0.1;by=tester/1.0"
        );
    }

    #[tokio::test]
    async fn test_request_errors() {
        let client = Arc::new(FakeClient::new());
        client.respond(
            Method::GET,
            "http://ironic.local:6385/v1/nodes/missing",
            FakeResponse::json(404, json!({"error_message": "Node missing could not be found"})),
        );
        let plugin = TokenEndpoint::new("http://ironic.local:6385/v1", "admin").unwrap();
        let session = Session::from_parts(client.clone(), Some(Arc::new(plugin)));
        let options =
            || RequestOptions::new().with_endpoint_filter(EndpointFilter::new("baremetal"));

        let err = session
            .get("nodes/missing", options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(err.status().map(|s| s.as_u16()), Some(404));

        let resp = session
            .get("nodes/missing", options().with_raise_exc(false))
            .await
            .unwrap();
        assert_eq!(resp.status.as_u16(), 404);
    }

    #[tokio::test]
    async fn test_post_json() {
        let client = Arc::new(FakeClient::new());
        client.respond(
            Method::POST,
            "http://ironic.local:6385/v1/nodes",
            FakeResponse::json(201, json!({"uuid": "n1"})),
        );
        let plugin = TokenEndpoint::new("http://ironic.local:6385/v1", "admin").unwrap();
        let session = Session::from_parts(client.clone(), Some(Arc::new(plugin)));

        let options = RequestOptions::new()
            .with_endpoint_filter(EndpointFilter::new("baremetal"))
            .with_header(
                HeaderName::from_static("x-openstack-ironic-api-version"),
                HeaderValue::from_static("1.50"),
            )
            .with_json(&json!({"driver": "ipmi"}))
            .unwrap();
        session.post("nodes", options).await.unwrap();

        assert_eq!(client.last_json(), json!({"driver": "ipmi"}));
        let requests = client.requests();
        let req = requests.last().unwrap();
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(
            req.headers.get("x-openstack-ironic-api-version").unwrap(),
            "1.50"
        );
        assert_eq!(req.headers.get("x-auth-token").unwrap(), "admin");
    }

    #[tokio::test]
    async fn test_without_plugin() {
        let client = Arc::new(FakeClient::new());
        client.respond(
            Method::GET,
            "http://keystone.local:5000",
            FakeResponse::json(300, json!({"versions": {"values": []}})),
        );
        let session = Session::from_parts(client.clone(), None);

        let err = session.get_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingAuthPlugin);
        let err = session
            .get(
                "http://keystone.local:5000",
                RequestOptions::new().with_authenticated(true),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingAuthPlugin);
        assert!(!session.invalidate().await);

        let resp = session
            .get("http://keystone.local:5000", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(resp.status.as_u16(), 300);
        assert!(client.requests()[0].headers.get("x-auth-token").is_none());
    }

    #[tokio::test]
    async fn test_not_modified_is_not_an_error() {
        let client = Arc::new(FakeClient::new());
        client.respond(
            Method::GET,
            "http://nova.local:8774/v2.1/servers",
            FakeResponse::new(304, ""),
        );
        client.respond(
            Method::GET,
            "http://nova.local:8774/v2.1/flavors",
            FakeResponse::new(500, "boom"),
        );
        let session = Session::from_parts(client.clone(), None);

        let resp = session
            .get("http://nova.local:8774/v2.1/servers", RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(resp.status.as_u16(), 304);

        let err = session
            .get("http://nova.local:8774/v2.1/flavors", RequestOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalServerError);
    }

    #[tokio::test]
    async fn test_seeded_plugin_no_requests() {
        let client = Arc::new(FakeClient::new());
        let info = AccessInfo::new(IdentityVersion::V3, "seeded", "u1")
            .unwrap()
            .with_expires_at(Utc::now() + Duration::hours(1))
            .with_catalog(demo_catalog());
        let plugin = IdentityPlugin::v3_token("http://keystone.local:5000/v3", "abcd")
            .unwrap()
            .with_access_info(info);
        let session = session_with(&client, plugin);

        assert_eq!(session.get_token().await.unwrap(), "seeded");
        let url = session
            .get_endpoint(EndpointFilter::new("identity").with_interface(InterfaceType::Admin))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://admin.one:35357/v3");
        assert!(session.invalidate().await);
        assert_eq!(client.total_calls(), 0);
    }
}
