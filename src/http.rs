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

//! HTTP transport used by authentication plugins and sessions.
//!
//! Everything that talks to the network goes through the [HttpClient] trait,
//! the default implementation is [ReqwestClient]. Redirects are never followed
//! by the transport itself, [send_following_redirects] does it with a fixed
//! depth limit.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use static_assertions::assert_impl_all;

use crate::{Error, ErrorKind, Result};

/// Default value of the `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("keystoneauth-rust/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed for one logical request.
pub const MAX_REDIRECTS: usize = 5;

/// Header carrying the authentication token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Header carrying a newly issued token in Identity API v3.
pub const SUBJECT_TOKEN_HEADER: &str = "x-subject-token";

/// A request to send over HTTP.
#[derive(Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Full URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw body (if any).
    pub body: Option<Vec<u8>>,
}

/// A received HTTP response with its body fully read.
#[derive(Clone)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// URL the response was received from.
    pub url: Url,
    /// Raw body.
    pub body: Vec<u8>,
}

/// An abstract HTTP transport.
///
/// Implementations must not follow redirects and must report every received
/// response (including 4xx and 5xx) as `Ok`. Only connection-level problems
/// are errors, and they should use [ErrorKind::ConnectionError].
#[async_trait]
pub trait HttpClient: fmt::Debug + Send + Sync {
    /// Send a request and read the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Configuration of the default HTTP transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpConfig {
    /// Total request timeout.
    pub timeout: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Disable TLS certificate verification.
    pub insecure: bool,
    /// Value of the `User-Agent` header, defaults to [DEFAULT_USER_AGENT].
    pub user_agent: Option<String>,
}

/// Default HTTP transport based on `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: Client,
}

assert_impl_all!(ReqwestClient: Send, Sync);

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header.
    #[inline]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> HttpRequest {
        let _ = self.headers.insert(name, value);
        self
    }

    /// Add the `Accept: application/json` header.
    #[inline]
    pub fn accept_json(self) -> HttpRequest {
        self.with_header(ACCEPT, HeaderValue::from_static("application/json"))
    }

    /// Add the authentication token header.
    ///
    /// The value is marked as sensitive and is not shown in debug output.
    pub fn with_auth_token(self, token: &str) -> Result<HttpRequest> {
        let mut value = HeaderValue::from_str(token).map_err(|_| {
            Error::new(
                ErrorKind::InvalidInput,
                "Token contains characters not allowed in a header",
            )
        })?;
        value.set_sensitive(true);
        Ok(self.with_header(HeaderName::from_static(AUTH_TOKEN_HEADER), value))
    }

    /// Serialize a JSON body and set the content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<HttpRequest> {
        let raw = serde_json::to_vec(body).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Cannot serialize request body: {}", e),
            )
        })?;
        let _ = self
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(raw);
        Ok(self)
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bodies of authentication requests contain passwords.
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Value of a header as a string (if present and valid).
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::new_with_details(
                ErrorKind::InvalidResponse,
                Some(self.status),
                Some(format!("Invalid JSON received from {}: {}", self.url, e)),
            )
        })
    }

    /// Convert a client or server error response (status 400 and above) into
    /// an error.
    ///
    /// The error kind is derived from the status, the message from the body.
    /// Informational and redirect responses are returned as they are.
    pub fn error_for_status(self) -> Result<HttpResponse> {
        if !self.status.is_client_error() && !self.status.is_server_error() {
            Ok(self)
        } else {
            let kind = Error::kind_for_status(self.status);
            Err(Error::from_status(kind, self.status, &self.body))
        }
    }

    /// Redirect target, if this response is a followable redirect.
    fn redirect_location(&self) -> Option<&str> {
        match self.status {
            StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::USE_PROXY
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT => self.header_str(LOCATION.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Authentication responses carry tokens in both headers and bodies.
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl HttpConfig {
    /// Effective `User-Agent`.
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl ReqwestClient {
    /// Create a client with the given configuration.
    pub fn new(config: &HttpConfig) -> Result<ReqwestClient> {
        let mut builder = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        #[cfg(any(feature = "native-tls", feature = "rustls"))]
        {
            builder = builder.danger_accept_invalid_certs(config.insecure);
        }

        let client = builder.build().map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot build an HTTP client: {}", e),
            )
        })?;
        Ok(ReqwestClient { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        trace!("Sending {:?}", request);
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let url = resp.url().clone();
        let body = resp.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            url,
            body,
        })
    }
}

/// Send a request, re-issuing it against the `Location` of redirect responses.
///
/// At most [MAX_REDIRECTS] redirects are followed, one more results in a
/// `ConnectionError`.
pub async fn send_following_redirects(
    client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<HttpResponse> {
    let mut current = request;
    let mut redirects = 0;
    loop {
        let resp = client.send(current.clone()).await?;
        let location = match resp.redirect_location() {
            Some(location) => location,
            None => return Ok(resp),
        };

        if redirects >= MAX_REDIRECTS {
            return Err(Error::new(
                ErrorKind::ConnectionError,
                format!(
                    "Too many redirects ({}) when requesting {}",
                    redirects + 1,
                    current.url
                ),
            ));
        }

        let target = current.url.join(location).map_err(|e| {
            Error::new_with_details(
                ErrorKind::InvalidResponse,
                Some(resp.status),
                Some(format!("Invalid redirect location {}: {}", location, e)),
            )
        })?;
        debug!(
            "Following redirect ({}) from {} to {}",
            resp.status, current.url, target
        );
        current.url = target;
        redirects += 1;
    }
}
