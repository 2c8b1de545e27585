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

//! Simple authentication methods.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use reqwest::Url;

use super::base::{AuthPlugin, EndpointFilter};
use crate::http::HttpClient;
use crate::utils::parse_url;
use crate::Result;

/// Authentication with a fixed token and a fixed endpoint.
///
/// Useful for the Identity service bootstrap ("admin token") mode and for
/// standalone services. The token and the endpoint are returned for every
/// request regardless of the service type.
#[derive(Clone)]
pub struct TokenEndpoint {
    endpoint: Url,
    token: String,
}

impl TokenEndpoint {
    /// Create a new static authentication.
    ///
    /// This endpoint will be returned in response to all `get_endpoint` calls
    /// of the [AuthPlugin](trait.AuthPlugin.html) trait.
    pub fn new<U, S>(endpoint: U, token: S) -> Result<TokenEndpoint>
    where
        U: AsRef<str>,
        S: Into<String>,
    {
        Ok(TokenEndpoint {
            endpoint: parse_url(endpoint.as_ref())?,
            token: token.into(),
        })
    }

    /// The endpoint in use.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.token.hash(&mut hasher);
        write!(
            f,
            "TokenEndpoint {{ endpoint: {}, token: hash({}) }}",
            self.endpoint,
            hasher.finish()
        )
    }
}

#[async_trait]
impl AuthPlugin for TokenEndpoint {
    async fn get_token(&self, _client: &dyn HttpClient) -> Result<String> {
        Ok(self.token.clone())
    }

    /// Get a predefined endpoint for all service types.
    async fn get_endpoint(
        &self,
        _client: &dyn HttpClient,
        _filter: &EndpointFilter,
    ) -> Result<Url> {
        Ok(self.endpoint.clone())
    }

    async fn invalidate(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub mod test {
    #![allow(unused_results)]

    use super::TokenEndpoint;
    use crate::auth::{AuthPlugin, EndpointFilter};
    use crate::http::test::FakeClient;

    #[test]
    fn test_token_endpoint_new() {
        let a = TokenEndpoint::new("http://127.0.0.1:8080/v1", "secret").unwrap();
        let e = a.endpoint();
        assert_eq!(e.scheme(), "http");
        assert_eq!(e.host_str().unwrap(), "127.0.0.1");
        assert_eq!(e.port().unwrap(), 8080u16);
        assert_eq!(e.path(), "/v1");
        assert!(!format!("{:?}", a).contains("secret"));
    }

    #[test]
    fn test_token_endpoint_new_fail() {
        TokenEndpoint::new("foo bar", "secret").err().unwrap();
    }

    #[tokio::test]
    async fn test_token_endpoint_get_endpoint() {
        let client = FakeClient::new();
        let a = TokenEndpoint::new("http://127.0.0.1:8080/v1", "secret").unwrap();
        let e = a
            .get_endpoint(&client, &EndpointFilter::new("foobar"))
            .await
            .unwrap();
        assert_eq!(e.as_str(), "http://127.0.0.1:8080/v1");
        assert_eq!(a.get_token(&client).await.unwrap(), "secret");
        assert!(!a.invalidate().await);
        assert_eq!(client.total_calls(), 0);
    }
}
