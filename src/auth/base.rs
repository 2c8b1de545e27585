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

//! Base code for authentication.

use std::fmt;

use async_trait::async_trait;
use reqwest::Url;

use crate::http::HttpClient;
use crate::identity::InterfaceType;
use crate::{ApiVersion, Result};

/// Trait for an authentication plugin.
///
/// Plugins are shared between sessions (usually as `Arc<dyn AuthPlugin>`),
/// so they cache their state internally and must be safe to call from
/// several tasks at once.
#[async_trait]
pub trait AuthPlugin: fmt::Debug + Send + Sync {
    /// Get a valid authentication token, authenticating if needed.
    async fn get_token(&self, client: &dyn HttpClient) -> Result<String>;

    /// Get a URL for the requested service.
    async fn get_endpoint(&self, client: &dyn HttpClient, filter: &EndpointFilter) -> Result<Url>;

    /// Drop any cached authentication data.
    ///
    /// Returns `true` if there was something to drop.
    async fn invalidate(&self) -> bool;
}

/// Parameters of an endpoint lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointFilter {
    /// Service type, e.g. `compute`.
    pub service_type: String,
    /// Interface type, the session default (normally public) if not set.
    pub interface: Option<InterfaceType>,
    /// Region, any region if not set.
    pub region: Option<String>,
    /// API version the endpoint has to support, enables version discovery.
    pub version: Option<ApiVersion>,
    /// Whether experimental versions are acceptable.
    pub allow_unstable: bool,
}

impl EndpointFilter {
    /// Filter by service type only.
    pub fn new<S: Into<String>>(service_type: S) -> EndpointFilter {
        EndpointFilter {
            service_type: service_type.into(),
            interface: None,
            region: None,
            version: None,
            allow_unstable: false,
        }
    }

    /// Set the interface type.
    #[inline]
    pub fn with_interface(mut self, interface: InterfaceType) -> EndpointFilter {
        self.interface = Some(interface);
        self
    }

    /// Set the region.
    #[inline]
    pub fn with_region<S: Into<String>>(mut self, region: S) -> EndpointFilter {
        self.region = Some(region.into());
        self
    }

    /// Require a compatible API version.
    #[inline]
    pub fn with_version<V: Into<ApiVersion>>(mut self, version: V) -> EndpointFilter {
        self.version = Some(version.into());
        self
    }

    /// Allow or disallow unstable API versions.
    #[inline]
    pub fn with_unstable(mut self, allow_unstable: bool) -> EndpointFilter {
        self.allow_unstable = allow_unstable;
        self
    }

    /// Effective interface type.
    #[inline]
    pub fn interface(&self) -> InterfaceType {
        self.interface.unwrap_or_default()
    }

    /// Fill in the interface and the region where they are not set.
    pub(crate) fn with_defaults(
        mut self,
        interface: InterfaceType,
        region: Option<&str>,
    ) -> EndpointFilter {
        if self.interface.is_none() {
            self.interface = Some(interface);
        }
        if self.region.is_none() {
            self.region = region.map(String::from);
        }
        self
    }
}
