// Copyright 2021 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Abstraction over a service catalog.

use std::fmt;
use std::str::FromStr;

use log::{debug, error};
use reqwest::Url;

use crate::{Error, ErrorKind, Result};

/// Interface type: public, internal or admin.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// Public interface (used by default).
    #[default]
    Public,
    /// Internal interface.
    Internal,
    /// Administrator interface.
    Admin,
}

/// A single endpoint of a service.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Endpoint {
    /// Interface type.
    pub interface: InterfaceType,
    /// Region (if any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Endpoint URL as received from the server.
    pub url: String,
}

/// A service with its endpoints.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServiceEntry {
    /// Service type, e.g. `compute`.
    pub service_type: String,
    /// Service name (if any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Service endpoints in server order.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Abstraction over a service catalog.
///
/// The order of services and endpoints is the one the server returned.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    entries: Vec<ServiceEntry>,
}

impl InterfaceType {
    /// Canonical name of the interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Public => "public",
            InterfaceType::Internal => "internal",
            InterfaceType::Admin => "admin",
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = Error;

    /// Parses both v3 (`public`) and v2 (`publicURL`) spellings.
    fn from_str(s: &str) -> Result<InterfaceType> {
        match s {
            "public" | "publicURL" => Ok(InterfaceType::Public),
            "internal" | "internalURL" => Ok(InterfaceType::Internal),
            "admin" | "adminURL" => Ok(InterfaceType::Admin),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown interface type {}", other),
            )),
        }
    }
}

impl ServiceEntry {
    /// A service without endpoints.
    pub fn new<S: Into<String>>(service_type: S) -> ServiceEntry {
        ServiceEntry {
            service_type: service_type.into(),
            service_name: None,
            endpoints: Vec::new(),
        }
    }

    /// Add an endpoint.
    pub fn with_endpoint<S: Into<String>>(
        mut self,
        interface: InterfaceType,
        region: Option<&str>,
        url: S,
    ) -> ServiceEntry {
        self.endpoints.push(Endpoint {
            interface,
            region: region.map(String::from),
            url: url.into(),
        });
        self
    }
}

impl ServiceCatalog {
    /// Create a catalog from its entries.
    pub fn new(entries: Vec<ServiceEntry>) -> ServiceCatalog {
        ServiceCatalog { entries }
    }

    /// Catalog entries.
    #[inline]
    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    /// Whether the catalog has no services.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an endpoint in the catalog.
    ///
    /// The first endpoint of a service with the given type that has the right
    /// interface and (if provided) region wins.
    pub fn url_for(
        &self,
        service_type: &str,
        interface: InterfaceType,
        region: Option<&str>,
    ) -> Result<Url> {
        let endp = self
            .entries
            .iter()
            .filter(|svc| svc.service_type == service_type)
            .flat_map(|svc| svc.endpoints.iter())
            .find(|endp| {
                endp.interface == interface
                    && region
                        .map(|r| endp.region.as_deref() == Some(r))
                        .unwrap_or(true)
            })
            .ok_or_else(|| Error::new_endpoint_not_found(service_type))?;

        debug!("Received {:?} for {}", endp, service_type);
        Url::parse(&endp.url).map_err(|e| {
            error!(
                "Invalid URL {} received from service catalog for service \
                 '{}', interface {}, region {:?}: {}",
                endp.url, service_type, interface, region, e
            );
            Error::new(
                ErrorKind::InvalidResponse,
                format!("Invalid URL {} for {} - {}", endp.url, service_type, e),
            )
        })
    }
}
