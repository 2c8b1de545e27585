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

//! Types shared by all parts of the crate.

mod apiversion;

pub use self::apiversion::ApiVersion;

/// A reference to a resource by either its ID or its name.
///
/// Serializes as `{"id": "..."}` or `{"name": "..."}`, which is what the
/// Identity API expects for users, projects and domains.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum IdOrName {
    /// Resource ID.
    #[serde(rename = "id")]
    Id(String),
    /// Resource name.
    #[serde(rename = "name")]
    Name(String),
}

impl IdOrName {
    /// Create an ID.
    #[inline]
    pub fn from_id<T: Into<String>>(id: T) -> IdOrName {
        IdOrName::Id(id.into())
    }

    /// Create a name.
    #[inline]
    pub fn from_name<T: Into<String>>(name: T) -> IdOrName {
        IdOrName::Name(name.into())
    }

    /// ID, if this is an ID.
    #[inline]
    pub fn id(&self) -> Option<&str> {
        match self {
            IdOrName::Id(id) => Some(id),
            IdOrName::Name(_) => None,
        }
    }

    /// Name, if this is a name.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            IdOrName::Id(_) => None,
            IdOrName::Name(name) => Some(name),
        }
    }

    /// The raw string, regardless of whether it is an ID or a name.
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            IdOrName::Id(s) | IdOrName::Name(s) => s,
        }
    }
}
