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

//! API version as reported by version discovery.

use std::fmt;
use std::str::FromStr;

use serde::de::{Error as DeserError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, ErrorKind, Result};

/// API version (major, minor).
///
/// Parsed from discovery identifiers like `v3.14`, `v2.0` or `v3`, as well as
/// from bare `3.14`. A missing minor component means `0`.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct ApiVersion(pub u16, pub u16);

impl ApiVersion {
    /// Major component.
    #[inline]
    pub fn major(&self) -> u16 {
        self.0
    }

    /// Minor component.
    #[inline]
    pub fn minor(&self) -> u16 {
        self.1
    }

    /// Whether this version can serve a client requiring `required`.
    ///
    /// Same major, same or newer minor.
    #[inline]
    pub fn is_compatible_with(&self, required: ApiVersion) -> bool {
        self.0 == required.0 && self.1 >= required.1
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

fn parse_component(component: &str, source: &str) -> Result<u16> {
    component.parse().map_err(|_| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Invalid API version {}: {} is not a number", source, component),
        )
    })
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<ApiVersion> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let mut parts = bare.split('.');
        let major = match parts.next() {
            Some(m) if !m.is_empty() => parse_component(m, s)?,
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("Invalid API version: expected vX.Y, got {}", s),
                ))
            }
        };
        let minor = match parts.next() {
            Some(m) => parse_component(m, s)?,
            None => 0,
        };

        if parts.next().is_some() {
            let msg = format!("Invalid API version: expected vX.Y, got {}", s);
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        Ok(ApiVersion(major, minor))
    }
}

impl From<(u16, u16)> for ApiVersion {
    fn from(value: (u16, u16)) -> ApiVersion {
        ApiVersion(value.0, value.1)
    }
}

impl Serialize for ApiVersion {
    fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct ApiVersionVisitor;

impl<'de> Visitor<'de> for ApiVersionVisitor {
    type Value = ApiVersion;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string in format vX.Y")
    }

    fn visit_str<E>(self, value: &str) -> ::std::result::Result<ApiVersion, E>
    where
        E: DeserError,
    {
        ApiVersion::from_str(value).map_err(DeserError::custom)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D>(deserializer: D) -> ::std::result::Result<ApiVersion, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ApiVersionVisitor)
    }
}

#[cfg(test)]
pub mod test {
    use std::str::FromStr;

    use super::ApiVersion;
    use crate::ErrorKind;

    #[test]
    fn test_apiversion_format() {
        let ver = ApiVersion(2, 27);
        assert_eq!(&ver.to_string(), "2.27");
        assert_eq!(ApiVersion::from_str("2.27").unwrap(), ver);
    }

    #[test]
    fn test_apiversion_discovery_ids() {
        assert_eq!(ApiVersion::from_str("v3.14").unwrap(), ApiVersion(3, 14));
        assert_eq!(ApiVersion::from_str("v2.0").unwrap(), ApiVersion(2, 0));
        assert_eq!(ApiVersion::from_str("v3").unwrap(), ApiVersion(3, 0));
        assert_eq!(ApiVersion::from_str("3").unwrap(), ApiVersion(3, 0));
    }

    #[test]
    fn test_apiversion_invalid() {
        for s in &["", "v", "vX.1", "3.x", "1.2.3"] {
            let err = ApiVersion::from_str(s).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{}", s);
        }
    }

    #[test]
    fn test_apiversion_compatible() {
        let required = ApiVersion(3, 2);
        assert!(ApiVersion(3, 2).is_compatible_with(required));
        assert!(ApiVersion(3, 10).is_compatible_with(required));
        assert!(!ApiVersion(3, 1).is_compatible_with(required));
        assert!(!ApiVersion(4, 0).is_compatible_with(required));
    }

    #[test]
    fn test_apiversion_serde() {
        let ver = ApiVersion(2, 27);
        let ser = serde_json::to_string(&ver).unwrap();
        assert_eq!(&ser, "\"2.27\"");
        assert_eq!(serde_json::from_str::<ApiVersion>(&ser).unwrap(), ver);
        assert_eq!(
            serde_json::from_str::<ApiVersion>("\"v3.4\"").unwrap(),
            ApiVersion(3, 4)
        );
    }
}
