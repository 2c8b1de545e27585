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

//! Error and Result implementations.

use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;

/// Kind of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Authentication request failed.
    ///
    /// Covers rejected credentials, incomplete responses and connectivity
    /// problems during authentication.
    AuthorizationFailure,

    /// Version discovery did not find a usable endpoint.
    DiscoveryFailure,

    /// Discovery succeeded, but no version satisfies the request.
    ///
    /// A special case of `DiscoveryFailure`.
    VersionNotAvailable,

    /// Requested service endpoint was not found in the catalog.
    EndpointNotFound,

    /// No authentication plugin is registered under the requested name.
    NoMatchingPlugin,

    /// An authenticated request was made without an authentication plugin.
    MissingAuthPlugin,

    /// Connection-level failure: refused, timed out, TLS or too many redirects.
    ConnectionError,

    /// Request was rejected as unauthenticated.
    ///
    /// Maps to HTTP 401.
    Unauthorized,

    /// Access denied.
    ///
    /// Maps to HTTP 403.
    AccessDenied,

    /// Requested resource was not found.
    ///
    /// Roughly maps to HTTP 404 and 410.
    ResourceNotFound,

    /// Conflict in the request.
    ///
    /// Maps to HTTP 409.
    Conflict,

    /// Invalid value passed to one of paremeters.
    ///
    /// May be result of HTTP 400.
    InvalidInput,

    /// Invalid configuration (environment or clouds.yaml).
    InvalidConfig,

    /// Response received from the server is malformed.
    InvalidResponse,

    /// Internal server error.
    ///
    /// Maps to HTTP 5xx codes.
    InternalServerError,
}

/// Error from an authentication or session call.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    status: Option<StatusCode>,
    message: Option<String>,
}

/// Result of an authentication or session call.
pub type Result<T> = ::std::result::Result<T, Error>;

impl Error {
    /// Create a new error of the provided kind.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Error {
        Error {
            kind,
            status: None,
            message: Some(message.into()),
        }
    }

    /// Create with providing all details.
    pub fn new_with_details(
        kind: ErrorKind,
        status: Option<StatusCode>,
        message: Option<String>,
    ) -> Error {
        Error {
            kind,
            status,
            message,
        }
    }

    /// Error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status code (if any).
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Error message (if any).
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Helper - error of kind EndpointNotFound.
    pub(crate) fn new_endpoint_not_found<D: fmt::Display>(service_type: D) -> Error {
        Error::new(
            ErrorKind::EndpointNotFound,
            format!("Endpoint for service {} was not found", service_type),
        )
    }

    /// Build an error from an HTTP status and a raw response body.
    ///
    /// OpenStack services report errors in several JSON shapes, the message is
    /// extracted from the most common ones.
    pub(crate) fn from_status(kind: ErrorKind, status: StatusCode, body: &[u8]) -> Error {
        let message = extract_message(body)
            .unwrap_or_else(|| format!("Request failed with HTTP status {}", status));
        Error::new_with_details(kind, Some(status), Some(message))
    }

    /// Error kind that corresponds to an unsuccessful HTTP status.
    pub(crate) fn kind_for_status(status: StatusCode) -> ErrorKind {
        match status {
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ErrorKind::AccessDenied,
            StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::ResourceNotFound,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            c if c.is_client_error() => ErrorKind::InvalidInput,
            c if c.is_server_error() => ErrorKind::InternalServerError,
            _ => ErrorKind::InvalidResponse,
        }
    }
}

fn extract_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            return if text.is_empty() { None } else { Some(text) };
        }
    };

    // {"error": {"message": "..."}} is used by Keystone, other services wrap
    // the message into a single top-level key.
    if let Some(msg) = value.pointer("/error/message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }

    value.as_object().and_then(|obj| {
        obj.values()
            .find_map(|v| v.get("message").and_then(Value::as_str))
            .map(String::from)
    })
}

impl ErrorKind {
    /// Short description of the error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::AuthorizationFailure => "Failed to authenticate",
            ErrorKind::DiscoveryFailure => "Version discovery failed",
            ErrorKind::VersionNotAvailable => "Requested API version is not available",
            ErrorKind::EndpointNotFound => "Requested endpoint was not found",
            ErrorKind::NoMatchingPlugin => "No matching authentication plugin",
            ErrorKind::MissingAuthPlugin => "Authentication plugin is required",
            ErrorKind::ConnectionError => "Error when accessing the server",
            ErrorKind::Unauthorized => "Authentication is required or has failed",
            ErrorKind::AccessDenied => "Access to the resource is denied",
            ErrorKind::ResourceNotFound => "Requested resource was not found",
            ErrorKind::Conflict => "Requested cannot be fulfilled due to a conflict",
            ErrorKind::InvalidInput => "Input value(s) are invalid or missing",
            ErrorKind::InvalidConfig => "Configuration file or environment is invalid",
            ErrorKind::InvalidResponse => "Received invalid response",
            ErrorKind::InternalServerError => "Internal server error or bad gateway",
        }
    }

    /// Whether this kind denotes a failed version discovery.
    ///
    /// True for `DiscoveryFailure` and its special case `VersionNotAvailable`.
    #[inline]
    pub fn is_discovery_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::DiscoveryFailure | ErrorKind::VersionNotAvailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ref msg) = self.message {
            write!(f, ": {}", msg)
        } else {
            Ok(())
        }
    }
}

impl ::std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Error {
        let msg = if value.is_timeout() {
            format!("Request timed out: {}", value)
        } else if value.is_connect() {
            format!("Unable to establish connection: {}", value)
        } else {
            value.to_string()
        };

        Error::new_with_details(ErrorKind::ConnectionError, value.status(), Some(msg))
    }
}
