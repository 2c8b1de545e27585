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

//! Credentials accepted by the identity plugins.

use std::fmt;

use crate::{Error, ErrorKind, IdOrName, Result};

/// Project to scope a token to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectScope {
    /// Project ID or name.
    pub project: IdOrName,
    /// ID or name of the project domain (only meaningful for project names).
    pub domain: Option<IdOrName>,
}

/// Requested scope of a token.
///
/// A project and a domain scope are mutually exclusive. Both can still be set
/// here, authentication then fails with `AuthorizationFailure` before any
/// request is made.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeRequest {
    /// Project scope.
    pub project: Option<ProjectScope>,
    /// Domain scope.
    pub domain: Option<IdOrName>,
    /// Trust to use for delegation.
    pub trust_id: Option<String>,
}

/// Password credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordCredentials {
    /// User ID or name.
    pub user: IdOrName,
    /// ID or name of the user domain (only meaningful for user names).
    pub user_domain: Option<IdOrName>,
    /// User password.
    pub password: String,
    /// Requested scope.
    pub scope: ScopeRequest,
}

/// Credentials based on an existing token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    /// Existing token.
    pub token: String,
    /// Requested scope.
    pub scope: ScopeRequest,
}

/// Supported authentication methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    /// User name or ID and password.
    Password(PasswordCredentials),
    /// Pre-existing token.
    Token(TokenCredentials),
}

impl ScopeRequest {
    /// Whether no scope is requested.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.domain.is_none() && self.trust_id.is_none()
    }

    /// Fail if both a project and a domain scope are requested.
    pub fn validate(&self) -> Result<()> {
        if self.project.is_some() && self.domain.is_some() {
            Err(Error::new(
                ErrorKind::AuthorizationFailure,
                "Authentication cannot be scoped to both domain and project",
            ))
        } else {
            Ok(())
        }
    }
}

impl Credentials {
    /// Password credentials with an empty scope.
    pub fn password<S: Into<String>>(user: IdOrName, password: S) -> Credentials {
        Credentials::Password(PasswordCredentials {
            user,
            user_domain: None,
            password: password.into(),
            scope: ScopeRequest::default(),
        })
    }

    /// Token credentials with an empty scope.
    pub fn token<S: Into<String>>(token: S) -> Credentials {
        Credentials::Token(TokenCredentials {
            token: token.into(),
            scope: ScopeRequest::default(),
        })
    }

    /// Set the domain of the user (no-op for token credentials).
    pub fn with_user_domain(mut self, domain: IdOrName) -> Credentials {
        if let Credentials::Password(ref mut pw) = self {
            pw.user_domain = Some(domain);
        }
        self
    }

    /// Scope to a project.
    pub fn with_project_scope(
        mut self,
        project: IdOrName,
        domain: impl Into<Option<IdOrName>>,
    ) -> Credentials {
        self.scope_mut().project = Some(ProjectScope {
            project,
            domain: domain.into(),
        });
        self
    }

    /// Scope to a domain.
    pub fn with_domain_scope(mut self, domain: IdOrName) -> Credentials {
        self.scope_mut().domain = Some(domain);
        self
    }

    /// Use a trust.
    pub fn with_trust<S: Into<String>>(mut self, trust_id: S) -> Credentials {
        self.scope_mut().trust_id = Some(trust_id.into());
        self
    }

    /// Requested scope.
    #[inline]
    pub fn scope(&self) -> &ScopeRequest {
        match self {
            Credentials::Password(pw) => &pw.scope,
            Credentials::Token(tok) => &tok.scope,
        }
    }

    /// Requested scope (mutable).
    #[inline]
    pub fn scope_mut(&mut self) -> &mut ScopeRequest {
        match self {
            Credentials::Password(pw) => &mut pw.scope,
            Credentials::Token(tok) => &mut tok.scope,
        }
    }

    /// Check the invariants that do not depend on the protocol.
    pub fn validate(&self) -> Result<()> {
        self.scope().validate()?;
        let empty = match self {
            Credentials::Password(pw) => pw.user.as_str().is_empty(),
            Credentials::Token(tok) => tok.token.is_empty(),
        };
        if empty {
            Err(Error::new(
                ErrorKind::AuthorizationFailure,
                "User or token is required for authentication",
            ))
        } else {
            Ok(())
        }
    }

    /// Whether any field that only Identity API v3 understands is set.
    ///
    /// These are the domain scope, the project domain and the user domain.
    pub fn has_v3_fields(&self) -> bool {
        let scope = self.scope();
        let user_domain = match self {
            Credentials::Password(pw) => pw.user_domain.is_some(),
            Credentials::Token(_) => false,
        };
        scope.domain.is_some()
            || scope
                .project
                .as_ref()
                .map(|p| p.domain.is_some())
                .unwrap_or(false)
            || user_domain
    }
}

impl fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("user", &self.user)
            .field("user_domain", &self.user_domain)
            .field("password", &"******")
            .field("scope", &self.scope)
            .finish()
    }
}

impl fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("token", &"******")
            .field("scope", &self.scope)
            .finish()
    }
}
