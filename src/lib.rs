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

//! Client-side authentication for OpenStack Identity (Keystone).
//!
//! The crate obtains tokens from the Identity service using API v2 or v3,
//! caches them together with the service catalog, re-authenticates when a
//! token is about to expire and resolves service endpoints, optionally
//! pinned to an API version through version discovery.
//!
//! # Features
//!
//! * [Authentication plugins](auth/index.html): password, token and trust
//!   based, for a fixed Identity API version or discovering it.
//! * [Version discovery](discovery/index.html) with a per-URL cache.
//! * A [Session] that injects tokens into requests.
//! * Loading from `clouds.yaml` and `OS_*` environment variables.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> keystoneauth::Result<()> {
//! use keystoneauth::auth::{EndpointFilter, IdentityPlugin};
//! use keystoneauth::IdOrName;
//!
//! let auth = IdentityPlugin::v3_password(
//!     "https://cloud.local/identity/v3",
//!     IdOrName::from_name("admin"),
//!     "pa$$w0rd",
//! )?
//! .with_user_domain(IdOrName::from_id("default"))
//! .with_project_scope(IdOrName::from_name("demo"), IdOrName::from_id("default"));
//!
//! let session = keystoneauth::Session::new(auth)?;
//! let compute = session
//!     .get_endpoint(EndpointFilter::new("compute").with_version((2, 1)))
//!     .await?;
//! # Ok(()) }
//! ```

#![crate_name = "keystoneauth"]
#![crate_type = "lib"]
// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
// Taken from https://github.com/rust-unofficial/patterns/
#![deny(
    bare_trait_objects,
    improper_ctypes,
    missing_debug_implementations,
    missing_docs,
    no_mangle_generic_items,
    non_shorthand_field_patterns,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unsafe_code,
    unused_allocation,
    unused_comparisons,
    unused_import_braces,
    unused_parens,
    while_true
)]
#![warn(unused, unused_qualifications, unused_results)]

#[macro_use]
extern crate serde_derive;

pub mod auth;
mod common;
pub mod discovery;
mod error;
pub mod http;
pub mod identity;
pub mod keyring;
mod session;
mod utils;

pub use crate::common::{ApiVersion, IdOrName};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::session::{RequestOptions, Session};
