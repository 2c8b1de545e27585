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

//! Authentication plugins.
//!
//! Accessing OpenStack services requires a token from the Identity service.
//! An authentication plugin obtains the token, caches it and knows the
//! service catalog. The usual workflow is as follows:
//!
//! 1. Create a suitable plugin.
//! 2. Populate it with credentials and the requested scope.
//! 3. Create a [Session](../struct.Session.html) with it.
//! 4. Send requests through the session.
//!
//! # Plugins
//!
//! * [IdentityPlugin] talks to a known Identity API version (v2 or v3).
//! * [GenericPlugin] discovers which versions the Identity service supports
//!   and picks one based on the credentials.
//! * [TokenEndpoint] uses a fixed token and endpoint.
//!
//! Plugins are shared between sessions, a token is obtained only once for
//! all of them.
//!
//! # Examples
//!
//! Creating a session using a project-scoped token:
//!
//! ```rust,no_run
//! # fn example() -> keystoneauth::Result<()> {
//! use keystoneauth::IdOrName;
//! use keystoneauth::auth::GenericPlugin;
//!
//! let auth = GenericPlugin::password(
//!     "https://my.cloud.com/identity",
//!     IdOrName::from_name("admin"),
//!     "pa$$w0rd",
//! )?
//! .with_user_domain(IdOrName::from_name("My Domain"))
//! .with_project_scope(IdOrName::from_name("project1"), IdOrName::from_name("My Domain"));
//! let session = keystoneauth::Session::new(auth)?;
//! # Ok(()) }
//! ```
//!
//! Creating a session from environment variables or `clouds.yaml`:
//!
//! ```rust,no_run
//! # fn example() -> keystoneauth::Result<()> {
//! let from_env = keystoneauth::auth::from_env()?;
//! let from_config = keystoneauth::auth::from_config("devstack")?;
//! # Ok(()) }
//! ```

mod base;
mod config;
mod generic;
mod identity;
mod simple;

pub use self::base::{AuthPlugin, EndpointFilter};
pub use self::config::{
    canonical_param_name, from_config, from_env, AuthParams, CloudConfig, PluginLoader,
    PluginRegistry, DEFAULT_AUTH_TYPE,
};
pub use self::generic::{select_version, GenericPlugin};
pub use self::identity::{IdentityPlugin, PluginState, DEFAULT_STALE_DURATION};
pub use self::simple::TokenEndpoint;
