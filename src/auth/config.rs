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

//! Loading authentication plugins from parameters, environment and
//! `clouds.yaml`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use super::base::AuthPlugin;
use super::generic::GenericPlugin;
use super::identity::IdentityPlugin;
use super::simple::TokenEndpoint;
use crate::http::HttpConfig;
use crate::identity::{Credentials, IdentityVersion, InterfaceType};
use crate::session::Session;
use crate::{Error, ErrorKind, IdOrName, Result};

/// Name of the plugin used when none is configured.
pub const DEFAULT_AUTH_TYPE: &str = "password";

/// Flat authentication parameters as used in `clouds.yaml` and `OS_*`
/// environment variables.
///
/// The deprecated names `tenant_id`, `tenant_name` and `user_name` are
/// accepted as aliases of `project_id`, `project_name` and `username`.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AuthParams {
    /// Identity service URL.
    pub auth_url: Option<String>,
    /// User name.
    #[serde(alias = "user_name")]
    pub username: Option<String>,
    /// User ID.
    pub user_id: Option<String>,
    /// ID of the domain the user belongs to.
    pub user_domain_id: Option<String>,
    /// Name of the domain the user belongs to.
    pub user_domain_name: Option<String>,
    /// User password.
    pub password: Option<String>,
    /// Existing token, or the fixed token of `token_endpoint`.
    pub token: Option<String>,
    /// ID of the domain to scope to.
    pub domain_id: Option<String>,
    /// Name of the domain to scope to.
    pub domain_name: Option<String>,
    /// ID of the project to scope to.
    #[serde(alias = "tenant_id")]
    pub project_id: Option<String>,
    /// Name of the project to scope to.
    #[serde(alias = "tenant_name")]
    pub project_name: Option<String>,
    /// ID of the domain the project belongs to.
    pub project_domain_id: Option<String>,
    /// Name of the domain the project belongs to.
    pub project_domain_name: Option<String>,
    /// Trust to scope to.
    pub trust_id: Option<String>,
    /// Fixed endpoint of `token_endpoint`.
    pub endpoint: Option<String>,
}

/// Canonical name of an authentication parameter.
///
/// Accepts dashes instead of underscores, any case and deprecated aliases.
pub fn canonical_param_name(name: &str) -> Option<&'static str> {
    Some(match name.to_lowercase().replace('-', "_").as_str() {
        "auth_url" => "auth_url",
        "username" | "user_name" => "username",
        "user_id" => "user_id",
        "user_domain_id" => "user_domain_id",
        "user_domain_name" => "user_domain_name",
        "password" => "password",
        "token" => "token",
        "domain_id" => "domain_id",
        "domain_name" => "domain_name",
        "project_id" | "tenant_id" => "project_id",
        "project_name" | "tenant_name" => "project_name",
        "project_domain_id" => "project_domain_id",
        "project_domain_name" => "project_domain_name",
        "trust_id" => "trust_id",
        "endpoint" => "endpoint",
        _ => return None,
    })
}

#[inline]
fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value.as_deref().filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Missing authentication parameter {}", name),
        )
    })
}

impl AuthParams {
    /// Set a parameter by its (possibly deprecated) name.
    pub fn set<S: Into<String>>(&mut self, name: &str, value: S) -> Result<()> {
        let canonical = canonical_param_name(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown authentication parameter {}", name),
            )
        })?;
        let field = match canonical {
            "auth_url" => &mut self.auth_url,
            "username" => &mut self.username,
            "user_id" => &mut self.user_id,
            "user_domain_id" => &mut self.user_domain_id,
            "user_domain_name" => &mut self.user_domain_name,
            "password" => &mut self.password,
            "token" => &mut self.token,
            "domain_id" => &mut self.domain_id,
            "domain_name" => &mut self.domain_name,
            "project_id" => &mut self.project_id,
            "project_name" => &mut self.project_name,
            "project_domain_id" => &mut self.project_domain_id,
            "project_domain_name" => &mut self.project_domain_name,
            "trust_id" => &mut self.trust_id,
            _ => &mut self.endpoint,
        };
        *field = Some(value.into());
        Ok(())
    }

    /// Authentication URL.
    pub fn auth_url(&self) -> Result<&str> {
        require(&self.auth_url, "auth_url")
    }

    /// Password credentials with the configured scope.
    pub fn password_credentials(&self) -> Result<Credentials> {
        let user = match (&self.user_id, &self.username) {
            (Some(id), _) => IdOrName::from_id(id.clone()),
            (None, Some(name)) => IdOrName::from_name(name.clone()),
            (None, None) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    "Missing authentication parameter username or user_id",
                ))
            }
        };
        let mut creds = Credentials::password(user, require(&self.password, "password")?);
        if let Some(domain) = id_or_name(&self.user_domain_id, &self.user_domain_name) {
            creds = creds.with_user_domain(domain);
        }
        Ok(self.apply_scope(creds))
    }

    /// Token credentials with the configured scope.
    pub fn token_credentials(&self) -> Result<Credentials> {
        let creds = Credentials::token(require(&self.token, "token")?);
        Ok(self.apply_scope(creds))
    }

    fn apply_scope(&self, mut creds: Credentials) -> Credentials {
        if let Some(project) = id_or_name(&self.project_id, &self.project_name) {
            let domain = id_or_name(&self.project_domain_id, &self.project_domain_name);
            creds = creds.with_project_scope(project, domain);
        }
        if let Some(domain) = id_or_name(&self.domain_id, &self.domain_name) {
            creds = creds.with_domain_scope(domain);
        }
        if let Some(ref trust_id) = self.trust_id {
            creds = creds.with_trust(trust_id.clone());
        }
        creds
    }
}

fn id_or_name(id: &Option<String>, name: &Option<String>) -> Option<IdOrName> {
    match (id, name) {
        (Some(id), _) => Some(IdOrName::from_id(id.clone())),
        (None, Some(name)) => Some(IdOrName::from_name(name.clone())),
        (None, None) => None,
    }
}

impl fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hidden = |value: &Option<String>| value.as_ref().map(|_| "***");
        f.debug_struct("AuthParams")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("user_domain_id", &self.user_domain_id)
            .field("user_domain_name", &self.user_domain_name)
            .field("password", &hidden(&self.password))
            .field("token", &hidden(&self.token))
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("project_domain_id", &self.project_domain_id)
            .field("project_domain_name", &self.project_domain_name)
            .field("trust_id", &self.trust_id)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Function creating a plugin from parameters.
pub type PluginLoader = Arc<dyn Fn(&AuthParams) -> Result<Arc<dyn AuthPlugin>> + Send + Sync>;

/// Registry of named plugin loaders.
///
/// The default registry contains `password`, `token` (both picking the
/// Identity API version through discovery), `v2password`, `v2token`,
/// `v3password`, `v3token` and `token_endpoint` (also known as
/// `admin_token`).
#[derive(Clone)]
pub struct PluginRegistry {
    loaders: BTreeMap<String, PluginLoader>,
}

fn identity_loader(version: IdentityVersion, password: bool) -> PluginLoader {
    Arc::new(move |params: &AuthParams| -> Result<Arc<dyn AuthPlugin>> {
        let creds = if password {
            params.password_credentials()?
        } else {
            params.token_credentials()?
        };
        let plugin = IdentityPlugin::new(params.auth_url()?, version, creds)?;
        Ok(Arc::new(plugin))
    })
}

fn generic_loader(password: bool) -> PluginLoader {
    Arc::new(move |params: &AuthParams| -> Result<Arc<dyn AuthPlugin>> {
        let creds = if password {
            params.password_credentials()?
        } else {
            params.token_credentials()?
        };
        let plugin = GenericPlugin::new(params.auth_url()?, creds)?;
        Ok(Arc::new(plugin))
    })
}

fn token_endpoint_loader() -> PluginLoader {
    Arc::new(|params: &AuthParams| -> Result<Arc<dyn AuthPlugin>> {
        let plugin = TokenEndpoint::new(
            require(&params.endpoint, "endpoint")?,
            require(&params.token, "token")?,
        )?;
        Ok(Arc::new(plugin))
    })
}

impl Default for PluginRegistry {
    fn default() -> PluginRegistry {
        let mut registry = PluginRegistry::empty();
        registry.register("password", generic_loader(true));
        registry.register("token", generic_loader(false));
        registry.register("v2password", identity_loader(IdentityVersion::V2, true));
        registry.register("v2token", identity_loader(IdentityVersion::V2, false));
        registry.register("v3password", identity_loader(IdentityVersion::V3, true));
        registry.register("v3token", identity_loader(IdentityVersion::V3, false));
        registry.register("token_endpoint", token_endpoint_loader());
        registry.register("admin_token", token_endpoint_loader());
        registry
    }
}

impl PluginRegistry {
    /// Registry without any plugins.
    pub fn empty() -> PluginRegistry {
        PluginRegistry {
            loaders: BTreeMap::new(),
        }
    }

    /// Register a loader, replacing an existing one with the same name.
    pub fn register<S: Into<String>>(&mut self, name: S, loader: PluginLoader) {
        let name = name.into();
        if self.loaders.insert(name.clone(), loader).is_some() {
            debug!("Replaced authentication plugin loader {}", name);
        }
    }

    /// Names of registered plugins.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Create a plugin by its name.
    pub fn load(&self, name: &str, params: &AuthParams) -> Result<Arc<dyn AuthPlugin>> {
        let loader = self.loaders.get(name).ok_or_else(|| {
            Error::new(
                ErrorKind::NoMatchingPlugin,
                format!("No authentication plugin named {}", name),
            )
        })?;
        debug!("Loading authentication plugin {} from {:?}", name, params);
        loader(params)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Complete configuration of a cloud connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudConfig {
    /// Name of the authentication plugin.
    pub auth_type: String,
    /// Authentication parameters.
    pub params: AuthParams,
    /// Default region.
    pub region: Option<String>,
    /// Default endpoint interface.
    pub interface: Option<InterfaceType>,
    /// HTTP transport configuration.
    pub http: HttpConfig,
}

impl Default for CloudConfig {
    fn default() -> CloudConfig {
        CloudConfig {
            auth_type: String::from(DEFAULT_AUTH_TYPE),
            params: AuthParams::default(),
            region: None,
            interface: None,
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Cloud {
    #[serde(default)]
    auth_type: Option<String>,
    #[serde(default)]
    auth: AuthParams,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    verify: Option<bool>,
    #[serde(default)]
    api_timeout: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Root {
    clouds: HashMap<String, Cloud>,
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("Invalid boolean value {} for {}", value, name),
        )),
    }
}

fn parse_interface(value: &str) -> Result<InterfaceType> {
    value.parse().map_err(|e: Error| {
        Error::new(
            ErrorKind::InvalidConfig,
            e.message().unwrap_or("Invalid interface"),
        )
    })
}

fn parse_timeout(value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("Invalid API timeout {}", value),
        )),
    }
}

impl CloudConfig {
    /// Read the configuration from `OS_*` variables.
    ///
    /// `OS_AUTH_TYPE` selects the plugin, `OS_REGION_NAME`, `OS_INTERFACE`
    /// (or `OS_ENDPOINT_TYPE`), `OS_INSECURE` and `OS_API_TIMEOUT` configure
    /// the session. Any other `OS_<NAME>` is treated as the authentication
    /// parameter `<name>`, unknown ones are ignored.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<CloudConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = CloudConfig::default();
        for (key, value) in vars {
            let key = key.as_ref();
            let name = match key.strip_prefix("OS_") {
                Some(name) => name,
                None => continue,
            };
            let value = value.into();
            match name {
                "AUTH_TYPE" => config.auth_type = value,
                "REGION_NAME" => config.region = Some(value),
                "INTERFACE" | "ENDPOINT_TYPE" => config.interface = Some(parse_interface(&value)?),
                "INSECURE" => config.http.insecure = parse_bool(key, &value)?,
                "API_TIMEOUT" => {
                    let timeout = value.parse::<f64>().map_err(|e| {
                        Error::new(
                            ErrorKind::InvalidConfig,
                            format!("Invalid {}: {}", key, e),
                        )
                    })?;
                    config.http.timeout = Some(parse_timeout(timeout)?);
                }
                _ => {
                    if config.params.set(name, value).is_err() {
                        debug!("Ignoring unknown environment variable {}", key);
                    }
                }
            }
        }
        Ok(config)
    }

    /// Read the configuration of `cloud_name` from a `clouds.yaml` document.
    pub fn from_clouds_yaml(content: &str, cloud_name: &str) -> Result<CloudConfig> {
        let root: Root = serde_yaml::from_str(content).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Cannot parse clouds.yaml: {}", e),
            )
        })?;
        CloudConfig::from_cloud(root, cloud_name)
    }

    fn from_cloud(mut root: Root, cloud_name: &str) -> Result<CloudConfig> {
        let cloud = root.clouds.remove(cloud_name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("No such cloud: {}", cloud_name),
            )
        })?;

        let mut http = HttpConfig::default();
        if let Some(verify) = cloud.verify {
            http.insecure = !verify;
        }
        if let Some(timeout) = cloud.api_timeout {
            http.timeout = Some(parse_timeout(timeout)?);
        }
        Ok(CloudConfig {
            auth_type: cloud
                .auth_type
                .unwrap_or_else(|| String::from(DEFAULT_AUTH_TYPE)),
            params: cloud.auth,
            region: cloud.region_name,
            interface: cloud.interface.as_deref().map(parse_interface).transpose()?,
            http,
        })
    }

    /// Create the configured plugin.
    pub fn load_plugin(&self, registry: &PluginRegistry) -> Result<Arc<dyn AuthPlugin>> {
        registry.load(&self.auth_type, &self.params)
    }

    /// Create a session using the default plugin registry.
    pub fn into_session(self) -> Result<Session> {
        self.into_session_with_registry(&PluginRegistry::default())
    }

    /// Create a session using the given plugin registry.
    pub fn into_session_with_registry(self, registry: &PluginRegistry) -> Result<Session> {
        let plugin = self.load_plugin(registry)?;
        let mut session = Session::new_with_config(plugin, &self.http)?;
        if let Some(interface) = self.interface {
            session = session.with_endpoint_interface(interface);
        }
        if let Some(region) = self.region {
            session = session.with_region(region);
        }
        Ok(session)
    }
}

fn find_config() -> Option<PathBuf> {
    let current = Path::new("./clouds.yaml");
    if current.is_file() {
        match current.canonicalize() {
            Ok(val) => return Some(val),
            Err(e) => warn!("Cannot canonicalize {:?}: {}", current, e),
        }
    }

    if let Some(mut home) = dirs::home_dir() {
        home.push(".config/openstack/clouds.yaml");
        if home.is_file() {
            return Some(home);
        }
    } else {
        warn!("Cannot find home directory");
    }

    let abs = PathBuf::from("/etc/openstack/clouds.yaml");
    if abs.is_file() {
        Some(abs)
    } else {
        None
    }
}

/// Create a `Session` from the config file.
pub fn from_config<S: AsRef<str>>(cloud_name: S) -> Result<Session> {
    let path = find_config().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            "clouds.yaml was not found in any location",
        )
    })?;
    debug!("Using cloud configuration from {}", path.display());
    let file = File::open(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot read clouds.yaml: {}", e),
        )
    })?;
    let root: Root = serde_yaml::from_reader(file).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot parse clouds.yaml: {}", e),
        )
    })?;

    CloudConfig::from_cloud(root, cloud_name.as_ref())?.into_session()
}

/// Create a `Session` from environment variables.
pub fn from_env() -> Result<Session> {
    CloudConfig::from_env_vars(std::env::vars())?.into_session()
}
