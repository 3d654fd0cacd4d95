// Inventory options (the `*latitude.yml` inventory file)

use crate::error::{AppError, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Value the `plugin` option must carry
pub const PLUGIN_NAME: &str = "latitude_inventory";

/// Environment variable holding the API token
pub const TOKEN_ENV_VAR: &str = "LATITUDE_API_TOKEN";

pub const DEFAULT_API_URL: &str = "https://api.latitude.sh";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_PAGES: u32 = 1000;
pub const DEFAULT_KEYED_SEPARATOR: &str = "_";

const SOURCE_SUFFIXES: [&str; 2] = ["latitude.yml", "latitude.yaml"];

/// True when `path` names an inventory file of this source
///
/// # Example
/// ```
/// use latitude_inventory_core::application::options::verify_source_path;
/// assert!(verify_source_path("inventory/prod.latitude.yml"));
/// assert!(!verify_source_path("inventory/hosts.yml"));
/// ```
pub fn verify_source_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| SOURCE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
        .unwrap_or(false)
}

/// API token that never shows up in Debug output
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// List option that also accepts a single string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(pub Vec<String>);

impl StringList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
            Nothing,
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(value) => StringList(vec![value]),
            OneOrMany::Many(values) => StringList(values),
            OneOrMany::Nothing => StringList::default(),
        })
    }
}

/// Map option that keeps the file's key order
///
/// `compose` entries are applied in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for OrderedMapVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of names to expressions")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(k, _): &(String, V)| *k == key) {
                        return Err(de::Error::custom(format!("duplicate key {:?}", key)));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(OrderedMap::default())
            }
        }

        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_separator() -> String {
    DEFAULT_KEYED_SEPARATOR.to_string()
}

fn default_true() -> bool {
    true
}

/// One `keyed_groups` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyedGroup {
    /// Expression whose value names the group(s)
    pub key: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Used when the key evaluates to an empty string
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default = "default_true")]
    pub trailing_separator: bool,
    #[serde(default)]
    pub parent_group: Option<String>,
}

impl KeyedGroup {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: String::new(),
            separator: default_separator(),
            default_value: None,
            trailing_separator: true,
            parent_group: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Parsed inventory file
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryOptions {
    pub plugin: String,
    pub latitude_project: String,
    #[serde(default)]
    pub latitude_api_token: Option<ApiToken>,
    #[serde(default = "default_api_url")]
    pub latitude_api_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub include_tags: StringList,
    #[serde(default)]
    pub exclude_tags: StringList,
    #[serde(default)]
    pub compose: OrderedMap<String>,
    #[serde(default)]
    pub groups: OrderedMap<String>,
    #[serde(default)]
    pub keyed_groups: Vec<KeyedGroup>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_true")]
    pub leading_separator: bool,
}

impl InventoryOptions {
    /// Options for `project` with every other setting at its default
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            plugin: PLUGIN_NAME.to_string(),
            latitude_project: project.into(),
            latitude_api_token: None,
            latitude_api_url: default_api_url(),
            timeout: DEFAULT_TIMEOUT_SECS,
            max_pages: DEFAULT_MAX_PAGES,
            include_tags: StringList::default(),
            exclude_tags: StringList::default(),
            compose: OrderedMap::default(),
            groups: OrderedMap::default(),
            keyed_groups: Vec::new(),
            strict: false,
            leading_separator: true,
        }
    }

    /// Check option values that serde cannot
    pub fn validate(&self) -> Result<()> {
        let plugin_ok = self.plugin == PLUGIN_NAME
            || self.plugin.ends_with(&format!(".{}", PLUGIN_NAME));
        if !plugin_ok {
            return Err(AppError::Config(format!(
                "plugin must be {:?}, got {:?}",
                PLUGIN_NAME, self.plugin
            )));
        }

        if self.latitude_project.trim().is_empty() {
            return Err(AppError::Validation(
                "latitude_project cannot be empty".to_string(),
            ));
        }

        if self.latitude_api_url.trim().is_empty() {
            return Err(AppError::Validation(
                "latitude_api_url cannot be empty".to_string(),
            ));
        }

        if self.timeout == 0 {
            return Err(AppError::Validation(
                "timeout must be at least 1 second".to_string(),
            ));
        }

        if self.max_pages == 0 {
            return Err(AppError::Validation(
                "max_pages must be at least 1".to_string(),
            ));
        }

        if let Some(index) = self.keyed_groups.iter().position(|k| k.key.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "keyed_groups[{}].key cannot be empty",
                index
            )));
        }

        Ok(())
    }

    /// Pick the API token: inventory file first, then the environment
    ///
    /// `env_token` is the value of `LATITUDE_API_TOKEN`, if set.
    pub fn resolve_token(&self, env_token: Option<String>) -> Result<ApiToken> {
        if let Some(token) = self.latitude_api_token.as_ref().filter(|t| !t.is_blank()) {
            debug!("Using latitude_api_token from inventory file");
            return Ok(token.clone());
        }

        if let Some(token) = env_token.map(ApiToken::new).filter(|t| !t.is_blank()) {
            debug!(env = TOKEN_ENV_VAR, "Using API token from environment");
            return Ok(token);
        }

        Err(AppError::Authentication(format!(
            "missing API token: set latitude_api_token or {}",
            TOKEN_ENV_VAR
        )))
    }
}
