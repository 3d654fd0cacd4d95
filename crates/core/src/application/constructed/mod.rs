// Constructed features: compose, groups, keyed_groups
//
// Expressions are parsed once per run (from InventoryOptions) and then
// applied to every host added to the inventory.

pub mod expression;

pub use expression::{is_truthy, render_value, Expression, ExpressionError};

use crate::application::options::{InventoryOptions, KeyedGroup};
use crate::domain::{is_reserved_group, sanitize_group_name, HostVars, Inventory};
use crate::error::{AppError, Result};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CompiledKeyedGroup {
    key: Expression,
    settings: KeyedGroup,
}

/// Pre-parsed compose / groups / keyed_groups of one inventory file
#[derive(Debug, Clone, Default)]
pub struct Constructed {
    compose: Vec<(String, Expression)>,
    groups: Vec<(String, Expression)>,
    keyed_groups: Vec<CompiledKeyedGroup>,
    strict: bool,
    leading_separator: bool,
}

fn compile(section: &str, name: &str, source: &str) -> Result<Expression> {
    Expression::parse(source)
        .map_err(|e| AppError::Config(format!("{}.{}: {}", section, name, e)))
}

impl Constructed {
    pub fn from_options(options: &InventoryOptions) -> Result<Self> {
        let compose = options
            .compose
            .iter()
            .map(|(name, source)| Ok((name.to_string(), compile("compose", name, source)?)))
            .collect::<Result<Vec<_>>>()?;

        let groups = options
            .groups
            .iter()
            .map(|(name, source)| {
                if is_reserved_group(name) {
                    return Err(AppError::Config(format!(
                        "groups.{}: reserved group name",
                        name
                    )));
                }
                Ok((name.to_string(), compile("groups", name, source)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let keyed_groups = options
            .keyed_groups
            .iter()
            .enumerate()
            .map(|(index, keyed)| {
                Ok(CompiledKeyedGroup {
                    key: compile("keyed_groups", &index.to_string(), &keyed.key)?,
                    settings: keyed.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            compose,
            groups,
            keyed_groups,
            strict: options.strict,
            leading_separator: options.leading_separator,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.compose.is_empty() && self.groups.is_empty() && self.keyed_groups.is_empty()
    }

    /// Evaluate every compose entry against `base`
    ///
    /// Undefined variables are always errors here, whatever `strict` says.
    pub fn compose_vars(&self, base: &HostVars) -> Result<Vec<(String, Value)>> {
        self.compose
            .iter()
            .map(|(name, expr)| {
                let value = expr.evaluate(base).map_err(|e| {
                    AppError::Config(format!("compose.{} ({}): {}", name, expr, e))
                })?;
                Ok((name.clone(), value))
            })
            .collect()
    }

    /// Apply compose, groups and keyed_groups to `host`
    pub fn apply(&self, inventory: &mut Inventory, host: &str) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let base = inventory.host_vars(host).cloned().unwrap_or_default();
        for (name, value) in self.compose_vars(&base)? {
            inventory.set_variable(host, &name, value)?;
        }

        // groups and keyed_groups see composed variables too
        let vars = inventory.host_vars(host).cloned().unwrap_or_default();

        for (group, condition) in &self.groups {
            match condition.evaluate_condition(&vars) {
                Ok(true) => {
                    debug!(hostname = host, group = %group, "Host added to conditional group");
                    inventory.add_host(host, Some(group))?;
                }
                Ok(false) => {}
                Err(e) => self.tolerate(host, &format!("groups.{}", group), e)?,
            }
        }

        for keyed in &self.keyed_groups {
            let key = match keyed.key.evaluate(&vars) {
                Ok(value) => value,
                Err(e) => {
                    self.tolerate(host, &format!("keyed_groups key {}", keyed.key), e)?;
                    continue;
                }
            };

            if !key_constructs_groups(&key, keyed.settings.default_value.as_deref()) {
                // An empty list or map is a valid key that yields no group
                if self.strict && !is_empty_collection(&key) {
                    return Err(AppError::Config(format!(
                        "keyed group key {} is empty for host {}",
                        keyed.key, host
                    )));
                }
                debug!(hostname = host, key = %keyed.key, "Keyed group skipped: empty key");
                continue;
            }

            for name in keyed_group_names(&keyed.settings, &key, self.leading_separator) {
                if is_reserved_group(&name) {
                    warn!(hostname = host, group = %name, "Keyed group skipped: reserved name");
                    continue;
                }
                inventory.add_host(host, Some(&name))?;
                debug!(hostname = host, group = %name, "Host added to keyed group");

                if let Some(parent) = &keyed.settings.parent_group {
                    let parent = sanitize_group_name(parent);
                    if !parent.is_empty() {
                        inventory.add_child(&parent, &name)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Swallow an evaluation error unless running strict
    fn tolerate(&self, host: &str, entry: &str, error: ExpressionError) -> Result<()> {
        if self.strict {
            return Err(AppError::Config(format!("{} for host {}: {}", entry, host, error)));
        }
        if error.is_undefined() {
            debug!(hostname = host, entry, error = %error, "Entry skipped");
        } else {
            warn!(hostname = host, entry, error = %error, "Entry skipped");
        }
        Ok(())
    }
}

/// A falsy key builds no group, except `""` when a default_value is set
fn key_constructs_groups(key: &Value, default_value: Option<&str>) -> bool {
    is_truthy(key) || (key.as_str() == Some("") && default_value.is_some())
}

fn is_empty_collection(key: &Value) -> bool {
    match key {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Group names produced by one keyed group for an evaluated key
///
/// Falsy keys (`""`, `0`, `false`, null, empty list or map) produce no
/// names unless the key is `""` and a default_value is set.
pub fn keyed_group_names(group: &KeyedGroup, key: &Value, leading_separator: bool) -> Vec<String> {
    if !key_constructs_groups(key, group.default_value.as_deref()) {
        return Vec::new();
    }

    let default_or = |raw: String| match (&group.default_value, raw.is_empty()) {
        (Some(default), true) => default.clone(),
        _ => raw,
    };

    let raw_names: Vec<String> = match key {
        Value::Array(items) => items.iter().map(|v| default_or(render_value(v))).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| {
                let value = render_value(value);
                match (&group.default_value, value.is_empty()) {
                    (Some(default), true) => format!("{}{}{}", name, group.separator, default),
                    (None, true) if !group.trailing_separator => name.clone(),
                    _ => format!("{}{}{}", name, group.separator, value),
                }
            })
            .collect(),
        other => vec![default_or(render_value(other))],
    };

    let separator = if group.prefix.is_empty() && !leading_separator {
        ""
    } else {
        group.separator.as_str()
    };

    raw_names
        .into_iter()
        .map(|raw| sanitize_group_name(&format!("{}{}{}", group.prefix, separator, raw)))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::options::OrderedMap;
    use serde_json::json;

    fn host_inventory() -> Inventory {
        let mut inv = Inventory::new();
        inv.add_host("prod-web-01", Some("web")).unwrap();
        for (k, v) in [
            ("server_name", json!("prod-web-01")),
            ("public_ip_address", json!("203.0.113.10")),
            ("group", json!("web")),
            ("latitude_plan", json!("c2-small-x86")),
            ("latitude_status", json!("on")),
        ] {
            inv.set_variable("prod-web-01", k, v).unwrap();
        }
        inv
    }

    fn ordered(entries: &[(&str, &str)]) -> OrderedMap<String> {
        OrderedMap(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_compose_sets_variables() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[
            ("ansible_host", "public_ip_address"),
            ("ansible_user", "'root'"),
        ]);
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();

        let vars = inv.host_vars("prod-web-01").unwrap();
        assert_eq!(vars["ansible_host"], json!("203.0.113.10"));
        assert_eq!(vars["ansible_user"], json!("root"));
    }

    #[test]
    fn test_compose_undefined_is_error_even_when_not_strict() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("ansible_host", "private_ip")]);
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        let err = constructed.apply(&mut inv, "prod-web-01").unwrap_err();
        assert!(err.to_string().contains("private_ip"));
    }

    #[test]
    fn test_compose_syntax_error_is_reported_at_load() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("broken", "a ==")]);
        let err = Constructed::from_options(&opts).unwrap_err();
        assert!(err.to_string().contains("compose.broken"));
    }

    #[test]
    fn test_conditional_groups() {
        let mut opts = InventoryOptions::new("p");
        opts.groups = ordered(&[
            ("powered_on", "latitude_status == 'on'"),
            ("databases", "group == 'db'"),
            ("from_compose", "role == 'frontend'"),
        ]);
        opts.compose = ordered(&[("role", "'frontend'")]);
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();

        assert!(inv.group("powered_on").unwrap().hosts.contains("prod-web-01"));
        assert!(inv.group("databases").is_none());
        assert!(inv.group("from_compose").is_some());
    }

    #[test]
    fn test_undefined_in_groups_depends_on_strict() {
        let mut opts = InventoryOptions::new("p");
        opts.groups = ordered(&[("tagged", "missing_var == 'x'")]);

        let constructed = Constructed::from_options(&opts).unwrap();
        let mut inv = host_inventory();
        assert!(constructed.apply(&mut inv, "prod-web-01").is_ok());
        assert!(inv.group("tagged").is_none());

        opts.strict = true;
        let constructed = Constructed::from_options(&opts).unwrap();
        let mut inv = host_inventory();
        let err = constructed.apply(&mut inv, "prod-web-01").unwrap_err();
        assert!(err.to_string().contains("groups.tagged"));
    }

    #[test]
    fn test_keyed_groups_with_parent() {
        let mut opts = InventoryOptions::new("p");
        let mut keyed = KeyedGroup::new("latitude_plan").with_prefix("plan");
        keyed.parent_group = Some("plans".to_string());
        opts.keyed_groups = vec![keyed, KeyedGroup::new("latitude_status")];
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();

        assert!(inv.group("plan_c2_small_x86").unwrap().hosts.contains("prod-web-01"));
        assert!(inv.group("plans").unwrap().children.contains("plan_c2_small_x86"));
        assert!(inv.group("_on").is_some());
        assert!(!inv.top_level_groups().contains(&"plan_c2_small_x86"));
    }

    #[test]
    fn test_keyed_groups_undefined_key() {
        let mut opts = InventoryOptions::new("p");
        opts.keyed_groups = vec![KeyedGroup::new("latitude_site")];

        let constructed = Constructed::from_options(&opts).unwrap();
        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();
        assert_eq!(inv.group_names().collect::<Vec<_>>(), vec!["web"]);

        opts.strict = true;
        let constructed = Constructed::from_options(&opts).unwrap();
        let mut inv = host_inventory();
        assert!(constructed.apply(&mut inv, "prod-web-01").is_err());
    }

    #[test]
    fn test_keyed_group_names_string_and_list() {
        let group = KeyedGroup::new("k").with_prefix("os");
        assert_eq!(keyed_group_names(&group, &json!("ubuntu"), true), vec!["os_ubuntu"]);
        assert_eq!(
            keyed_group_names(&group, &json!(["a", "b-c"]), true),
            vec!["os_a", "os_b_c"]
        );

        let bare = KeyedGroup::new("k");
        assert_eq!(keyed_group_names(&bare, &json!("web"), true), vec!["_web"]);
        assert_eq!(keyed_group_names(&bare, &json!("web"), false), vec!["web"]);
        assert_eq!(keyed_group_names(&bare, &json!(42), false), vec!["42"]);
    }

    #[test]
    fn test_keyed_group_names_defaults_and_maps() {
        let mut group = KeyedGroup::new("k").with_prefix("tag");
        assert!(keyed_group_names(&group, &json!(""), true).is_empty());
        assert!(keyed_group_names(&group, &json!(0), true).is_empty());
        assert!(keyed_group_names(&group, &json!(false), true).is_empty());

        group.default_value = Some("none".to_string());
        assert_eq!(keyed_group_names(&group, &json!(""), true), vec!["tag_none"]);
        assert_eq!(
            keyed_group_names(&group, &json!({"env": "", "role": "db"}), true),
            vec!["tag_env_none", "tag_role_db"]
        );

        group.default_value = None;
        group.trailing_separator = false;
        assert_eq!(
            keyed_group_names(&group, &json!({"env": ""}), true),
            vec!["tag_env"]
        );

        let bare = KeyedGroup::new("k");
        assert!(keyed_group_names(&bare, &json!(""), false).is_empty());
    }

    #[test]
    fn test_empty_keyed_key_creates_no_group() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("role", "''")]);
        opts.keyed_groups = vec![
            KeyedGroup::new("role").with_prefix("role"),
            KeyedGroup::new("role"),
        ];
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();
        assert_eq!(inv.group_names().collect::<Vec<_>>(), vec!["web"]);

        opts.strict = true;
        let constructed = Constructed::from_options(&opts).unwrap();
        let mut inv = host_inventory();
        let err = constructed.apply(&mut inv, "prod-web-01").unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn test_empty_keyed_key_uses_default_value() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("role", "''")]);
        let mut keyed = KeyedGroup::new("role").with_prefix("role");
        keyed.default_value = Some("unset".to_string());
        opts.keyed_groups = vec![keyed];
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();
        assert!(inv.group("role_unset").unwrap().hosts.contains("prod-web-01"));
    }

    #[test]
    fn test_empty_list_key_is_valid_even_when_strict() {
        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("labels", "[]")]);
        opts.keyed_groups = vec![KeyedGroup::new("labels").with_prefix("label")];
        opts.strict = true;
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();
        assert_eq!(inv.group_names().collect::<Vec<_>>(), vec!["web"]);
    }

    #[test]
    fn test_reserved_group_names_never_become_groups() {
        let mut opts = InventoryOptions::new("p");
        opts.groups = ordered(&[("_meta", "true")]);
        let err = Constructed::from_options(&opts).unwrap_err();
        assert!(err.to_string().contains("groups._meta"));

        let mut opts = InventoryOptions::new("p");
        opts.compose = ordered(&[("kind", "'meta'")]);
        let mut keyed = KeyedGroup::new("kind");
        keyed.parent_group = Some("kinds".to_string());
        opts.keyed_groups = vec![keyed];
        let constructed = Constructed::from_options(&opts).unwrap();

        let mut inv = host_inventory();
        constructed.apply(&mut inv, "prod-web-01").unwrap();
        assert!(inv.group("_meta").is_none());
        assert!(inv.to_list_json()["_meta"]["hostvars"]["prod-web-01"].is_object());
    }
}
