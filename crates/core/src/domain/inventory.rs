// Inventory Domain Model
//
// Hosts, groups and host variables in the shape Ansible expects from an
// executable inventory source (`--list` / `--host`).

use crate::domain::error::{DomainError, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Implicit group containing every host
pub const ALL_GROUP: &str = "all";

/// Implicit group containing hosts without any explicit group
pub const UNGROUPED_GROUP: &str = "ungrouped";

/// Top-level key of the `--list` document holding host variables
pub const META_KEY: &str = "_meta";

/// Variables attached to one host
pub type HostVars = Map<String, Value>;

/// Inventory group: direct hosts and child groups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub hosts: BTreeSet<String>,
    pub children: BTreeSet<String>,
}

/// Inventory assembled during one run
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    groups: BTreeMap<String, Group>,
    hostvars: BTreeMap<String, HostVars>,
}

/// Names that can never be stored as explicit groups
///
/// `all` and `ungrouped` are implicit; `_meta` would overwrite hostvars.
pub fn is_reserved_group(name: &str) -> bool {
    name == ALL_GROUP || name == UNGROUPED_GROUP || name == META_KEY
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`
///
/// # Example
/// ```
/// use latitude_inventory_core::domain::sanitize_group_name;
/// assert_eq!(sanitize_group_name("status-on.1"), "status_on_1");
/// ```
pub fn sanitize_group_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group and return its name
    ///
    /// Reserved names (`all`, `ungrouped`, `_meta`) are never stored.
    pub fn add_group(&mut self, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(DomainError::InvalidGroupName(name.to_string()));
        }
        if !is_reserved_group(name) {
            self.groups.entry(name.to_string()).or_default();
        }
        Ok(name.to_string())
    }

    /// Register a host, optionally as a member of `group`
    ///
    /// Returns false when the host was already known.
    pub fn add_host(&mut self, host: &str, group: Option<&str>) -> Result<bool> {
        if host.is_empty() {
            return Err(DomainError::InvalidHostName(host.to_string()));
        }

        let inserted = !self.hostvars.contains_key(host);
        if inserted {
            self.hostvars.insert(host.to_string(), HostVars::new());
        }

        if let Some(group) = group {
            let group = self.add_group(group)?;
            if let Some(entry) = self.groups.get_mut(&group) {
                entry.hosts.insert(host.to_string());
            }
        }

        Ok(inserted)
    }

    /// Make `child` a child group of `parent`, creating both when missing
    pub fn add_child(&mut self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(DomainError::SelfReferencingGroup(parent.to_string()));
        }
        if is_reserved_group(parent) || is_reserved_group(child) {
            return Err(DomainError::InvalidGroupName(format!("{} -> {}", parent, child)));
        }

        self.add_group(child)?;
        self.add_group(parent)?;
        self.groups
            .get_mut(parent)
            .ok_or_else(|| DomainError::GroupNotFound(parent.to_string()))?
            .children
            .insert(child.to_string());
        Ok(())
    }

    pub fn set_variable(&mut self, host: &str, name: &str, value: Value) -> Result<()> {
        let vars = self
            .hostvars
            .get_mut(host)
            .ok_or_else(|| DomainError::HostNotFound(host.to_string()))?;
        vars.insert(name.to_string(), value);
        Ok(())
    }

    pub fn host_vars(&self, host: &str) -> Option<&HostVars> {
        self.hostvars.get(host)
    }

    /// Drop every variable of `host`, keeping its group memberships
    pub fn reset_vars(&mut self, host: &str) -> Result<()> {
        self.hostvars
            .get_mut(host)
            .ok_or_else(|| DomainError::HostNotFound(host.to_string()))?
            .clear();
        Ok(())
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hostvars.keys().map(String::as_str)
    }

    pub fn host_count(&self) -> usize {
        self.hostvars.len()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Hosts that belong to no explicit group
    pub fn ungrouped_hosts(&self) -> Vec<&str> {
        let grouped: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|g| g.hosts.iter().map(String::as_str))
            .collect();

        self.hosts().filter(|h| !grouped.contains(h)).collect()
    }

    /// Groups that are not the child of any other group
    pub fn top_level_groups(&self) -> Vec<&str> {
        let children: BTreeSet<&str> = self
            .groups
            .values()
            .flat_map(|g| g.children.iter().map(String::as_str))
            .collect();

        self.group_names().filter(|g| !children.contains(g)).collect()
    }

    /// Ansible `--list` document
    pub fn to_list_json(&self) -> Value {
        let mut doc = Map::new();

        let hostvars: Map<String, Value> = self
            .hostvars
            .iter()
            .map(|(host, vars)| (host.clone(), Value::Object(vars.clone())))
            .collect();
        doc.insert(META_KEY.to_string(), json!({ "hostvars": hostvars }));

        let mut all_children = vec![UNGROUPED_GROUP.to_string()];
        all_children.extend(self.top_level_groups().into_iter().map(str::to_string));
        doc.insert(ALL_GROUP.to_string(), json!({ "children": all_children }));

        doc.insert(
            UNGROUPED_GROUP.to_string(),
            json!({ "hosts": self.ungrouped_hosts() }),
        );

        for (name, group) in &self.groups {
            let mut entry = Map::new();
            entry.insert("hosts".to_string(), json!(group.hosts));
            if !group.children.is_empty() {
                entry.insert("children".to_string(), json!(group.children));
            }
            doc.insert(name.clone(), Value::Object(entry));
        }

        Value::Object(doc)
    }

    /// Ansible `--host <name>` document (`{}` for unknown hosts)
    pub fn host_json(&self, host: &str) -> Value {
        self.hostvars
            .get(host)
            .map(|vars| Value::Object(vars.clone()))
            .unwrap_or_else(|| Value::Object(Map::new()))
    }
}
