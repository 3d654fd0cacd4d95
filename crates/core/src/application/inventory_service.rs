// Inventory Service (fetch servers, map them into an Inventory)

use crate::application::constructed::Constructed;
use crate::application::grouping::{hostname_group, TagFilter};
use crate::application::options::InventoryOptions;
use crate::domain::{Inventory, Server};
use crate::error::{AppError, Result};
use crate::port::{ServerQuery, ServerSource};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Base variables every host gets
///
/// `public_ip_address`, `server_name` and `group` always exist (null when
/// unknown); the `latitude_*` variables only when the API provided them.
pub fn base_host_vars(server: &Server, group: Option<&str>) -> Vec<(&'static str, Value)> {
    let attrs = &server.attributes;
    let mut vars = vec![
        ("public_ip_address", Value::from(attrs.primary_ipv4.clone())),
        ("server_name", Value::from(attrs.hostname.clone())),
        ("group", Value::from(group.map(str::to_string))),
        ("latitude_id", Value::from(server.id.clone())),
    ];

    let optional = [
        ("latitude_status", attrs.status.as_deref()),
        ("latitude_role", attrs.role.as_deref()),
        ("latitude_plan", server.plan_slug()),
        ("latitude_site", server.site_slug()),
        ("latitude_country", server.country()),
        ("latitude_os", server.os_slug()),
    ];
    vars.extend(
        optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, Value::from(v)))),
    );

    vars
}

/// Inventory use case
///
/// Pages through the server listing of one project and maps each server
/// into the inventory (hostname group, tag filter, host vars, constructed).
pub struct InventoryService {
    source: Arc<dyn ServerSource>,
    options: InventoryOptions,
    filter: TagFilter,
    constructed: Constructed,
}

impl InventoryService {
    /// Create the service; fails on invalid options or unparsable expressions
    pub fn new(source: Arc<dyn ServerSource>, options: InventoryOptions) -> Result<Self> {
        options.validate()?;
        let constructed = Constructed::from_options(&options)?;
        let filter = TagFilter::new(options.include_tags.clone(), options.exclude_tags.clone());

        Ok(Self {
            source,
            options,
            filter,
            constructed,
        })
    }

    pub fn options(&self) -> &InventoryOptions {
        &self.options
    }

    /// Fetch every server of the project
    ///
    /// Requests pages 1, 2, ... until the first empty page. Running past
    /// `max_pages` is an error rather than a silently truncated inventory.
    pub async fn fetch_servers(&self) -> Result<Vec<Server>> {
        let project = &self.options.latitude_project;
        let mut servers = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=self.options.max_pages {
            let query = ServerQuery::new(project.clone(), page);
            let batch = self.source.list_servers(&query).await?;

            if batch.is_empty() {
                info!(project = %project, pages = page - 1, count = servers.len(), "Fetched servers");
                return Ok(servers);
            }

            debug!(project = %project, page, count = batch.len(), "Fetched page");

            for server in batch {
                if seen.insert(server.id.clone()) {
                    servers.push(server);
                } else {
                    warn!(id = %server.id, page, "Duplicate server id skipped");
                }
            }
        }

        Err(AppError::Pagination(format!(
            "listing for project {} did not end within {} pages",
            project, self.options.max_pages
        )))
    }

    /// Map servers into an inventory
    pub fn build(&self, servers: &[Server]) -> Result<Inventory> {
        let mut inventory = Inventory::new();

        for server in servers {
            let hostname = server.hostname();
            if hostname.trim().is_empty() {
                warn!(id = %server.id, "Server without hostname skipped");
                continue;
            }

            let group = hostname_group(hostname);
            if !self.filter.admits(hostname, group) {
                continue;
            }

            if !inventory.add_host(hostname, group)? {
                warn!(hostname, id = %server.id, "Duplicate hostname, variables replaced");
                inventory.reset_vars(hostname)?;
            }

            for (name, value) in base_host_vars(server, group) {
                inventory.set_variable(hostname, name, value)?;
            }

            self.constructed.apply(&mut inventory, hostname)?;
        }

        info!(
            hosts = inventory.host_count(),
            groups = inventory.group_names().count(),
            "Inventory built"
        );

        Ok(inventory)
    }

    /// Fetch and build in one go
    pub async fn collect(&self) -> Result<Inventory> {
        let servers = self.fetch_servers().await?;
        self.build(&servers)
    }
}
