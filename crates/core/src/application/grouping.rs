// Hostname grouping and tag filtering
//
// Latitude hostnames follow `<env>-<tag>-<n>`; the second segment is the
// host's group ("tag") and drives include/exclude filtering.

use crate::application::options::StringList;
use tracing::debug;

/// Group encoded in a hostname: its second `-`-separated segment
///
/// # Example
/// ```
/// use latitude_inventory_core::application::grouping::hostname_group;
/// assert_eq!(hostname_group("prod-web-01"), Some("web"));
/// assert_eq!(hostname_group("bastion"), None);
/// ```
pub fn hostname_group(hostname: &str) -> Option<&str> {
    hostname.split('-').nth(1).filter(|segment| !segment.is_empty())
}

/// include_tags / exclude_tags filter
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    include: StringList,
    exclude: StringList,
}

impl TagFilter {
    pub fn new(include: StringList, exclude: StringList) -> Self {
        Self { include, exclude }
    }

    /// Decide whether a host with `group` belongs in the inventory
    pub fn admits(&self, hostname: &str, group: Option<&str>) -> bool {
        if !self.include.is_empty() {
            let included = group.map(|g| self.include.contains(g)).unwrap_or(false);
            if !included {
                debug!(hostname, group, "Host skipped: group not in include_tags");
                return false;
            }
        }

        if let Some(group) = group {
            if self.exclude.contains(group) {
                debug!(hostname, group, "Host skipped: group in exclude_tags");
                return false;
            }
        }

        true
    }
}
