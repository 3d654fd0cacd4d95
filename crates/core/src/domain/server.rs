// Server Domain Model
//
// Mirrors the `data[]` records of the Latitude `GET /servers` endpoint.
// Only `hostname` is required; everything else is optional so that API
// additions or partially provisioned servers never break an inventory run.

use serde::{Deserialize, Serialize};

/// Latitude server ID (e.g. "sv_8NmEl9Kxjlv3e")
pub type ServerId = String;

/// One page of the `/servers` listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersPage {
    #[serde(default)]
    pub data: Vec<Server>,
}

/// Server Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub attributes: ServerAttributes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerAttributes {
    pub hostname: String,
    #[serde(default)]
    pub primary_ipv4: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ipmi_status: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub operating_system: Option<OperatingSystem>,

    // Opaque nested objects, passed through untouched
    #[serde(default)]
    pub project: Option<serde_json::Value>,
    #[serde(default)]
    pub team: Option<serde_json::Value>,
    #[serde(default)]
    pub specs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub billing: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub site: Option<Site>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub facility: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingSystem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub distro: Option<Distro>,
    #[serde(default)]
    pub features: Option<Features>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distro {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub raid: bool,
    #[serde(default)]
    pub rescue: bool,
    #[serde(default)]
    pub ssh_keys: bool,
    #[serde(default)]
    pub user_data: bool,
}

impl Server {
    /// Create a server with only the fields the inventory strictly needs
    pub fn new(id: impl Into<ServerId>, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: Some("servers".to_string()),
            attributes: ServerAttributes {
                hostname: hostname.into(),
                ..Default::default()
            },
        }
    }

    /// Builder-style setter for the primary IPv4 address
    pub fn with_primary_ipv4(mut self, ip: impl Into<String>) -> Self {
        self.attributes.primary_ipv4 = Some(ip.into());
        self
    }

    /// Builder-style setter for the server status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.attributes.status = Some(status.into());
        self
    }

    pub fn hostname(&self) -> &str {
        &self.attributes.hostname
    }

    pub fn plan_slug(&self) -> Option<&str> {
        self.attributes.plan.as_ref()?.slug.as_deref()
    }

    pub fn site_slug(&self) -> Option<&str> {
        self.attributes.region.as_ref()?.site.as_ref()?.slug.as_deref()
    }

    pub fn country(&self) -> Option<&str> {
        self.attributes.region.as_ref()?.country.as_deref()
    }

    pub fn os_slug(&self) -> Option<&str> {
        self.attributes.operating_system.as_ref()?.slug.as_deref()
    }
}
