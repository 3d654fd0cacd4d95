// Domain Layer - Server records and the inventory they map into

pub mod error;
pub mod inventory;
pub mod server;

// Re-exports
pub use error::DomainError;
pub use inventory::{
    is_reserved_group, sanitize_group_name, Group, HostVars, Inventory, ALL_GROUP, META_KEY,
    UNGROUPED_GROUP,
};
pub use server::{
    Distro, Features, OperatingSystem, Plan, Region, Server, ServerAttributes, ServerId,
    ServersPage, Site,
};
