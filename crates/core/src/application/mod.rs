// Application Layer - Use Cases and Business Logic

pub mod constructed;
pub mod grouping;
pub mod inventory_service;
pub mod options;

// Re-exports
pub use constructed::Constructed;
pub use grouping::{hostname_group, TagFilter};
pub use inventory_service::InventoryService;
pub use options::{ApiToken, InventoryOptions, KeyedGroup};
