// Port Layer - Interfaces for external dependencies

pub mod server_source;

// Re-exports
pub use server_source::{ServerQuery, ServerSource};
