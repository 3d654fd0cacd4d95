// Latitude Inventory Infrastructure - Latitude REST API adapter
// Implements: ServerSource

pub mod latitude_client;

pub use latitude_client::{LatitudeClient, LatitudeClientConfig};
