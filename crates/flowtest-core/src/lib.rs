pub mod bridge;
pub mod engine;
pub mod model;
pub mod storage;
pub mod transport;
pub mod validate;

/// Service name reported by the server.
pub const SERVICE_NAME: &str = "Tianji SQL Test Service";
