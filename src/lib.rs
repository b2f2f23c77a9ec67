// Syncbar - supervisory connector for a local sync daemon
// Library exports

pub mod client; // REST endpoint, probe seam and HTTP client
pub mod config;
pub mod connector; // Version check, health polling and the SyncConnector facade
pub mod daemon; // Daemon child-process supervision
pub mod errors;
pub mod tls; // Certificate policy for self-signed daemon certificates

pub use connector::SyncConnector;
