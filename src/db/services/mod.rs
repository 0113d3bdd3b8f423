//! High-level data access over the persistence store. Encapsulates the
//! SeaORM queries so the runner, scheduler and checkers work with domain
//! models instead of query builders. One sub-module per entity; public
//! functions are re-exported here.

pub mod docker_host_service;
pub mod heartbeat_service;
pub mod monitor_service;
pub mod proxy_service;
pub mod settings_service;

pub use docker_host_service::*;
pub use heartbeat_service::*;
pub use monitor_service::*;
pub use proxy_service::*;
pub use settings_service::*;
