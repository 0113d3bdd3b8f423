//! SeaORM entities mapping the persistence store the check fleet relies on.
//! Each table gets its own module.

pub mod docker_host;
pub mod heartbeat;
pub mod monitor;
pub mod proxy;
pub mod setting;

pub mod prelude {
    pub use super::docker_host::Entity as DockerHost;
    pub use super::heartbeat::Entity as Heartbeat;
    pub use super::monitor::Entity as Monitor;
    pub use super::proxy::Entity as Proxy;
    pub use super::setting::Entity as Setting;
}
