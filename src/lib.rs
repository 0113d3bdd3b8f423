pub mod checks;
pub mod config;
pub mod db;
pub mod monitor;
pub mod net;
pub mod version;
