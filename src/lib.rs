pub mod db;
pub mod monitor;
pub mod notifications;
pub mod server;
pub mod version;
