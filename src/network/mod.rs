pub mod certs;
pub mod dbus;
pub mod dbus_proxies;
pub mod handler;
pub mod observer;
pub mod pending;
pub mod policy;
pub mod providers;
pub mod tether;
pub mod types;

pub use handler::ConnectionHandler;
pub use types::*;
