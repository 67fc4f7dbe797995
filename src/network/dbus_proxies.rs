// D-Bus proxy trait definitions for the Shill-style daemon interfaces.
// These use zbus's #[proxy] macro to auto-generate typed async clients.

use std::collections::HashMap;
use zbus::proxy;
use zbus::zvariant::OwnedValue;

// ── Manager Interface ─────────────────────────────────────────────────

#[proxy(
    interface = "org.chromium.flimflam.Manager",
    default_service = "org.chromium.flimflam",
    default_path = "/"
)]
pub trait FlimflamManager {
    /// Global daemon properties, including the service list
    fn get_properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

// ── Service Interface ─────────────────────────────────────────────────

#[proxy(
    interface = "org.chromium.flimflam.Service",
    default_service = "org.chromium.flimflam"
)]
pub trait FlimflamService {
    /// All properties of this service
    fn get_properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    /// Initiate a connection
    fn connect(&self) -> zbus::Result<()>;

    /// Tear the connection down
    fn disconnect(&self) -> zbus::Result<()>;
}
