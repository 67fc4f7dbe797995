use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zbus::zvariant::{OwnedValue, Value};
use zbus::Connection;

use crate::error::ConduitResult;
use crate::network::dbus_proxies::*;
use crate::network::providers::{
    DaemonError, NetworkConfigurationProvider, NetworkStateEvent, NetworkStateProvider,
};
use crate::network::types::{
    ConnectionState, NetworkProperties, Technology, VpnProviderType,
};

/// Production binding of the provider seams over the daemon's D-Bus API.
///
/// Keeps a poll-refreshed cache of service properties for the synchronous
/// state queries and forwards connect/disconnect calls straight to the
/// daemon. All operations go through this struct.
pub struct DbusNetworkProvider {
    connection: Connection,
    cache: Mutex<HashMap<String, NetworkProperties>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<NetworkStateEvent>>>,
}

impl DbusNetworkProvider {
    /// Connect to the system D-Bus.
    pub async fn new() -> ConduitResult<Self> {
        let connection = Connection::system().await?;
        Ok(Self {
            connection,
            cache: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Check if the daemon is reachable
    pub async fn is_running(&self) -> bool {
        match FlimflamManagerProxy::new(&self.connection).await {
            Ok(proxy) => proxy.get_properties().await.is_ok(),
            Err(_) => false,
        }
    }

    /// Snapshot of all cached networks, connected first.
    pub fn networks(&self) -> Vec<NetworkProperties> {
        let mut networks: Vec<_> = self.cache.lock().unwrap().values().cloned().collect();
        networks.sort_by(|a, b| {
            b.is_connected()
                .cmp(&a.is_connected())
                .then_with(|| a.name.cmp(&b.name))
        });
        networks
    }

    /// Fetch the daemon's service list and refresh the cache, emitting
    /// change events for anything that moved.
    pub async fn refresh(&self) -> ConduitResult<()> {
        let manager = FlimflamManagerProxy::new(&self.connection).await?;
        let properties = manager.get_properties().await?;
        let service_paths = properties
            .get("Services")
            .and_then(ov_to_paths)
            .unwrap_or_default();

        let fetched = join_all(
            service_paths
                .iter()
                .map(|path| self.fetch_service(path.clone())),
        )
        .await;

        let mut fresh = HashMap::new();
        for (path, result) in service_paths.iter().zip(fetched) {
            match result {
                Ok(network) => {
                    fresh.insert(network.id.clone(), network);
                }
                Err(e) => {
                    warn!("Failed to fetch service {}: {}", path, e);
                }
            }
        }

        let events = {
            let mut cache = self.cache.lock().unwrap();
            let mut events = Vec::new();
            if fresh.len() != cache.len() || fresh.keys().any(|id| !cache.contains_key(id)) {
                events.push(NetworkStateEvent::ListChanged);
            }
            for (id, network) in &fresh {
                if cache.get(id).map_or(true, |old| old != network) {
                    events.push(NetworkStateEvent::PropertiesUpdated(id.clone()));
                }
            }
            *cache = fresh;
            events
        };

        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// Spawn the poll loop that keeps the cache current.
    pub fn start_polling(self: Arc<Self>, interval: Duration) {
        let provider = Arc::downgrade(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(provider) = provider.upgrade() else { return };
                if let Err(e) = provider.refresh().await {
                    debug!("State refresh failed: {}", e);
                }
            }
        });
    }

    async fn fetch_service(&self, path: String) -> ConduitResult<NetworkProperties> {
        let proxy = FlimflamServiceProxy::builder(&self.connection)
            .path(path.clone())?
            .build()
            .await?;
        let properties = proxy.get_properties().await?;
        Ok(properties_from_dict(&path, &properties))
    }

    fn emit(&self, event: NetworkStateEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl NetworkStateProvider for DbusNetworkProvider {
    fn network_state(&self, network_id: &str) -> Option<NetworkProperties> {
        self.cache.lock().unwrap().get(network_id).cloned()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<NetworkStateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

#[async_trait]
impl NetworkConfigurationProvider for DbusNetworkProvider {
    async fn get_properties(&self, network_id: &str) -> Result<NetworkProperties, DaemonError> {
        self.fetch_service(network_id.to_string())
            .await
            .map_err(|e| DaemonError::new("get-properties-failed", e.to_string()))
    }

    async fn connect(&self, network_id: &str) -> Result<(), DaemonError> {
        let proxy = FlimflamServiceProxy::builder(&self.connection)
            .path(network_id.to_string())
            .map_err(daemon_error)?
            .build()
            .await
            .map_err(daemon_error)?;
        proxy.connect().await.map_err(daemon_error)
    }

    async fn disconnect(&self, network_id: &str) -> Result<(), DaemonError> {
        let proxy = FlimflamServiceProxy::builder(&self.connection)
            .path(network_id.to_string())
            .map_err(daemon_error)?
            .build()
            .await
            .map_err(daemon_error)?;
        proxy.disconnect().await.map_err(daemon_error)
    }
}

/// Carry the daemon's D-Bus error name over into a [`DaemonError`].
fn daemon_error(e: zbus::Error) -> DaemonError {
    match &e {
        zbus::Error::MethodError(name, message, _) => DaemonError::new(
            short_error_name(name.as_str()),
            message.clone().unwrap_or_default(),
        ),
        _ => DaemonError::new("dbus-failure", e.to_string()),
    }
}

/// "org.chromium.flimflam.Error.AlreadyConnected" becomes "already-connected".
fn short_error_name(full: &str) -> String {
    let last = full.rsplit('.').next().unwrap_or(full);
    let mut out = String::new();
    for (i, c) in last.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ── Property dictionary decoding ──────────────────────────────────────

/// Decode a service `a{sv}` dictionary into [`NetworkProperties`].
pub fn properties_from_dict(
    path: &str,
    dict: &HashMap<String, OwnedValue>,
) -> NetworkProperties {
    NetworkProperties {
        id: path.to_string(),
        guid: extract_string(dict, "GUID").unwrap_or_default(),
        name: extract_string(dict, "Name").unwrap_or_default(),
        technology: Technology::from_daemon(
            &extract_string(dict, "Type").unwrap_or_default(),
        ),
        state: ConnectionState::from_daemon(
            &extract_string(dict, "State").unwrap_or_default(),
        ),
        connectable: extract_bool(dict, "Connectable").unwrap_or(false),
        passphrase_required: extract_bool(dict, "PassphraseRequired").unwrap_or(false),
        error: extract_string(dict, "Error").filter(|e| !e.is_empty()),
        hex_ssid: extract_string(dict, "WiFi.HexSSID"),
        vpn_provider: extract_provider_type(dict).map(|t| VpnProviderType::from_daemon(&t)),
        iccid: extract_string(dict, "Cellular.ICCID"),
        eid: extract_string(dict, "Cellular.EID"),
        profile_path: extract_string(dict, "Profile"),
    }
}

fn extract_string(dict: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    dict.get(key).and_then(ov_to_string)
}

fn extract_bool(dict: &HashMap<String, OwnedValue>, key: &str) -> Option<bool> {
    dict.get(key).and_then(ov_to_bool)
}

/// The VPN provider type is nested one dictionary down.
fn extract_provider_type(dict: &HashMap<String, OwnedValue>) -> Option<String> {
    let value = dict.get("Provider")?;
    match &**value {
        Value::Dict(_) => {
            let provider: HashMap<String, OwnedValue> = value.try_clone().ok()?.try_into().ok()?;
            extract_string(&provider, "Type")
        }
        _ => None,
    }
}

// ── Safe OwnedValue extraction via pattern matching ───────────────────
// OwnedValue derefs to Value<'static>, so &**v gives &Value to match on.

fn ov_to_string(v: &OwnedValue) -> Option<String> {
    match &**v {
        Value::Str(s) => Some(s.to_string()),
        _ => None,
    }
}

fn ov_to_bool(v: &OwnedValue) -> Option<bool> {
    match &**v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn ov_to_paths(v: &OwnedValue) -> Option<Vec<String>> {
    match &**v {
        Value::Array(arr) => Some(
            arr.iter()
                .filter_map(|item| match item {
                    Value::ObjectPath(p) => Some(p.to_string()),
                    Value::Str(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_error_names() {
        assert_eq!(
            short_error_name("org.chromium.flimflam.Error.AlreadyConnected"),
            "already-connected"
        );
        assert_eq!(
            short_error_name("org.chromium.flimflam.Error.InProgress"),
            "in-progress"
        );
        assert_eq!(short_error_name("Failure"), "failure");
    }

    #[test]
    fn dict_decoding_defaults() {
        let network = properties_from_dict("/service/0", &HashMap::new());
        assert_eq!(network.id, "/service/0");
        assert_eq!(network.technology, Technology::Unknown);
        assert_eq!(network.state, ConnectionState::Unknown);
        assert!(!network.connectable);
        assert!(network.error.is_none());
    }
}
