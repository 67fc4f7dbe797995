use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::network::policy::GlobalPolicy;
use crate::network::types::{
    CertPattern, ClientCertInfo, NetworkProperties, Technology,
};

// ─── Events ──────────────────────────────────────────────────────────────

/// Change notifications from the network-state cache.
#[derive(Debug, Clone)]
pub enum NetworkStateEvent {
    /// Properties of a single network changed.
    PropertiesUpdated(String),
    /// The set of known networks changed.
    ListChanged,
}

/// Change notifications from the certificate store.
#[derive(Debug, Clone)]
pub enum CertificateEvent {
    /// The store finished loading client certificates.
    CertificatesLoaded,
}

/// Error reported by the daemon for a connect, disconnect or
/// get-properties call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{name}: {message}")]
pub struct DaemonError {
    /// Daemon error name; the handler maps it into the stable taxonomy.
    pub name: String,
    pub message: String,
}

impl DaemonError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

// ─── Provider traits ─────────────────────────────────────────────────────

/// Synchronous view of the daemon's network list, fed by change signals.
pub trait NetworkStateProvider: Send + Sync {
    /// Cached properties for `network_id`, if the network is known.
    fn network_state(&self, network_id: &str) -> Option<NetworkProperties>;

    /// Register for change notifications.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<NetworkStateEvent>;
}

/// The daemon's connect/disconnect/inspect RPC surface.
#[async_trait]
pub trait NetworkConfigurationProvider: Send + Sync {
    async fn get_properties(
        &self,
        network_id: &str,
    ) -> Result<NetworkProperties, DaemonError>;

    async fn connect(&self, network_id: &str) -> Result<(), DaemonError>;

    async fn disconnect(&self, network_id: &str) -> Result<(), DaemonError>;
}

/// Enterprise policy lookups. The handler treats these as stateless and
/// re-evaluates on every connect attempt; caching is the provider's
/// business.
pub trait PolicyProvider: Send + Sync {
    fn global_policy(&self) -> GlobalPolicy;

    /// Whether a policy-provisioned entry matches this network.
    fn has_policy_entry(&self, network: &NetworkProperties) -> bool;

    fn prohibited_technologies(&self) -> Vec<Technology>;

    /// The managed client-certificate pattern for `guid`, when the
    /// network's authentication requires pattern-matched certificates.
    fn client_cert_pattern(&self, guid: &str) -> Option<CertPattern>;
}

/// Client-certificate store status.
pub trait CertificateProvider: Send + Sync {
    fn certificates_loaded(&self) -> bool;

    /// True while a store load is underway and certificates may yet appear.
    fn load_in_progress(&self) -> bool;

    fn has_certificate_matching(&self, pattern: &CertPattern) -> bool;

    /// Register for load-completion notifications.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<CertificateEvent>;
}

/// Enables eSIM profiles before the daemon can connect them.
#[async_trait]
pub trait CellularEsimProvider: Send + Sync {
    /// Enable the profile backing `network_id` and wait until the daemon
    /// reports the service connectable.
    async fn prepare_profile(
        &self,
        network_id: &str,
        iccid: &str,
    ) -> Result<(), DaemonError>;
}

// ─── Static providers ────────────────────────────────────────────────────

/// A fixed, deserializable policy document for embedders that load policy
/// from a file instead of an enterprise management stack.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticPolicy {
    pub global: GlobalPolicy,
    /// GUIDs of policy-provisioned networks.
    pub provisioned_guids: Vec<String>,
    pub prohibited_technologies: Vec<Technology>,
    /// Managed client-certificate patterns, keyed by network GUID.
    pub cert_patterns: HashMap<String, CertPattern>,
}

/// [`PolicyProvider`] over a [`StaticPolicy`] document. The document can
/// be swapped at runtime; each connect attempt sees the latest one.
#[derive(Default)]
pub struct StaticPolicyProvider {
    policy: Mutex<StaticPolicy>,
}

impl StaticPolicyProvider {
    pub fn new(policy: StaticPolicy) -> Self {
        Self {
            policy: Mutex::new(policy),
        }
    }

    pub fn set_policy(&self, policy: StaticPolicy) {
        *self.policy.lock().unwrap() = policy;
    }
}

impl PolicyProvider for StaticPolicyProvider {
    fn global_policy(&self) -> GlobalPolicy {
        self.policy.lock().unwrap().global.clone()
    }

    fn has_policy_entry(&self, network: &NetworkProperties) -> bool {
        self.policy
            .lock()
            .unwrap()
            .provisioned_guids
            .iter()
            .any(|guid| guid == &network.guid)
    }

    fn prohibited_technologies(&self) -> Vec<Technology> {
        self.policy.lock().unwrap().prohibited_technologies.clone()
    }

    fn client_cert_pattern(&self, guid: &str) -> Option<CertPattern> {
        self.policy.lock().unwrap().cert_patterns.get(guid).cloned()
    }
}

/// In-memory certificate-store status, for embedders without a real
/// client-certificate store and for exercising the certificate gate.
#[derive(Default)]
pub struct StaticCertificateStore {
    loaded: AtomicBool,
    load_in_progress: AtomicBool,
    certificates: Mutex<Vec<ClientCertInfo>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CertificateEvent>>>,
}

impl StaticCertificateStore {
    /// A store that has already finished loading.
    pub fn loaded() -> Self {
        let store = Self::default();
        store.loaded.store(true, Ordering::SeqCst);
        store
    }

    /// A store whose load is underway; call [`finish_load`](Self::finish_load)
    /// to complete it.
    pub fn loading() -> Self {
        let store = Self::default();
        store.load_in_progress.store(true, Ordering::SeqCst);
        store
    }

    /// Register an installed client certificate.
    pub fn add_certificate(&self, cert: ClientCertInfo) {
        self.certificates.lock().unwrap().push(cert);
    }

    /// Complete the load and notify subscribers.
    pub fn finish_load(&self) {
        self.loaded.store(true, Ordering::SeqCst);
        self.load_in_progress.store(false, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(CertificateEvent::CertificatesLoaded).is_ok());
    }
}

impl CertificateProvider for StaticCertificateStore {
    fn certificates_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn load_in_progress(&self) -> bool {
        self.load_in_progress.load(Ordering::SeqCst)
    }

    fn has_certificate_matching(&self, pattern: &CertPattern) -> bool {
        self.certificates
            .lock()
            .unwrap()
            .iter()
            .any(|cert| pattern.matches(cert))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<CertificateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}
