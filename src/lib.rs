//! Connection request state machine for a Shill-style network daemon.
//!
//! The crate turns a caller's "connect to this network" or "disconnect
//! from this network" intent into a correctly-ordered sequence of policy
//! checks, certificate-readiness checks and asynchronous daemon calls,
//! deduplicating concurrent requests per network and normalizing every
//! failure into a small, stable error taxonomy.
//!
//! The daemon, policy engine, certificate store, tether host and eSIM
//! installer are injected through the narrow provider traits in
//! [`network::providers`]; nothing in the core reaches for globals, so the
//! whole request lifecycle can be driven against in-memory fakes.

pub mod config;
pub mod error;
pub mod network;

pub use config::HandlerConfig;
pub use error::{error_names, ConduitError, ConduitResult};
pub use network::observer::{ConnectionObserver, ObserverHub};
pub use network::pending::{ErrorCallback, SuccessCallback};
pub use network::policy::{check_policy, GlobalPolicy, PolicyVerdict};
pub use network::providers::{
    CertificateEvent, CertificateProvider, CellularEsimProvider, DaemonError,
    NetworkConfigurationProvider, NetworkStateEvent, NetworkStateProvider, PolicyProvider,
    StaticCertificateStore, StaticPolicy, StaticPolicyProvider,
};
pub use network::tether::TetherDelegate;
pub use network::ConnectionHandler;
pub use network::{
    CertPattern, ClientCertInfo, ConnectCallbackMode, ConnectionState, NetworkProperties,
    Technology, VpnProviderType,
};
