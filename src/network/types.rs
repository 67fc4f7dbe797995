use std::fmt;

use serde::{Deserialize, Serialize};

/// Network technology as the daemon reports it in the `Type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Wifi,
    Ethernet,
    Cellular,
    Vpn,
    Tether,
    #[default]
    Unknown,
}

impl Technology {
    pub fn from_daemon(value: &str) -> Self {
        match value {
            "wifi" => Self::Wifi,
            "ethernet" => Self::Ethernet,
            "cellular" => Self::Cellular,
            "vpn" => Self::Vpn,
            "tether" => Self::Tether,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi => write!(f, "WiFi"),
            Self::Ethernet => write!(f, "Ethernet"),
            Self::Cellular => write!(f, "Cellular"),
            Self::Vpn => write!(f, "VPN"),
            Self::Tether => write!(f, "Tether"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Connection state of a single network, from the daemon's `State` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Association,
    Configuration,
    Ready,
    Online,
    Portal,
    Failure,
    Disconnecting,
    #[default]
    Unknown,
}

impl ConnectionState {
    pub fn from_daemon(value: &str) -> Self {
        match value {
            "idle" => Self::Idle,
            "association" => Self::Association,
            "configuration" => Self::Configuration,
            "ready" => Self::Ready,
            "online" => Self::Online,
            "portal" | "redirect-found" | "portal-suspected" => Self::Portal,
            "failure" => Self::Failure,
            "disconnecting" | "disconnect" => Self::Disconnecting,
            _ => Self::Unknown,
        }
    }

    /// Layer-3 connectivity established, possibly behind a portal.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Ready | Self::Online | Self::Portal)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Association | Self::Configuration)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Association => "association",
            Self::Configuration => "configuration",
            Self::Ready => "ready",
            Self::Online => "online",
            Self::Portal => "portal",
            Self::Failure => "failure",
            Self::Disconnecting => "disconnecting",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// VPN provider type, from the daemon's `Provider.Type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VpnProviderType {
    L2tpIpsec,
    OpenVpn,
    Ikev2,
    ThirdParty,
    Arc,
    Unknown,
}

impl VpnProviderType {
    pub fn from_daemon(value: &str) -> Self {
        match value {
            "l2tpipsec" => Self::L2tpIpsec,
            "openvpn" => Self::OpenVpn,
            "ikev2" => Self::Ikev2,
            "thirdpartyvpn" => Self::ThirdParty,
            "arcvpn" => Self::Arc,
            _ => Self::Unknown,
        }
    }

    /// Provider types never subject to the VPN technology prohibition:
    /// their lifecycle is owned outside the daemon.
    pub fn exempt_from_prohibition(&self) -> bool {
        matches!(self, Self::ThirdParty | Self::Arc)
    }
}

/// When a connect request's success callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectCallbackMode {
    /// As soon as the daemon accepts the connect call.
    OnConfigured,
    /// Only once the network reaches a connected state.
    OnCompleted,
}

/// Client certificate selector matched by subject/issuer pattern rather
/// than a fixed certificate reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertPattern {
    pub subject_common_name: Option<String>,
    pub issuer_common_name: Option<String>,
}

/// One installed client certificate, reduced to the fields patterns
/// match against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCertInfo {
    pub subject_common_name: String,
    pub issuer_common_name: Option<String>,
}

impl CertPattern {
    /// Whether an installed client certificate satisfies this pattern.
    /// Unset pattern fields match anything.
    pub fn matches(&self, cert: &ClientCertInfo) -> bool {
        let subject_ok = self
            .subject_common_name
            .as_ref()
            .map_or(true, |cn| cn == &cert.subject_common_name);
        let issuer_ok = self
            .issuer_common_name
            .as_ref()
            .map_or(true, |cn| Some(cn) == cert.issuer_common_name.as_ref());
        subject_ok && issuer_ok
    }
}

/// Everything the handler needs to know about one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkProperties {
    /// Daemon service path, or the GUID itself for tether networks.
    pub id: String,
    pub guid: String,
    pub name: String,
    pub technology: Technology,
    pub state: ConnectionState,
    pub connectable: bool,
    pub passphrase_required: bool,
    /// Last daemon error for this network, if any.
    pub error: Option<String>,
    /// Hex-encoded SSID, present for WiFi networks.
    pub hex_ssid: Option<String>,
    pub vpn_provider: Option<VpnProviderType>,
    pub iccid: Option<String>,
    pub eid: Option<String>,
    pub profile_path: Option<String>,
}

impl NetworkProperties {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    /// Tether networks are brokered by a companion device; their id is
    /// their GUID rather than a daemon service path.
    pub fn is_tether(&self) -> bool {
        self.technology == Technology::Tether
    }

    /// A present EID marks a cellular service as eSIM-backed.
    pub fn is_esim(&self) -> bool {
        self.eid.as_deref().is_some_and(|eid| !eid.is_empty())
    }
}
