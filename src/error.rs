use thiserror::Error;

/// Unified error type for the conduit-nm infrastructure layer.
///
/// Request-level failures never surface here; they travel through the
/// caller's error callback as one of the stable names in [`error_names`].
#[derive(Error, Debug)]
pub enum ConduitError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("D-Bus fdo error: {0}")]
    DbusFdo(#[from] zbus::fdo::Error),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ConduitResult<T> = Result<T, ConduitError>;

/// Stable error names delivered through request error callbacks.
///
/// These strings are part of the public contract and never change between
/// versions. Callers switch on them to decide whether to reprompt, retry
/// with a new request, or give up.
pub mod error_names {
    /// The network is unknown to the daemon or could not be configured.
    pub const CONFIGURE_FAILED: &str = "configure-failed";
    /// The network is already connected.
    pub const CONNECTED: &str = "connected";
    /// A connect or disconnect for this network is already in flight, or
    /// the network is already connecting.
    pub const CONNECTING: &str = "connecting";
    /// The network requires a passphrase that has not been supplied.
    pub const PASSPHRASE_REQUIRED: &str = "passphrase-required";
    /// The stored passphrase was rejected by the network.
    pub const BAD_PASSPHRASE: &str = "bad-passphrase";
    /// A pattern-matched client certificate is required and unavailable.
    pub const CERTIFICATE_REQUIRED: &str = "certificate-required";
    /// The certificate store did not finish loading in time.
    pub const CERT_LOAD_TIMEOUT: &str = "cert-load-timeout";
    /// Enterprise policy forbids connecting to this network.
    pub const BLOCKED_BY_POLICY: &str = "blocked-by-policy";
    /// Disconnect was requested for a network that is not connected.
    pub const NOT_CONNECTED: &str = "not-connected";
    /// A tether network was used without a registered tether delegate.
    pub const TETHER_WITH_NO_DELEGATE: &str = "tether-with-no-delegate";
    /// The daemon reported a connect failure with no more specific name.
    pub const CONNECT_FAILED: &str = "connect-failed";
    /// The daemon reported a disconnect failure.
    pub const DISCONNECT_FAILED: &str = "disconnect-failed";
    /// The request was superseded or the handler shut down.
    pub const CONNECT_CANCELED: &str = "connect-canceled";
    /// Enabling the eSIM profile backing a cellular network failed.
    pub const ESIM_PROFILE_ISSUE: &str = "esim-profile-issue";

    /// Every name in the taxonomy. Daemon errors outside this list are
    /// mapped to [`CONNECT_FAILED`].
    pub const ALL: &[&str] = &[
        CONFIGURE_FAILED,
        CONNECTED,
        CONNECTING,
        PASSPHRASE_REQUIRED,
        BAD_PASSPHRASE,
        CERTIFICATE_REQUIRED,
        CERT_LOAD_TIMEOUT,
        BLOCKED_BY_POLICY,
        NOT_CONNECTED,
        TETHER_WITH_NO_DELEGATE,
        CONNECT_FAILED,
        DISCONNECT_FAILED,
        CONNECT_CANCELED,
        ESIM_PROFILE_ISSUE,
    ];
}

/// Map a daemon-reported error name into the stable taxonomy.
///
/// Recognized names pass through unchanged; a handful of daemon spellings
/// are translated; everything else collapses to `connect-failed`.
pub fn map_daemon_error(name: &str) -> &'static str {
    if let Some(known) = error_names::ALL.iter().copied().find(|n| *n == name) {
        return known;
    }
    match name {
        "already-connected" => error_names::CONNECTED,
        "in-progress" => error_names::CONNECTING,
        _ => error_names::CONNECT_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_names_pass_through() {
        assert_eq!(
            map_daemon_error("bad-passphrase"),
            error_names::BAD_PASSPHRASE
        );
        assert_eq!(map_daemon_error("connected"), error_names::CONNECTED);
    }

    #[test]
    fn daemon_spellings_are_translated() {
        assert_eq!(map_daemon_error("already-connected"), error_names::CONNECTED);
        assert_eq!(map_daemon_error("in-progress"), error_names::CONNECTING);
    }

    #[test]
    fn unknown_names_collapse_to_connect_failed() {
        assert_eq!(map_daemon_error("dbus-timeout"), error_names::CONNECT_FAILED);
        assert_eq!(map_daemon_error(""), error_names::CONNECT_FAILED);
    }
}
