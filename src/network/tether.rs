use crate::network::pending::{ErrorCallback, SuccessCallback};

/// Host-side integration for virtual tether networks.
///
/// Tether networks are brokered by a companion device rather than the
/// daemon, so the handler forwards their connect and disconnect calls
/// here verbatim, callbacks included. The handler still tracks the
/// request in its pending store for deduplication; the delegate's
/// callback resolves it.
pub trait TetherDelegate: Send + Sync {
    fn connect_to_network(
        &self,
        tether_network_guid: &str,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    );

    fn disconnect_from_network(
        &self,
        tether_network_guid: &str,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    );
}
