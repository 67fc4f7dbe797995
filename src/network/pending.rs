use std::collections::HashMap;

use tracing::trace;

use crate::network::types::ConnectCallbackMode;

/// Success continuation captured from the caller. Fires exactly once.
pub type SuccessCallback = Box<dyn FnOnce() + Send + 'static>;

/// Error continuation captured from the caller. Fires exactly once with a
/// stable error name from [`crate::error::error_names`].
pub type ErrorCallback = Box<dyn FnOnce(&str) + Send + 'static>;

/// What a pending entry is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect { mode: ConnectCallbackMode },
    Disconnect,
}

/// Lifecycle of an in-flight request. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    /// Created, daemon not yet involved.
    Requested,
    /// Daemon call issued.
    Started,
    /// Daemon acknowledged; awaiting a terminal network state.
    Connecting,
}

/// One in-flight connect or disconnect request.
pub struct PendingRequest {
    pub kind: RequestKind,
    /// Destination configuration profile, when the network carries one.
    pub profile_id: Option<String>,
    pub state: RequestState,
    pub on_success: SuccessCallback,
    pub on_error: ErrorCallback,
}

impl PendingRequest {
    pub fn connect(mode: ConnectCallbackMode, profile_id: Option<String>,
                   on_success: SuccessCallback, on_error: ErrorCallback) -> Self {
        Self {
            kind: RequestKind::Connect { mode },
            profile_id,
            state: RequestState::Requested,
            on_success,
            on_error,
        }
    }

    pub fn disconnect(on_success: SuccessCallback, on_error: ErrorCallback) -> Self {
        Self {
            kind: RequestKind::Disconnect,
            profile_id: None,
            state: RequestState::Requested,
            on_success,
            on_error,
        }
    }

    pub fn mode(&self) -> Option<ConnectCallbackMode> {
        match self.kind {
            RequestKind::Connect { mode } => Some(mode),
            RequestKind::Disconnect => None,
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("kind", &self.kind)
            .field("profile_id", &self.profile_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// The single source of truth for "is this network already being connected
/// or disconnected".
///
/// A daemon-call callback and a state-change notification can race to
/// resolve the same request; whichever calls [`take`](Self::take) second
/// finds nothing and must treat that as "already resolved".
#[derive(Default)]
pub struct PendingRequestStore {
    requests: HashMap<String, PendingRequest>,
}

impl PendingRequestStore {
    pub fn contains(&self, network_id: &str) -> bool {
        self.requests.contains_key(network_id)
    }

    /// Insert a new request. An existing entry is never overwritten; the
    /// rejected request is handed back so its callbacks stay invocable.
    pub fn create(
        &mut self,
        network_id: &str,
        request: PendingRequest,
    ) -> Result<(), PendingRequest> {
        if self.requests.contains_key(network_id) {
            return Err(request);
        }
        trace!(network_id, "pending request created");
        self.requests.insert(network_id.to_string(), request);
        Ok(())
    }

    /// Remove and return the entry for resolution. The second resolver of
    /// a race gets `None` and does nothing.
    pub fn take(&mut self, network_id: &str) -> Option<PendingRequest> {
        self.requests.remove(network_id)
    }

    pub fn get(&self, network_id: &str) -> Option<&PendingRequest> {
        self.requests.get(network_id)
    }

    /// Advance the request's lifecycle state; regressions are ignored.
    pub fn advance(&mut self, network_id: &str, state: RequestState) {
        if let Some(request) = self.requests.get_mut(network_id) {
            if state > request.state {
                request.state = state;
            }
        }
    }

    /// Snapshot of all pending ids, for list-changed sweeps.
    pub fn ids(&self) -> Vec<String> {
        self.requests.keys().cloned().collect()
    }

    /// Remove every entry, for shutdown.
    pub fn drain(&mut self) -> Vec<(String, PendingRequest)> {
        self.requests.drain().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PendingRequest {
        PendingRequest::connect(
            ConnectCallbackMode::OnCompleted,
            None,
            Box::new(|| {}),
            Box::new(|_| {}),
        )
    }

    #[test]
    fn create_rejects_duplicates() {
        let mut store = PendingRequestStore::default();
        assert!(store.create("wifi0", request()).is_ok());
        assert!(store.create("wifi0", request()).is_err());
        assert!(store.contains("wifi0"));
        assert!(store.create("wifi1", request()).is_ok());
    }

    #[test]
    fn take_is_idempotent() {
        let mut store = PendingRequestStore::default();
        store.create("wifi0", request()).unwrap();
        assert!(store.take("wifi0").is_some());
        assert!(store.take("wifi0").is_none());
        assert!(!store.contains("wifi0"));
    }

    #[test]
    fn state_never_regresses() {
        let mut store = PendingRequestStore::default();
        store.create("wifi0", request()).unwrap();
        store.advance("wifi0", RequestState::Connecting);
        store.advance("wifi0", RequestState::Started);
        assert_eq!(store.get("wifi0").unwrap().state, RequestState::Connecting);
    }

    #[test]
    fn advance_on_unknown_id_is_a_noop() {
        let mut store = PendingRequestStore::default();
        store.advance("missing", RequestState::Started);
        assert!(store.is_empty());
    }
}
