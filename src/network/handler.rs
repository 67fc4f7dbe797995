use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::config::HandlerConfig;
use crate::error::{error_names, map_daemon_error};
use crate::network::certs::{self, CertDecision, QueuedConnectRequest};
use crate::network::observer::{ConnectionObserver, ObserverHub};
use crate::network::pending::{
    ErrorCallback, PendingRequest, PendingRequestStore, RequestState, SuccessCallback,
};
use crate::network::policy::{self, PolicyVerdict};
use crate::network::providers::{
    CertificateEvent, CertificateProvider, CellularEsimProvider, NetworkConfigurationProvider,
    NetworkStateEvent, NetworkStateProvider, PolicyProvider,
};
use crate::network::tether::TetherDelegate;
use crate::network::types::{
    ConnectCallbackMode, ConnectionState, NetworkProperties, Technology,
};

/// Orchestrates connect and disconnect requests against the daemon.
///
/// Every request runs one linear, observable lifecycle: policy check,
/// certificate gate, tether routing, then the asynchronous daemon call,
/// with every failure normalized into the stable error-name taxonomy.
/// All synchronous gates run before the entry points return; only the
/// daemon boundary and the certificate-load timer suspend.
pub struct ConnectionHandler {
    state: Arc<dyn NetworkStateProvider>,
    configuration: Arc<dyn NetworkConfigurationProvider>,
    policy: Arc<dyn PolicyProvider>,
    certificates: Arc<dyn CertificateProvider>,
    esim: Option<Arc<dyn CellularEsimProvider>>,
    config: HandlerConfig,
    observers: ObserverHub,
    inner: Mutex<Inner>,
    /// Self-handle for spawned tasks and delegate callbacks; never keeps
    /// the handler alive on its own.
    weak_self: Weak<ConnectionHandler>,
}

#[derive(Default)]
struct Inner {
    pending: PendingRequestStore,
    queued_connect: Option<QueuedConnectRequest>,
    queued_generation: u64,
    tether_delegate: Option<Arc<dyn TetherDelegate>>,
    shut_down: bool,
}

impl ConnectionHandler {
    /// Build the handler and start listening to the providers' change
    /// streams. Must be called from within a tokio runtime.
    pub fn new(
        config: HandlerConfig,
        state: Arc<dyn NetworkStateProvider>,
        configuration: Arc<dyn NetworkConfigurationProvider>,
        policy: Arc<dyn PolicyProvider>,
        certificates: Arc<dyn CertificateProvider>,
        esim: Option<Arc<dyn CellularEsimProvider>>,
    ) -> Arc<Self> {
        let handler = Arc::new_cyclic(|weak| Self {
            state,
            configuration,
            policy,
            certificates,
            esim,
            config,
            observers: ObserverHub::default(),
            inner: Mutex::new(Inner::default()),
            weak_self: weak.clone(),
        });

        let mut state_events = handler.state.subscribe();
        let weak = Arc::downgrade(&handler);
        tokio::spawn(async move {
            while let Some(event) = state_events.recv().await {
                let Some(handler) = weak.upgrade() else { break };
                handler.handle_network_event(event);
            }
        });

        let mut cert_events = handler.certificates.subscribe();
        let weak = Arc::downgrade(&handler);
        tokio::spawn(async move {
            while let Some(CertificateEvent::CertificatesLoaded) = cert_events.recv().await {
                let Some(handler) = weak.upgrade() else { break };
                handler.connect_to_queued_network();
            }
        });

        handler
    }

    // ── Observers and tether delegate ─────────────────────────────────

    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn ConnectionObserver>) {
        self.observers.remove(observer);
    }

    pub fn set_tether_delegate(&self, delegate: Arc<dyn TetherDelegate>) {
        self.inner.lock().unwrap().tether_delegate = Some(delegate);
    }

    pub fn clear_tether_delegate(&self) {
        self.inner.lock().unwrap().tether_delegate = None;
    }

    // ── Connect ───────────────────────────────────────────────────────

    /// Initiate a connect. Exactly one of `on_success` / `on_error` fires,
    /// never more than once. With `check_error_state`, unmet preconditions
    /// visible in the daemon's properties (a required passphrase, a
    /// rejected one) fail fast before the connect call.
    pub fn connect_to_network(
        &self,
        network_id: &str,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
        check_error_state: bool,
        mode: ConnectCallbackMode,
    ) {
        debug!(network_id, ?mode, "connect requested");
        self.observers.notify_connect_requested(network_id);

        {
            let inner = self.inner.lock().unwrap();
            if inner.shut_down {
                drop(inner);
                self.fail_request(network_id, on_error, error_names::CONNECT_CANCELED);
                return;
            }
            if inner.pending.contains(network_id) {
                drop(inner);
                self.fail_request(network_id, on_error, error_names::CONNECTING);
                return;
            }
        }

        let network = self.state.network_state(network_id);
        if let Some(network) = &network {
            if network.is_connected() {
                self.fail_request(network_id, on_error, error_names::CONNECTED);
                return;
            }
            if network.is_connecting() {
                self.fail_request(network_id, on_error, error_names::CONNECTING);
                return;
            }

            if policy::check_policy(network, self.policy.as_ref()) == PolicyVerdict::Blocked {
                info!(network_id, "connect blocked by policy");
                self.fail_request(network_id, on_error, error_names::BLOCKED_BY_POLICY);
                return;
            }

            let pattern = self.policy.client_cert_pattern(&network.guid);
            match certs::evaluate(pattern.as_ref(), self.certificates.as_ref()) {
                CertDecision::Proceed => {}
                CertDecision::Missing => {
                    info!(network_id, "no usable client certificate");
                    self.fail_request(network_id, on_error, error_names::CERTIFICATE_REQUIRED);
                    return;
                }
                CertDecision::Queue => {
                    self.queue_connect_request(
                        network_id,
                        mode,
                        check_error_state,
                        on_success,
                        on_error,
                    );
                    return;
                }
            }

            if network.is_tether() {
                self.route_tether_connect(network_id, mode, on_success, on_error);
                return;
            }

            if network.technology == Technology::Cellular
                && !network.connectable
                && network.is_esim()
            {
                self.start_esim_connect(network, check_error_state, mode, on_success, on_error);
                return;
            }
        }

        // Unknown networks still go to the daemon: its get-properties
        // answer decides between configure-failed and a live connect.
        let profile_id = network.and_then(|n| n.profile_path);
        self.start_connect(
            network_id, profile_id, mode, check_error_state, on_success, on_error,
        );
    }

    /// Create the pending entry and hand the request to the daemon
    /// connector task.
    fn start_connect(
        &self,
        network_id: &str,
        profile_id: Option<String>,
        mode: ConnectCallbackMode,
        check_error_state: bool,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let request = PendingRequest::connect(mode, profile_id, on_success, on_error);
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.create(network_id, request).err()
        };
        if let Some(request) = rejected {
            self.fail_request(network_id, request.on_error, error_names::CONNECTING);
            return;
        }

        let weak = self.weak_self.clone();
        let network_id = network_id.to_string();
        tokio::spawn(async move {
            let Some(handler) = weak.upgrade() else { return };
            handler
                .verify_configured_and_connect(&network_id, check_error_state)
                .await;
        });
    }

    /// Inspect the daemon's view of the network, then issue the connect.
    async fn verify_configured_and_connect(&self, network_id: &str, check_error_state: bool) {
        let properties = match self.configuration.get_properties(network_id).await {
            Ok(properties) => properties,
            Err(error) => {
                debug!(network_id, %error, "get-properties failed");
                self.resolve_error(network_id, error_names::CONFIGURE_FAILED);
                return;
            }
        };

        if check_error_state {
            if properties.passphrase_required {
                self.resolve_error(network_id, error_names::PASSPHRASE_REQUIRED);
                return;
            }
            // The daemon's bad-passphrase spelling matches the taxonomy.
            if properties.error.as_deref() == Some(error_names::BAD_PASSPHRASE) {
                self.resolve_error(network_id, error_names::BAD_PASSPHRASE);
                return;
            }
        }

        // The daemon may have won a race against the cached state view;
        // never issue a duplicate connect.
        if properties.is_connected() {
            self.resolve_error(network_id, error_names::CONNECTED);
            return;
        }
        if properties.is_connecting() {
            self.resolve_error(network_id, error_names::CONNECTING);
            return;
        }

        self.call_daemon_connect(network_id).await;
    }

    async fn call_daemon_connect(&self, network_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .advance(network_id, RequestState::Started);

        info!(network_id, "issuing daemon connect");
        match self.configuration.connect(network_id).await {
            Ok(()) => {
                let mode = {
                    let inner = self.inner.lock().unwrap();
                    inner.pending.get(network_id).and_then(PendingRequest::mode)
                };
                match mode {
                    // Already resolved by a racing state change.
                    None => {}
                    Some(ConnectCallbackMode::OnConfigured) => {
                        self.resolve_success(network_id);
                    }
                    Some(ConnectCallbackMode::OnCompleted) => {
                        self.inner
                            .lock()
                            .unwrap()
                            .pending
                            .advance(network_id, RequestState::Connecting);
                        // A state change may have landed while the daemon
                        // call was in flight.
                        self.check_pending_request(network_id);
                    }
                }
            }
            Err(error) => {
                warn!(network_id, %error, "daemon connect failed");
                self.resolve_error(network_id, map_daemon_error(&error.name));
            }
        }
    }

    // ── Certificate gate ──────────────────────────────────────────────

    /// Hold a connect back until certificates load, superseding any
    /// previously queued request.
    fn queue_connect_request(
        &self,
        network_id: &str,
        mode: ConnectCallbackMode,
        check_error_state: bool,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let superseded = {
            let mut inner = self.inner.lock().unwrap();
            inner.queued_generation += 1;
            let generation = inner.queued_generation;

            let weak = self.weak_self.clone();
            let timeout = self.config.cert_load_timeout();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(handler) = weak.upgrade() {
                    handler.handle_cert_load_timeout(generation);
                }
            });

            inner.queued_connect.replace(QueuedConnectRequest {
                network_id: network_id.to_string(),
                mode,
                check_error_state,
                on_success,
                on_error,
                timer,
                generation,
            })
        };

        if let Some(old) = superseded {
            old.timer.abort();
            info!(network_id = %old.network_id, "queued connect superseded");
            self.fail_request(&old.network_id, old.on_error, error_names::CONNECT_CANCELED);
        }
        debug!(network_id, "connect queued awaiting certificate load");
    }

    /// Timer expiry for a queued connect. A stale timer whose generation
    /// no longer matches does nothing.
    fn handle_cert_load_timeout(&self, generation: u64) {
        let queued = {
            let mut inner = self.inner.lock().unwrap();
            let expired = inner
                .queued_connect
                .as_ref()
                .map_or(false, |queued| queued.generation == generation);
            if expired {
                inner.queued_connect.take()
            } else {
                None
            }
        };
        if let Some(queued) = queued {
            warn!(network_id = %queued.network_id, "certificate load timed out");
            self.fail_request(
                &queued.network_id,
                queued.on_error,
                error_names::CERT_LOAD_TIMEOUT,
            );
        }
    }

    /// Certificates finished loading: re-issue the held-back request
    /// through the normal connect path and clear the queue.
    fn connect_to_queued_network(&self) {
        let queued = self.inner.lock().unwrap().queued_connect.take();
        let Some(queued) = queued else { return };
        queued.timer.abort();
        info!(network_id = %queued.network_id, "certificates loaded, connecting queued network");
        self.connect_to_network(
            &queued.network_id,
            queued.on_success,
            queued.on_error,
            queued.check_error_state,
            queued.mode,
        );
    }

    // ── Cellular/eSIM ─────────────────────────────────────────────────

    /// A non-connectable eSIM service needs its profile enabled before
    /// the daemon can connect it.
    fn start_esim_connect(
        &self,
        network: &NetworkProperties,
        check_error_state: bool,
        mode: ConnectCallbackMode,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let Some(esim) = self.esim.clone() else {
            // No installer injected; let the daemon sort it out.
            self.start_connect(
                &network.id,
                network.profile_path.clone(),
                mode,
                check_error_state,
                on_success,
                on_error,
            );
            return;
        };

        let request =
            PendingRequest::connect(mode, network.profile_path.clone(), on_success, on_error);
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.create(&network.id, request).err()
        };
        if let Some(request) = rejected {
            self.fail_request(&network.id, request.on_error, error_names::CONNECTING);
            return;
        }

        let weak = self.weak_self.clone();
        let network_id = network.id.clone();
        let iccid = network.iccid.clone().unwrap_or_default();
        tokio::spawn(async move {
            let Some(handler) = weak.upgrade() else { return };
            info!(network_id = %network_id, "enabling eSIM profile before connect");
            if let Err(error) = esim.prepare_profile(&network_id, &iccid).await {
                warn!(network_id = %network_id, %error, "eSIM profile enable failed");
                handler.resolve_error(&network_id, error_names::ESIM_PROFILE_ISSUE);
                return;
            }
            handler
                .verify_configured_and_connect(&network_id, check_error_state)
                .await;
        });
    }

    // ── Tether routing ────────────────────────────────────────────────

    fn route_tether_connect(
        &self,
        network_id: &str,
        mode: ConnectCallbackMode,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let delegate = self.inner.lock().unwrap().tether_delegate.clone();
        let Some(delegate) = delegate else {
            info!(network_id, "tether connect with no delegate");
            self.fail_request(network_id, on_error, error_names::TETHER_WITH_NO_DELEGATE);
            return;
        };

        let request = PendingRequest::connect(mode, None, on_success, on_error);
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.create(network_id, request).err()
        };
        if let Some(request) = rejected {
            self.fail_request(network_id, request.on_error, error_names::CONNECTING);
            return;
        }

        debug!(network_id, "routing connect to tether delegate");
        let (on_success, on_error) = self.resolving_callbacks(network_id);
        delegate.connect_to_network(network_id, on_success, on_error);
    }

    fn route_tether_disconnect(
        &self,
        network_id: &str,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        let delegate = self.inner.lock().unwrap().tether_delegate.clone();
        let Some(delegate) = delegate else {
            info!(network_id, "tether disconnect with no delegate");
            self.fail_request(network_id, on_error, error_names::TETHER_WITH_NO_DELEGATE);
            return;
        };

        let request = PendingRequest::disconnect(on_success, on_error);
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.create(network_id, request).err()
        };
        if let Some(request) = rejected {
            self.fail_request(network_id, request.on_error, error_names::CONNECTING);
            return;
        }

        debug!(network_id, "routing disconnect to tether delegate");
        let (on_success, on_error) = self.resolving_callbacks(network_id);
        delegate.disconnect_from_network(network_id, on_success, on_error);
    }

    /// Callbacks that resolve the pending entry for `network_id`, for
    /// handing to a delegate. The delegate's error name is propagated
    /// verbatim.
    fn resolving_callbacks(&self, network_id: &str) -> (SuccessCallback, ErrorCallback) {
        let weak = self.weak_self.clone();
        let id = network_id.to_string();
        let on_success: SuccessCallback = Box::new(move || {
            if let Some(handler) = weak.upgrade() {
                handler.resolve_success(&id);
            }
        });

        let weak = self.weak_self.clone();
        let id = network_id.to_string();
        let on_error: ErrorCallback = Box::new(move |error_name| {
            if let Some(handler) = weak.upgrade() {
                handler.resolve_error(&id, error_name);
            }
        });

        (on_success, on_error)
    }

    // ── Disconnect ────────────────────────────────────────────────────

    /// Initiate a disconnect. Exactly one of `on_success` / `on_error`
    /// fires, never more than once.
    pub fn disconnect_network(
        &self,
        network_id: &str,
        on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        debug!(network_id, "disconnect requested");
        self.observers.notify_disconnect_requested(network_id);

        {
            let inner = self.inner.lock().unwrap();
            if inner.shut_down {
                drop(inner);
                self.fail_request(network_id, on_error, error_names::CONNECT_CANCELED);
                return;
            }
            if inner.pending.contains(network_id) {
                drop(inner);
                self.fail_request(network_id, on_error, error_names::CONNECTING);
                return;
            }
        }

        let Some(network) = self.state.network_state(network_id) else {
            self.fail_request(network_id, on_error, error_names::NOT_CONNECTED);
            return;
        };

        if network.is_tether() {
            self.route_tether_disconnect(network_id, on_success, on_error);
            return;
        }

        if !network.is_connected() && !network.is_connecting() {
            self.fail_request(network_id, on_error, error_names::NOT_CONNECTED);
            return;
        }

        let request = PendingRequest::disconnect(on_success, on_error);
        let rejected = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.create(network_id, request).err()
        };
        if let Some(request) = rejected {
            self.fail_request(network_id, request.on_error, error_names::CONNECTING);
            return;
        }

        let weak = self.weak_self.clone();
        let network_id = network_id.to_string();
        tokio::spawn(async move {
            let Some(handler) = weak.upgrade() else { return };
            handler.call_daemon_disconnect(&network_id).await;
        });
    }

    async fn call_daemon_disconnect(&self, network_id: &str) {
        info!(network_id, "issuing daemon disconnect");
        match self.configuration.disconnect(network_id).await {
            Ok(()) => self.resolve_success(network_id),
            Err(error) => {
                warn!(network_id, %error, "daemon disconnect failed");
                self.resolve_error(network_id, error_names::DISCONNECT_FAILED);
            }
        }
    }

    // ── State-change resolution ───────────────────────────────────────

    fn handle_network_event(&self, event: NetworkStateEvent) {
        match event {
            NetworkStateEvent::PropertiesUpdated(network_id) => {
                self.check_pending_request(&network_id);
            }
            NetworkStateEvent::ListChanged => {
                let ids = self.inner.lock().unwrap().pending.ids();
                for network_id in ids {
                    self.check_pending_request(&network_id);
                }
            }
        }
    }

    /// Resolve an awaiting-completion request once its network reaches a
    /// terminal state. Requests the daemon has not acknowledged yet keep
    /// waiting.
    fn check_pending_request(&self, network_id: &str) {
        let awaiting = {
            let inner = self.inner.lock().unwrap();
            matches!(
                inner.pending.get(network_id),
                Some(request) if request.state == RequestState::Connecting
            )
        };
        if !awaiting {
            return;
        }

        let Some(network) = self.state.network_state(network_id) else {
            return;
        };
        if network.is_connected() {
            self.resolve_success(network_id);
        } else if network.state == ConnectionState::Failure {
            let error = network.error.as_deref().unwrap_or("");
            self.resolve_error(network_id, map_daemon_error(error));
        }
        // Still connecting or idle: keep waiting.
    }

    // ── Resolution ────────────────────────────────────────────────────

    /// Resolve a pending request successfully. No-op if a racing path
    /// already resolved it.
    fn resolve_success(&self, network_id: &str) {
        let Some(request) = self.inner.lock().unwrap().pending.take(network_id) else {
            return;
        };
        info!(network_id, "request succeeded");
        self.observers.notify_connect_succeeded(network_id);
        (request.on_success)();
    }

    /// Resolve a pending request with a terminal error. No-op if a racing
    /// path already resolved it.
    fn resolve_error(&self, network_id: &str, error_name: &str) {
        let Some(request) = self.inner.lock().unwrap().pending.take(network_id) else {
            return;
        };
        info!(network_id, error_name, "request failed");
        self.observers.notify_connect_failed(network_id, error_name);
        (request.on_error)(error_name);
    }

    /// Fail a request that never made it into the pending store.
    fn fail_request(&self, network_id: &str, on_error: ErrorCallback, error_name: &str) {
        debug!(network_id, error_name, "request rejected");
        self.observers.notify_connect_failed(network_id, error_name);
        on_error(error_name);
    }

    // ── Shutdown ──────────────────────────────────────────────────────

    /// Resolve every outstanding request with `connect-canceled` instead
    /// of dropping its callbacks. Further requests are rejected.
    pub fn shutdown(&self) {
        let (pending, queued) = {
            let mut inner = self.inner.lock().unwrap();
            inner.shut_down = true;
            (inner.pending.drain(), inner.queued_connect.take())
        };

        info!(pending = pending.len(), "connection handler shutting down");
        for (network_id, request) in pending {
            self.observers
                .notify_connect_failed(&network_id, error_names::CONNECT_CANCELED);
            (request.on_error)(error_names::CONNECT_CANCELED);
        }
        if let Some(queued) = queued {
            queued.timer.abort();
            self.fail_request(
                &queued.network_id,
                queued.on_error,
                error_names::CONNECT_CANCELED,
            );
        }
    }
}
