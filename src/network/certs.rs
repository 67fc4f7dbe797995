use tokio::task::JoinHandle;

use crate::network::pending::{ErrorCallback, SuccessCallback};
use crate::network::providers::CertificateProvider;
use crate::network::types::{CertPattern, ConnectCallbackMode};

/// Outcome of the certificate gate for one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertDecision {
    /// No pattern-matched certificate involved, or a matching one is ready.
    Proceed,
    /// Certificates are still loading; hold the request back.
    Queue,
    /// No matching certificate exists and none can appear.
    Missing,
}

/// Gate a connect on the certificate store's readiness.
///
/// A request is only ever held back while a store load is known to be in
/// progress; if certificates can never become available the request fails
/// immediately instead of waiting out the timer.
pub fn evaluate(
    pattern: Option<&CertPattern>,
    certificates: &dyn CertificateProvider,
) -> CertDecision {
    let Some(pattern) = pattern else {
        return CertDecision::Proceed;
    };
    if certificates.certificates_loaded() {
        if certificates.has_certificate_matching(pattern) {
            CertDecision::Proceed
        } else {
            CertDecision::Missing
        }
    } else if certificates.load_in_progress() {
        CertDecision::Queue
    } else {
        CertDecision::Missing
    }
}

/// A connect request held back until certificates load or the timer fires.
///
/// At most one exists system-wide; queueing another supersedes this one.
pub struct QueuedConnectRequest {
    pub network_id: String,
    pub mode: ConnectCallbackMode,
    pub check_error_state: bool,
    pub on_success: SuccessCallback,
    pub on_error: ErrorCallback,
    /// Timeout task, aborted when the request leaves the queue.
    pub timer: JoinHandle<()>,
    /// Guards a stale timeout against resolving a successor request.
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::providers::CertificateEvent;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeCertStatus {
        loaded: AtomicBool,
        in_progress: AtomicBool,
        matching: AtomicBool,
    }

    impl CertificateProvider for FakeCertStatus {
        fn certificates_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        fn load_in_progress(&self) -> bool {
            self.in_progress.load(Ordering::SeqCst)
        }

        fn has_certificate_matching(&self, _pattern: &CertPattern) -> bool {
            self.matching.load(Ordering::SeqCst)
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<CertificateEvent> {
            mpsc::unbounded_channel().1
        }
    }

    fn pattern() -> CertPattern {
        CertPattern {
            subject_common_name: Some("client-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn no_pattern_always_proceeds() {
        let status = FakeCertStatus::default();
        assert_eq!(evaluate(None, &status), CertDecision::Proceed);
    }

    #[test]
    fn loaded_store_decides_immediately() {
        let status = FakeCertStatus::default();
        status.loaded.store(true, Ordering::SeqCst);
        assert_eq!(evaluate(Some(&pattern()), &status), CertDecision::Missing);
        status.matching.store(true, Ordering::SeqCst);
        assert_eq!(evaluate(Some(&pattern()), &status), CertDecision::Proceed);
    }

    #[test]
    fn load_in_progress_queues() {
        let status = FakeCertStatus::default();
        status.in_progress.store(true, Ordering::SeqCst);
        assert_eq!(evaluate(Some(&pattern()), &status), CertDecision::Queue);
    }

    #[test]
    fn unavailable_store_fails_fast() {
        let status = FakeCertStatus::default();
        assert_eq!(evaluate(Some(&pattern()), &status), CertDecision::Missing);
    }
}
