use serde::Deserialize;
use tracing::debug;

use crate::network::providers::PolicyProvider;
use crate::network::types::{NetworkProperties, Technology};

/// Device-wide network policy constraints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalPolicy {
    /// Restrict connects to policy-provisioned networks only.
    pub allow_only_policy_networks: bool,
    /// Hex-encoded SSIDs that may never be connected.
    pub blocked_hex_ssids: Vec<String>,
}

/// Outcome of the policy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allowed,
    Blocked,
}

/// Evaluate policy constraints for one connect attempt.
///
/// Runs synchronously before any certificate queuing or daemon call, so a
/// policy-blocked request never waits on certificate load. A
/// policy-provisioned network is exempt from the allow-list and
/// blocked-SSID rules; the VPN technology prohibition applies regardless,
/// except for provider types that are exempt by design.
pub fn check_policy(
    network: &NetworkProperties,
    policy: &dyn PolicyProvider,
) -> PolicyVerdict {
    let global = policy.global_policy();
    let managed = policy.has_policy_entry(network);

    if !managed {
        if global.allow_only_policy_networks {
            debug!(guid = %network.guid, "blocked: only policy networks may connect");
            return PolicyVerdict::Blocked;
        }
        if let Some(hex_ssid) = &network.hex_ssid {
            if global
                .blocked_hex_ssids
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(hex_ssid))
            {
                debug!(guid = %network.guid, "blocked: SSID is on the blocklist");
                return PolicyVerdict::Blocked;
            }
        }
    }

    if network.technology == Technology::Vpn
        && policy
            .prohibited_technologies()
            .contains(&Technology::Vpn)
        && !network
            .vpn_provider
            .map_or(false, |provider| provider.exempt_from_prohibition())
    {
        debug!(guid = %network.guid, "blocked: VPN technology is prohibited");
        return PolicyVerdict::Blocked;
    }

    PolicyVerdict::Allowed
}
