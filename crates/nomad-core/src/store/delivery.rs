use crate::models::{DeliveryMethod, PreferredDelivery, TrustLevel};

/// Everything the delivery policy looks at, gathered from the directory,
/// the router and the transport at send time.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryInputs {
    pub preferred: PreferredDelivery,
    pub propagation_node_configured: bool,
    pub delivery_link_available: bool,
    pub has_ratchet: bool,
    pub trust: TrustLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub method: DeliveryMethod,
    pub include_ticket: bool,
}

pub fn select_delivery(inputs: &DeliveryInputs) -> DeliveryPlan {
    let method = match inputs.preferred {
        PreferredDelivery::Propagated if inputs.propagation_node_configured => {
            DeliveryMethod::Propagated
        }
        // Without a relay a propagated preference degrades to plain direct delivery
        PreferredDelivery::Propagated => DeliveryMethod::Direct,
        PreferredDelivery::Direct if !inputs.delivery_link_available && inputs.has_ratchet => {
            DeliveryMethod::Opportunistic
        }
        PreferredDelivery::Direct => DeliveryMethod::Direct,
    };

    DeliveryPlan {
        method,
        include_ticket: inputs.trust == TrustLevel::Trusted,
    }
}
