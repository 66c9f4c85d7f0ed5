//! Delivery-state correction for messages left in flight by a previous run.
//!
//! A crash or restart can freeze a message in `Sending` even though the
//! router no longer tracks it and nothing will ever move it forward. On load,
//! any such message the router has forgotten is presumed abandoned.

use crate::collaborators::InFlightSet;
use crate::models::{DeliveryState, MessageHash};

/// Return the authoritative state for a message loaded from disk.
pub fn reconcile(
    persisted: DeliveryState,
    hash: &MessageHash,
    in_flight: &dyn InFlightSet,
) -> DeliveryState {
    if !persisted.is_in_progress() {
        return persisted;
    }

    if in_flight.contains(hash) {
        persisted
    } else {
        DeliveryState::Failed
    }
}
