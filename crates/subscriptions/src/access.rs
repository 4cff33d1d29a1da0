//! Access gate for tiered content

use tipline_shared::AccessTier;

use crate::state::SubscriptionState;

/// Can a viewer in `state` see content requiring `tier`?
///
/// `None` is an anonymous viewer. The state must be read after the expiry
/// sweep for the current request; the decision is never cached.
pub fn is_visible(tier: AccessTier, state: Option<&SubscriptionState>) -> bool {
    match tier {
        AccessTier::Free => true,
        AccessTier::Premium => state.is_some_and(SubscriptionState::is_premium),
    }
}
