//! Board membership lifecycle.

mod ledger;
mod state;

pub use ledger::MembershipLedger;
pub use state::MembershipState;
