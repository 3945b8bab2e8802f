//! Points/stars economy: guarded ledger operations and VIP subscriptions

pub mod ledger;
pub mod vip;

pub use ledger::{BonusOutcome, Ledger};
pub use vip::{VipDesk, VipGrant, VipStatus};
