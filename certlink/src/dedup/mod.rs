//! Duplicate suppression for inbound webhook events.

mod fingerprint;
mod guard;

pub use fingerprint::EventFingerprint;
pub use guard::DedupGuard;
