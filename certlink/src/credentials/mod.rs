//! Credential management for upstreams that require short-lived tokens.
//!
//! - [`IdentityProvider`]: talks to an identity endpoint (login / refresh)
//! - [`CredentialLifecycleManager`]: caches the credential, renews it
//!   ahead of expiry and coalesces concurrent renewals

mod manager;
mod provider;
mod types;

pub use manager::CredentialLifecycleManager;
pub use provider::{IdentityProvider, NowCertsIdentityProvider};
pub use types::{Credential, CredentialState, DEFAULT_TOKEN_LIFETIME_SECS, RefreshOutcome};
