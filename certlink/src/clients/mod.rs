//! Outbound adapters for the two upstream systems.
//!
//! Both wrap every call in the shared backoff executor; they differ only in
//! how requests are authenticated.

mod ghl;
mod nowcerts;
mod transport;

pub use ghl::{GHL_API_VERSION, GhlClient};
pub use nowcerts::NowCertsClient;
