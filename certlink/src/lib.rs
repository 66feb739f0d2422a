//! certlink: webhook relay between NowCerts and GoHighLevel.
//!
//! Inbound webhooks from either system are deduplicated, mapped to the
//! other system's shape and pushed through a retrying client. NowCerts
//! calls use a short-lived OAuth credential that is renewed in the
//! background of requests; GoHighLevel calls use a static API key.

pub mod api;
pub mod clients;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod retry;
pub mod utils;

pub use error::{Error, Result};
