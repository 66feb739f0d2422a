//! Inbound event handling.

mod events;
mod service;

pub use events::{
    DispatchOutcome, EntityType, GhlWebhookPayload, InboundEvent, NowCertsEventKind,
    NowCertsWebhookPayload, SourceSystem, SyncDirection, SyncRequest, SyncResponse,
};
pub use service::EventDispatcher;
