//! Event dispatcher: dedup, route, invoke.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use super::events::{
    DispatchOutcome, EntityType, GhlWebhookPayload, InboundEvent, NowCertsEventKind,
    NowCertsWebhookPayload, SourceSystem, SyncDirection, SyncRequest, SyncResponse,
};
use crate::clients::{GhlClient, NowCertsClient};
use crate::dedup::{DedupGuard, EventFingerprint};
use crate::error::{Error, Result};
use crate::logging::log_payload;
use crate::mapping;

/// What a routed event produced.
struct Routed {
    message: String,
    target_id: Option<String>,
    data: Option<Value>,
}

impl Routed {
    fn synced(message: impl Into<String>, result: Value) -> Self {
        Self {
            message: message.into(),
            target_id: extract_id(&result),
            data: Some(result),
        }
    }

    fn skipped(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            message: message.into(),
            target_id: None,
            data,
        }
    }
}

/// Routes inbound events to the opposite system.
///
/// Every event is fingerprinted and atomically admitted through the
/// [`DedupGuard`] before any outbound call; a redelivery within the
/// retention window fails with [`Error::DuplicateEvent`] and has no side
/// effects. Admission is not rolled back if the outbound call fails.
pub struct EventDispatcher {
    nowcerts: Arc<NowCertsClient>,
    ghl: Arc<GhlClient>,
    dedup: Arc<DedupGuard>,
}

impl EventDispatcher {
    pub fn new(nowcerts: Arc<NowCertsClient>, ghl: Arc<GhlClient>, dedup: Arc<DedupGuard>) -> Self {
        Self {
            nowcerts,
            ghl,
            dedup,
        }
    }

    pub fn dedup(&self) -> &Arc<DedupGuard> {
        &self.dedup
    }

    pub fn nowcerts(&self) -> &Arc<NowCertsClient> {
        &self.nowcerts
    }

    #[instrument(skip(self, payload), fields(source = %source))]
    pub async fn handle(&self, source: SourceSystem, payload: Value) -> Result<DispatchOutcome> {
        log_payload(source.tag(), &payload);

        let event = InboundEvent::parse(source, &payload)?;
        let fingerprint = EventFingerprint::compute(source.tag(), &event.normalized()?);

        if !self.dedup.try_admit(fingerprint.as_str()) {
            warn!(event_id = %fingerprint, "Duplicate event ignored");
            return Err(Error::DuplicateEvent {
                event_id: fingerprint.into_string(),
            });
        }

        info!(event_id = %fingerprint, "Processing event");

        let routed = match event {
            InboundEvent::NowCerts(event) => self.route_nowcerts(event).await?,
            InboundEvent::Ghl(event) => self.route_ghl(event).await?,
        };

        info!(
            event_id = %fingerprint,
            target_id = routed.target_id.as_deref().unwrap_or("-"),
            "{}",
            routed.message
        );

        Ok(DispatchOutcome {
            accepted: true,
            event_id: fingerprint.into_string(),
            target_id: routed.target_id,
            message: routed.message,
            data: routed.data,
        })
    }

    async fn route_nowcerts(&self, event: NowCertsWebhookPayload) -> Result<Routed> {
        let data = Value::Object(event.data);

        match NowCertsEventKind::parse(&event.event_type) {
            NowCertsEventKind::InsuredInsert => {
                let contact = mapping::nowcerts_to_ghl_contact(&data);
                let result = self.ghl.create_contact(&contact).await?;
                Ok(Routed::synced("Contact created in GoHighLevel", result))
            }
            NowCertsEventKind::InsuredUpdate => {
                let contact = mapping::nowcerts_to_ghl_contact(&data);
                match id_field(&data, "ghlContactId") {
                    Some(contact_id) => {
                        let result = self.ghl.update_contact(&contact_id, &contact).await?;
                        Ok(Routed::synced("Contact updated in GoHighLevel", result))
                    }
                    None => {
                        let result = self.ghl.create_contact(&contact).await?;
                        Ok(Routed::synced(
                            "Contact created in GoHighLevel (no ghlContactId to update)",
                            result,
                        ))
                    }
                }
            }
            NowCertsEventKind::Policy { update } | NowCertsEventKind::Quote { update } => {
                self.sync_opportunity(&data, update).await
            }
            NowCertsEventKind::Unhandled => Ok(Routed::skipped(
                format!("Event {} received but not processed", event.event_type),
                None,
            )),
        }
    }

    /// Create or update the GHL opportunity for a NowCerts policy/quote.
    async fn sync_opportunity(&self, data: &Value, update: bool) -> Result<Routed> {
        let contact_id = id_field(data, "ghlContactId");
        let opportunity = mapping::nowcerts_to_ghl_opportunity(data, contact_id.as_deref());

        if update && let Some(opportunity_id) = id_field(data, "ghlOpportunityId") {
            let result = self
                .ghl
                .update_opportunity(&opportunity_id, &opportunity)
                .await?;
            return Ok(Routed::synced("Opportunity updated in GoHighLevel", result));
        }

        match contact_id {
            Some(contact_id) => {
                let result = self
                    .ghl
                    .create_opportunity(&contact_id, &opportunity)
                    .await?;
                Ok(Routed::synced("Opportunity created in GoHighLevel", result))
            }
            None => {
                warn!("Opportunity sync skipped: ghlContactId missing");
                Ok(Routed::skipped(
                    "Creating an opportunity requires ghlContactId",
                    Some(json!({ "opportunity_data": opportunity })),
                ))
            }
        }
    }

    async fn route_ghl(&self, event: GhlWebhookPayload) -> Result<Routed> {
        if let Some(contact) = event.contact {
            let insured = mapping::ghl_to_nowcerts_contact(&Value::Object(contact));
            let result = self.nowcerts.create_contact(&insured).await?;
            return Ok(Routed::synced("Contact created in NowCerts", result));
        }

        if let Some(opportunity) = event.opportunity {
            let quote = mapping::ghl_opportunity_to_nowcerts_quote(&Value::Object(opportunity));
            let result = self.nowcerts.create_quote(&quote).await?;
            return Ok(Routed::synced("Quote created in NowCerts", result));
        }

        warn!(
            event = event.event.as_deref().unwrap_or("-"),
            "GHL webhook without contact or opportunity"
        );
        Ok(Routed::skipped(
            "Webhook received but nothing processed (no contact or opportunity)",
            None,
        ))
    }

    /// Push one entity across systems on demand. Bypasses deduplication.
    #[instrument(
        skip(self, request),
        fields(source = %request.source, entity = request.entity_type.as_str())
    )]
    pub async fn sync_manual(&self, request: SyncRequest) -> Result<SyncResponse> {
        info!(direction = ?request.direction, "Manual sync requested");

        let entity = request.entity_type;
        let entity_name = entity.as_str();
        let data = |req: &SyncRequest| -> Result<Value> {
            match &req.data {
                Some(data) => Ok(Value::Object(data.clone())),
                None => Err(Error::invalid_payload(format!(
                    "data is required to sync a {entity_name}"
                ))),
            }
        };

        let routed = match (request.direction, request.source, entity) {
            (SyncDirection::ToGhl, SourceSystem::NowCerts, EntityType::Contact) => {
                let contact = mapping::nowcerts_to_ghl_contact(&data(&request)?);
                let result = self.ghl.create_contact(&contact).await?;
                Routed::synced("contact sync completed successfully", result)
            }
            (
                SyncDirection::ToGhl,
                SourceSystem::NowCerts,
                EntityType::Policy | EntityType::Quote,
            ) => {
                let mut routed = self.sync_opportunity(&data(&request)?, false).await?;
                if routed.target_id.is_some() {
                    routed.message = format!("{entity_name} sync completed successfully");
                }
                routed
            }
            (SyncDirection::ToNowcerts, SourceSystem::Ghl, EntityType::Contact) => {
                let insured = mapping::ghl_to_nowcerts_contact(&data(&request)?);
                let result = self.nowcerts.create_contact(&insured).await?;
                Routed::synced("contact sync completed successfully", result)
            }
            (SyncDirection::ToNowcerts, SourceSystem::Ghl, EntityType::Opportunity) => {
                let quote = mapping::ghl_opportunity_to_nowcerts_quote(&data(&request)?);
                let result = self.nowcerts.create_quote(&quote).await?;
                Routed::synced("opportunity sync completed successfully", result)
            }
            (direction, source, entity) => {
                return Err(Error::invalid_payload(format!(
                    "unsupported sync: {} {} {:?}",
                    source,
                    entity.as_str(),
                    direction
                )));
            }
        };

        Ok(SyncResponse {
            success: true,
            message: routed.message,
            source_id: request.entity_id,
            target_id: routed.target_id,
            data: routed.data,
        })
    }
}

/// Non-empty id stored under `key`; numeric ids are accepted.
fn id_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Id of the entity an upstream created or updated: top-level `id`, or
/// the `id` of a single nested entity object (GHL wraps responses).
fn extract_id(result: &Value) -> Option<String> {
    if let Some(id) = id_field(result, "id") {
        return Some(id);
    }

    let object: &Map<String, Value> = result.as_object()?;
    ["contact", "opportunity", "quote", "policy"]
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|nested| id_field(nested, "id"))
}
