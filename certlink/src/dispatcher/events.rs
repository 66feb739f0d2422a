//! Inbound event models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// System an inbound event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    NowCerts,
    Ghl,
}

impl SourceSystem {
    /// Tag used in event ids and logs.
    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NowCerts => "nowcerts",
            Self::Ghl => "ghl",
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// NowCerts webhook body. Unknown top-level fields are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowCertsWebhookPayload {
    pub event_type: String,
    /// Sent as either an ISO string or epoch number.
    #[serde(default)]
    pub timestamp: Option<Value>,
    pub data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// GoHighLevel webhook body. Unknown top-level fields are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhlWebhookPayload {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub contact: Option<Map<String, Value>>,
    #[serde(default)]
    pub opportunity: Option<Map<String, Value>>,
    #[serde(default, rename = "locationId")]
    pub location_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// NowCerts event kinds the dispatcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NowCertsEventKind {
    InsuredInsert,
    InsuredUpdate,
    Policy { update: bool },
    Quote { update: bool },
    Unhandled,
}

impl NowCertsEventKind {
    pub fn parse(event_type: &str) -> Self {
        let event_type = event_type.trim().to_ascii_uppercase();
        let update = event_type.ends_with("_UPDATE");
        match event_type.as_str() {
            "INSURED_INSERT" => Self::InsuredInsert,
            "INSURED_UPDATE" => Self::InsuredUpdate,
            t if t.starts_with("POLICY_") => Self::Policy { update },
            t if t.starts_with("QUOTE_") => Self::Quote { update },
            _ => Self::Unhandled,
        }
    }
}

/// A parsed inbound event.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    NowCerts(NowCertsWebhookPayload),
    Ghl(GhlWebhookPayload),
}

impl InboundEvent {
    /// Validate `payload` against the shape expected from `source`.
    pub fn parse(source: SourceSystem, payload: &Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(Error::invalid_payload("webhook body must be a JSON object"));
        }

        match source {
            SourceSystem::NowCerts => serde_json::from_value(payload.clone())
                .map(Self::NowCerts)
                .map_err(|e| Error::invalid_payload(format!("NowCerts webhook: {e}"))),
            SourceSystem::Ghl => serde_json::from_value(payload.clone())
                .map(Self::Ghl)
                .map_err(|e| Error::invalid_payload(format!("GoHighLevel webhook: {e}"))),
        }
    }
    /// The event re-serialized from its parsed form.
    ///
    /// Absent optional fields come back as `null`, so a payload that omits
    /// them and one that sends them as `null` render identically.
    pub fn normalized(&self) -> Result<Value> {
        let value = match self {
            Self::NowCerts(event) => serde_json::to_value(event)?,
            Self::Ghl(event) => serde_json::to_value(event)?,
        };
        Ok(value)
    }
}

/// Entity kinds accepted by manual sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Contact,
    Policy,
    Quote,
    Opportunity,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Policy => "policy",
            Self::Quote => "quote",
            Self::Opportunity => "opportunity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToGhl,
    ToNowcerts,
}

/// Manual sync request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub source: SourceSystem,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub direction: SyncDirection,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

/// Manual sync result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result of dispatching one inbound event.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub accepted: bool,
    pub event_id: String,
    pub target_id: Option<String>,
    pub message: String,
    pub data: Option<Value>,
}
