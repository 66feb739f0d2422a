//! Field mapping between NowCerts and GoHighLevel shapes.
//!
//! Missing source fields map to empty strings (or `0` for amounts), so
//! the produced bodies always have the same keys.

use serde_json::{Map, Value, json};

/// GHL pipeline name for a NowCerts policy type.
pub fn pipeline_for_policy_type(policy_type: &str) -> &'static str {
    match policy_type {
        "Auto" => "Auto Insurance",
        "Home" => "Home Insurance",
        "Life" => "Life Insurance",
        "Health" => "Health Insurance",
        _ => "General Insurance",
    }
}

fn field(source: &Value, key: &str) -> Value {
    match source.get(key) {
        Some(Value::Null) | None => Value::String(String::new()),
        Some(v) => v.clone(),
    }
}

fn field_or(source: &Value, key: &str, default: Value) -> Value {
    match source.get(key) {
        Some(Value::Null) | None => default,
        Some(v) => v.clone(),
    }
}

/// Render a scalar for a string-typed custom field.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// NowCerts insured → GHL contact.
pub fn nowcerts_to_ghl_contact(insured: &Value) -> Value {
    let empty = Value::Object(Map::new());
    let address = insured
        .get("address")
        .filter(|a| a.is_object())
        .unwrap_or(&empty);

    json!({
        "firstName": field(insured, "firstName"),
        "lastName": field(insured, "lastName"),
        "email": field(insured, "email"),
        "phone": field(insured, "phone"),
        "address1": field(address, "street"),
        "city": field(address, "city"),
        "state": field(address, "state"),
        "postalCode": field(address, "zip"),
        "source": field_or(insured, "source", json!("NowCerts")),
    })
}

/// GHL contact → NowCerts insured.
pub fn ghl_to_nowcerts_contact(contact: &Value) -> Value {
    json!({
        "firstName": field(contact, "firstName"),
        "lastName": field(contact, "lastName"),
        "email": field(contact, "email"),
        "phone": field(contact, "phone"),
        "address": {
            "street": field(contact, "address1"),
            "city": field(contact, "city"),
            "state": field(contact, "state"),
            "zip": field(contact, "postalCode"),
        },
        "source": field_or(contact, "source", json!("GHL")),
    })
}

/// NowCerts policy or quote → GHL opportunity.
///
/// Pipeline and stage ids depend on the GHL account setup and are left
/// null; `contactId` is set only when `contact_id` is given.
pub fn nowcerts_to_ghl_opportunity(policy: &Value, contact_id: Option<&str>) -> Value {
    let policy_type = policy
        .get("policyType")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("General");
    let policy_number = policy
        .get("policyNumber")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A");
    let premium = field_or(policy, "premium", json!(0));

    let mut opportunity = json!({
        "name": format!("{policy_type} Policy - {policy_number}"),
        "pipelineName": pipeline_for_policy_type(policy_type),
        "pipelineId": null,
        "pipelineStageId": null,
        "monetaryValue": premium,
        "customFields": [
            {"key": "policy_type", "value": policy_type},
            {"key": "policy_number", "value": as_text(&field(policy, "policyNumber"))},
            {"key": "carrier", "value": as_text(&field(policy, "carrier"))},
            {"key": "effective_date", "value": as_text(&field(policy, "effectiveDate"))},
            {"key": "expiration_date", "value": as_text(&field(policy, "expirationDate"))},
            {"key": "premium", "value": as_text(&premium)},
        ],
    });

    if let Some(contact_id) = contact_id.filter(|id| !id.is_empty())
        && let Some(fields) = opportunity.as_object_mut()
    {
        fields.insert("contactId".to_string(), json!(contact_id));
    }

    opportunity
}

/// Look up a GHL custom field by key. GHL sends custom fields either as a
/// list of `{key|id, value}` entries or as a flat object.
pub fn ghl_custom_field<'a>(opportunity: &'a Value, key: &str) -> Option<&'a Value> {
    let value = match opportunity.get("customFields")? {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items
            .iter()
            .find(|item| {
                item.get("key").and_then(Value::as_str) == Some(key)
                    || item.get("id").and_then(Value::as_str) == Some(key)
            })
            .and_then(|item| item.get("value")),
        _ => None,
    };
    value.filter(|v| !v.is_null())
}

/// GHL opportunity → NowCerts quote.
pub fn ghl_opportunity_to_nowcerts_quote(opportunity: &Value) -> Value {
    json!({
        "policyType": ghl_custom_field(opportunity, "policy_type")
            .cloned()
            .unwrap_or_else(|| json!("General")),
        "premium": field_or(opportunity, "monetaryValue", json!(0)),
        "carrier": ghl_custom_field(opportunity, "carrier")
            .cloned()
            .unwrap_or_else(|| json!("")),
        "source": "GHL",
    })
}
