//! Core credential types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};

/// Lifetime assumed when the identity endpoint reports no expiry.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A bearer credential issued by the identity endpoint.
///
/// Instances are immutable once installed; the manager swaps the whole
/// value so readers never observe a half-updated token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Token kind reported by the endpoint (normally `bearer`).
    pub token_kind: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from an identity response received at `now`.
    pub fn from_outcome(outcome: RefreshOutcome, now: DateTime<Utc>) -> Self {
        let expires_at = outcome.expiry(now);
        Self {
            access_token: outcome.access_token,
            refresh_token: outcome.refresh_token.filter(|t| !t.is_empty()),
            token_kind: outcome
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "bearer".to_string()),
            expires_at,
        }
    }

    /// Time left before the credential expires (negative once expired).
    #[inline]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Whether the credential expires within `buffer` of `now`.
    #[inline]
    pub fn is_near_expiry(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        now + buffer >= self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_kind", &self.token_kind)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response for both the password and refresh grants.
#[derive(Clone, Default, Deserialize)]
pub struct RefreshOutcome {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Relative lifetime in seconds.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    /// Absolute expiry, as sent by OWIN-style token endpoints.
    #[serde(default, rename = ".expires")]
    pub expires: Option<String>,
    /// Client id the token was issued to.
    #[serde(default, rename = "as:client_id")]
    pub client_id: Option<String>,
}

impl RefreshOutcome {
    /// Resolve the absolute expiry: a positive `expires_in` first, then
    /// `.expires`, falling back to one hour.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(at) = self
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
        {
            return at;
        }

        if let Some(raw) = self.expires.as_deref()
            && let Some(at) = parse_absolute(raw)
        {
            return at;
        }

        now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
    }
}

impl std::fmt::Debug for RefreshOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOutcome")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires", &self.expires)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Accept `expires_in` as either a JSON number or a numeric string.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Observable state of the credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No credential has been obtained yet.
    Empty,
    Valid,
    /// The credential expires within the refresh buffer.
    NearExpiry,
    /// A refresh or login is in flight.
    Refreshing,
}

impl CredentialState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Valid => "valid",
            Self::NearExpiry => "near_expiry",
            Self::Refreshing => "refreshing",
        }
    }
}

impl std::fmt::Display for CredentialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
