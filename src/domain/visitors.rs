//! Visitor entries recorded at farm gates.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Stored visitor entry as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorEntry {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub visitor_name: String,
    pub visitor_phone: String,
    #[serde(default)]
    pub visitor_address: Option<String>,
    #[serde(default)]
    pub visitor_purpose: Option<String>,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub disinfection_check: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub visit_datetime: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// Registration payload submitted at the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisitorEntry {
    pub farm_id: Uuid,
    pub visitor_name: String,
    pub visitor_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub disinfection_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub visit_datetime: Option<OffsetDateTime>,
}

impl NewVisitorEntry {
    /// Trim free-text fields and check the gate requirements.
    ///
    /// `require_contact` mirrors the `requireVisitorContact` system setting.
    pub fn normalize(mut self, require_contact: bool) -> Result<Self, DomainError> {
        if self.farm_id.is_nil() {
            return Err(DomainError::validation("farm_id is required"));
        }

        self.visitor_name = self.visitor_name.trim().to_string();
        if self.visitor_name.is_empty() {
            return Err(DomainError::validation("visitor_name must not be empty"));
        }

        self.visitor_phone = self.visitor_phone.trim().to_string();
        if require_contact && self.visitor_phone.is_empty() {
            return Err(DomainError::validation("visitor_phone must not be empty"));
        }

        if !self.consent_given {
            return Err(DomainError::validation(
                "visitor must consent to personal data collection",
            ));
        }

        self.visitor_address = trim_optional(self.visitor_address);
        self.visitor_purpose = trim_optional(self.visitor_purpose);
        self.vehicle_number = trim_optional(self.vehicle_number);
        self.notes = trim_optional(self.notes);
        if self.visit_datetime.is_none() {
            self.visit_datetime = Some(OffsetDateTime::now_utc());
        }

        Ok(self)
    }
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
