//! System-wide settings shared by every farm and visitor surface.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

pub const DEFAULT_SETTINGS_ID: &str = "default";

/// The singleton settings record stored by the backend.
///
/// Every field falls back to its default when the backend omits it, so any
/// payload shape deserializes into a usable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSettings {
    pub id: String,
    pub site_name: String,
    pub site_description: String,
    pub language: String,
    pub timezone: String,
    pub date_format: String,
    pub favicon: Option<String>,
    pub logo: Option<String>,
    pub vapid_public_key: Option<String>,
    pub log_level: String,
    pub log_retention_days: u32,
    pub max_visitors_per_day: u32,
    pub visitor_data_retention_days: u32,
    pub require_visitor_photo: bool,
    pub require_visitor_contact: bool,
    pub visit_template: String,
    pub notification_badge: Option<String>,
    pub notification_icon: Option<String>,
    pub push_require_interaction: bool,
    pub push_sound_enabled: bool,
    pub push_vibrate_enabled: bool,
    pub maintenance_mode: bool,
    pub debug_mode: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_SETTINGS_ID.to_string(),
            site_name: "Farm Pass".to_string(),
            site_description: "Farm visitor access management".to_string(),
            language: "ko".to_string(),
            timezone: "Asia/Seoul".to_string(),
            date_format: "YYYY-MM-DD".to_string(),
            favicon: None,
            logo: None,
            vapid_public_key: None,
            log_level: "info".to_string(),
            log_retention_days: 90,
            max_visitors_per_day: 100,
            visitor_data_retention_days: 1095,
            require_visitor_photo: false,
            require_visitor_contact: true,
            visit_template: "{{farm_name}}: {{visitor_name}} visited at {{visit_time}}".to_string(),
            notification_badge: None,
            notification_icon: None,
            push_require_interaction: false,
            push_sound_enabled: false,
            push_vibrate_enabled: false,
            maintenance_mode: false,
            debug_mode: false,
            created_at: None,
            updated_at: None,
        }
    }
}

impl SystemSettings {
    /// Whether this record is the built-in fallback rather than backend data.
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_SETTINGS_ID
    }
}

/// Partial update applied on top of the stored settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub site_name: Option<String>,
    pub site_description: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub date_format: Option<String>,
    pub favicon: Option<String>,
    pub logo: Option<String>,
    pub vapid_public_key: Option<String>,
    pub log_level: Option<String>,
    pub log_retention_days: Option<u32>,
    pub max_visitors_per_day: Option<u32>,
    pub visitor_data_retention_days: Option<u32>,
    pub require_visitor_photo: Option<bool>,
    pub require_visitor_contact: Option<bool>,
    pub visit_template: Option<String>,
    pub notification_badge: Option<String>,
    pub notification_icon: Option<String>,
    pub push_require_interaction: Option<bool>,
    pub push_sound_enabled: Option<bool>,
    pub push_vibrate_enabled: Option<bool>,
    pub maintenance_mode: Option<bool>,
    pub debug_mode: Option<bool>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = self.site_name.as_deref()
            && name.trim().is_empty()
        {
            return Err(DomainError::validation("siteName must not be empty"));
        }
        if self.log_retention_days == Some(0) {
            return Err(DomainError::validation(
                "logRetentionDays must be greater than zero",
            ));
        }
        if self.visitor_data_retention_days == Some(0) {
            return Err(DomainError::validation(
                "visitorDataRetentionDays must be greater than zero",
            ));
        }
        if self.max_visitors_per_day == Some(0) {
            return Err(DomainError::validation(
                "maxVisitorsPerDay must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn apply(self, target: &mut SystemSettings) {
        let patch = self;
        macro_rules! assign {
            ($patch:ident, $target:ident; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $patch.$field {
                    $target.$field = value;
                })*
            };
        }
        macro_rules! assign_optional {
            ($patch:ident, $target:ident; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $patch.$field {
                    $target.$field = (!value.trim().is_empty()).then_some(value);
                })*
            };
        }

        assign!(
            patch, target;
            site_name,
            site_description,
            language,
            timezone,
            date_format,
            log_level,
            log_retention_days,
            max_visitors_per_day,
            visitor_data_retention_days,
            require_visitor_photo,
            require_visitor_contact,
            visit_template,
            push_require_interaction,
            push_sound_enabled,
            push_vibrate_enabled,
            maintenance_mode,
            debug_mode,
        );
        // An empty string clears an optional asset reference.
        assign_optional!(
            patch, target;
            favicon,
            logo,
            vapid_public_key,
            notification_badge,
            notification_icon,
        );
        target.updated_at = Some(OffsetDateTime::now_utc());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payload_fills_defaults() {
        let settings: SystemSettings = serde_json::from_str(
            r#"{"id":"row-1","siteName":"Green Acres","vapidPublicKey":"BPk","unknownField":42}"#,
        )
        .expect("payload should deserialize");

        assert_eq!(settings.id, "row-1");
        assert_eq!(settings.site_name, "Green Acres");
        assert_eq!(settings.vapid_public_key.as_deref(), Some("BPk"));
        assert_eq!(settings.max_visitors_per_day, 100);
        assert!(!settings.is_default());
    }

    #[test]
    fn serializes_camel_case_fields() {
        let value = serde_json::to_value(SystemSettings::default()).expect("serialize");
        assert_eq!(value["siteName"], "Farm Pass");
        assert!(value.get("site_name").is_none());
        assert!(value["vapidPublicKey"].is_null());
    }

    #[test]
    fn patch_rejects_blank_site_name() {
        let patch = SettingsPatch {
            site_name: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            patch.validate(),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn patch_overwrites_only_supplied_fields() {
        let mut settings = SystemSettings {
            logo: Some("logo.png".to_string()),
            ..Default::default()
        };
        let patch = SettingsPatch {
            site_name: Some("Hill Farm".to_string()),
            logo: Some(String::new()),
            maintenance_mode: Some(true),
            ..Default::default()
        };

        patch.apply(&mut settings);

        assert_eq!(settings.site_name, "Hill Farm");
        assert_eq!(settings.logo, None);
        assert!(settings.maintenance_mode);
        assert_eq!(settings.timezone, "Asia/Seoul");
        assert!(settings.updated_at.is_some());
    }
}
