//! Immutable pipeline configuration.
//!
//! The valid status set, the contract's NOT NULL field list, the imputation
//! defaults and the rejection behaviour are all data, passed to both stages
//! at construction. [`PipelineConfig::default`] reproduces the fixed policy
//! for the `users` contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::field::{self, FieldKind, FieldRule, USER_FIELDS};
use crate::normalize::normalize_status;

/// Phone value substituted for a missing or unparsable phone number.
///
/// Deliberately outside any real phone range; downstream consumers treat it
/// as a null marker.
pub const PHONE_SENTINEL: i64 = -999_999_999;

/// Text substituted for a missing name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Terminal status given to any record that cannot be trusted.
pub const SAFE_STATUS: &str = "cancelled";

/// What happens to a record whose required identity or temporal field is
/// still null after flagging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionMode {
    /// Route the record to the rejection batch with a diagnostic; the rest
    /// of the batch proceeds.
    #[default]
    Quarantine,
    /// Fail the whole batch.
    Abort,
}

/// A default value for a nullable-on-input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Imputation {
    Integer(i64),
    Text(String),
}

/// Enrollment business rules from the bronze model; off by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrollmentConfig {
    /// Also flag invalid e-mail addresses and under-age accounts.
    pub strict: bool,
    /// Minimum age in years at account creation.
    pub min_age: i32,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            strict: false,
            min_age: 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Closed set of canonical (trimmed, lowercase) status tokens.
    pub valid_statuses: Vec<String>,
    /// Status given to anomalous records and out-of-domain statuses.
    pub safe_status: String,
    /// Fields the downstream contract declares NOT NULL.
    pub required: Vec<String>,
    /// Field name to default-on-null.
    pub imputation: BTreeMap<String, Imputation>,
    pub rejection: RejectionMode,
    /// chrono formats tried in order for date fields.
    pub date_formats: Vec<String>,
    /// chrono formats tried in order for timestamp fields, before RFC 3339
    /// and the date formats.
    pub timestamp_formats: Vec<String>,
    pub enrollment: EnrollmentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let imputation = BTreeMap::from([
            (
                field::FIRST_NAME.to_string(),
                Imputation::Text(UNKNOWN_NAME.to_string()),
            ),
            (
                field::LAST_NAME.to_string(),
                Imputation::Text(UNKNOWN_NAME.to_string()),
            ),
            (field::PHONE.to_string(), Imputation::Integer(PHONE_SENTINEL)),
        ]);
        Self {
            valid_statuses: ["active", "inactive", "pending", SAFE_STATUS]
                .map(String::from)
                .to_vec(),
            safe_status: SAFE_STATUS.to_string(),
            required: [
                field::ID,
                field::FIRST_NAME,
                field::LAST_NAME,
                field::PHONE,
                field::STATUS,
                field::BIRTH_DATE,
                field::CREATED_AT,
            ]
            .map(String::from)
            .to_vec(),
            imputation,
            rejection: RejectionMode::Quarantine,
            date_formats: ["%m/%d/%Y", "%Y-%m-%d"].map(String::from).to_vec(),
            timestamp_formats: [
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S%.f",
                "%m/%d/%Y %H:%M:%S",
            ]
            .map(String::from)
            .to_vec(),
            enrollment: EnrollmentConfig::default(),
        }
    }
}

/// A field rule resolved against a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    pub rule: FieldRule,
    pub required: bool,
    pub imputation: Option<Imputation>,
}

impl FieldPolicy {
    /// A required field with no default: a null here cannot be fixed.
    pub fn rejects_on_null(&self) -> bool {
        self.required && self.imputation.is_none() && self.rule.kind != FieldKind::Status
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.valid_statuses.is_empty() {
            return Err(ConfigError::EmptyStatusSet);
        }
        for status in &self.valid_statuses {
            if normalize_status(Some(status)).as_deref() != Some(status.as_str()) {
                return Err(ConfigError::NonCanonicalStatus(status.clone()));
            }
        }
        if !self.is_valid_status(&self.safe_status) {
            return Err(ConfigError::SafeStatusNotValid(self.safe_status.clone()));
        }
        for name in &self.required {
            field::rule(name).ok_or_else(|| ConfigError::UnknownField(name.clone()))?;
        }
        for (name, value) in &self.imputation {
            let rule = field::rule(name).ok_or_else(|| ConfigError::UnknownField(name.clone()))?;
            if !rule.imputable {
                return Err(ConfigError::NotImputable(name.clone()));
            }
            check_imputation_type(rule, value)?;
        }
        if self.date_formats.is_empty() {
            return Err(ConfigError::NoDateFormats);
        }
        Ok(())
    }

    pub fn is_valid_status(&self, token: &str) -> bool {
        self.valid_statuses.iter().any(|s| s == token)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// The field table resolved against this configuration, in contracted
    /// column order.
    pub fn policies(&self) -> Vec<FieldPolicy> {
        USER_FIELDS
            .iter()
            .map(|rule| FieldPolicy {
                rule: *rule,
                required: self.is_required(rule.name),
                imputation: self.imputation.get(rule.name).cloned(),
            })
            .collect()
    }

    pub fn policy(&self, name: &str) -> Option<FieldPolicy> {
        self.policies().into_iter().find(|p| p.rule.name == name)
    }

    /// Text default for `name`, if one is configured.
    pub fn text_default(&self, name: &str) -> Option<&str> {
        match self.imputation.get(name) {
            Some(Imputation::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer default for `name`, if one is configured.
    pub fn integer_default(&self, name: &str) -> Option<i64> {
        match self.imputation.get(name) {
            Some(Imputation::Integer(v)) => Some(*v),
            _ => None,
        }
    }
}

fn check_imputation_type(rule: &FieldRule, value: &Imputation) -> Result<(), ConfigError> {
    let ok = match (rule.kind, value) {
        (FieldKind::Name | FieldKind::Email, Imputation::Text(s)) => !s.trim().is_empty(),
        (FieldKind::Int64, Imputation::Integer(_)) => true,
        (FieldKind::Int32, Imputation::Integer(v)) => i32::try_from(*v).is_ok(),
        _ => false,
    };
    if ok {
        return Ok(());
    }
    let expected = match rule.kind {
        FieldKind::Name | FieldKind::Email => "non-blank text",
        FieldKind::Int32 => "a 32-bit integer",
        _ => "an integer",
    };
    Err(ConfigError::ImputationType {
        field: rule.name.to_string(),
        expected,
    })
}
