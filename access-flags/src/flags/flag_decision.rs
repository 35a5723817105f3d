use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::flags::flag_models::{FlagRecord, ScopeType};
use crate::usage::quota::DAILY_LIMIT_KEY;
use crate::usage::usage_models::QuotaStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionReason {
    EnabledByFlag,
    DisabledByFlag,
    NoMatchingRule,
    QuotaExceeded,
    DataError,
    StoreUnavailable,
}

impl DecisionReason {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DecisionReason::EnabledByFlag)
    }

    /// Short human readable explanation, surfaced in denial responses.
    pub fn describe(&self) -> &'static str {
        match self {
            DecisionReason::EnabledByFlag => "Feature enabled",
            DecisionReason::DisabledByFlag | DecisionReason::NoMatchingRule => {
                "Feature not available"
            }
            DecisionReason::QuotaExceeded => "Daily limit reached",
            DecisionReason::DataError => "Feature not available due to a configuration error",
            DecisionReason::StoreUnavailable => "Feature temporarily unavailable",
        }
    }
}

/// Outcome of evaluating a capability for a principal. Computed per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub feature_key: String,
    pub reason: DecisionReason,
    pub matched_scope: Option<ScopeType>,
    pub matched_role: Option<String>,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaStatus>,
}

impl AccessDecision {
    pub fn from_record(record: &FlagRecord) -> Self {
        let reason = if record.enabled {
            DecisionReason::EnabledByFlag
        } else {
            DecisionReason::DisabledByFlag
        };
        Self {
            allowed: record.enabled,
            feature_key: record.feature_key.clone(),
            reason,
            matched_scope: Some(record.scope_type),
            matched_role: record.role.clone(),
            metadata: record.metadata.clone(),
            quota: None,
        }
    }

    pub fn denied(feature_key: impl Into<String>, reason: DecisionReason) -> Self {
        debug_assert!(!reason.is_allowed());
        Self {
            allowed: false,
            feature_key: feature_key.into(),
            reason,
            matched_scope: None,
            matched_role: None,
            metadata: Map::new(),
            quota: None,
        }
    }

    /// Turns an allowed decision into a quota denial, keeping the matched rule for audit.
    pub fn quota_exceeded(mut self, quota: QuotaStatus) -> Self {
        self.allowed = false;
        self.reason = DecisionReason::QuotaExceeded;
        self.quota = Some(quota);
        self
    }

    pub fn with_quota(mut self, quota: QuotaStatus) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Downgrades the decision to a denial that keeps what was matched.
    pub fn deny_with(mut self, reason: DecisionReason) -> Self {
        self.allowed = false;
        self.reason = reason;
        self
    }

    pub fn daily_limit_value(&self) -> Option<&Value> {
        self.metadata.get(DAILY_LIMIT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::flag_models::Environment;
    use serde_json::json;

    #[test]
    fn test_only_enabled_is_allowed() {
        let reasons = [
            DecisionReason::DisabledByFlag,
            DecisionReason::NoMatchingRule,
            DecisionReason::QuotaExceeded,
            DecisionReason::DataError,
            DecisionReason::StoreUnavailable,
        ];
        assert!(DecisionReason::EnabledByFlag.is_allowed());
        assert!(reasons.iter().all(|r| !r.is_allowed()));
    }

    #[test]
    fn test_display() {
        assert_eq!(DecisionReason::EnabledByFlag.to_string(), "enabled_by_flag");
        assert_eq!(DecisionReason::NoMatchingRule.to_string(), "no_matching_rule");
        assert_eq!(DecisionReason::QuotaExceeded.to_string(), "quota_exceeded");
        assert_eq!(
            "store_unavailable".parse::<DecisionReason>().unwrap(),
            DecisionReason::StoreUnavailable
        );
    }

    #[test]
    fn test_from_disabled_record() {
        let record = FlagRecord {
            id: Some(1),
            scope_type: ScopeType::User,
            scope_id: Some("u1".to_string()),
            feature_key: "chat".to_string(),
            role: None,
            environment: Environment::Prod,
            enabled: false,
            metadata: json!({"note": "abuse"}).as_object().cloned().unwrap(),
        };
        let decision = AccessDecision::from_record(&record);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::DisabledByFlag);
        assert_eq!(decision.matched_scope, Some(ScopeType::User));
        assert_eq!(decision.metadata.get("note"), Some(&json!("abuse")));
    }

    #[test]
    fn test_serializes_reason_snake_case() {
        let decision = AccessDecision::denied("faq", DecisionReason::NoMatchingRule);
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["reason"], json!("no_matching_rule"));
        assert_eq!(value["matched_scope"], Value::Null);
        assert!(value.get("quota").is_none());
    }
}
