use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::api::errors::FlagError;
use crate::flags::flag_decision::{AccessDecision, DecisionReason};
use crate::flags::flag_models::Environment;
use crate::flags::flag_request::{AccessRequest, Principal, ScopeTarget};
use crate::flags::flag_resolver::{self, GAME_ACCESS_FEATURE};
use crate::flags::flag_store::FlagStore;
use crate::metrics::consts::{
    ACCESS_CHECK_TIME, ACCESS_DECISIONS_COUNTER, QUOTA_CHECKS_COUNTER,
    USAGE_EVENTS_RECORDED_COUNTER, USAGE_STORE_ERRORS_COUNTER,
};
use crate::metrics::utils::{decision_labels, histogram, inc};
use crate::usage::quota::{day_start, evaluate_daily_limit, parse_daily_limit};
use crate::usage::usage_models::{EventType, UsageEvent, UsageQuery, UsageStats};
use crate::usage::usage_stats::{aggregate, period_start, validate_days};
use crate::usage::usage_store::UsageStore;

pub const CHAT_FEATURE: &str = "chat";
pub const FAQ_FEATURE: &str = "faq";

/// Service layer composing the flag store, the resolver and quota enforcement.
///
/// Every failure of a backing store turns into a denial; nothing here can
/// default to allowing a request.
#[derive(Clone)]
pub struct AccessService {
    flag_store: Arc<dyn FlagStore>,
    usage_store: Arc<dyn UsageStore>,
    environment: Environment,
}

impl AccessService {
    pub fn new(
        flag_store: Arc<dyn FlagStore>,
        usage_store: Arc<dyn UsageStore>,
        environment: Environment,
    ) -> Self {
        Self {
            flag_store,
            usage_store,
            environment,
        }
    }

    pub fn flag_store(&self) -> &Arc<dyn FlagStore> {
        &self.flag_store
    }

    /// Full access check: resolve the flags, then enforce any `daily_limit`.
    #[tracing::instrument(skip(self), fields(environment = %self.environment))]
    pub async fn check_access(
        &self,
        principal: &Principal,
        feature_key: &str,
        target: &ScopeTarget,
    ) -> AccessDecision {
        self.check_access_at(principal, feature_key, target, Utc::now())
            .await
    }

    pub async fn check_access_at(
        &self,
        principal: &Principal,
        feature_key: &str,
        target: &ScopeTarget,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let start = Instant::now();
        let request = AccessRequest::new(
            feature_key,
            self.environment,
            principal.clone(),
            target.clone(),
        );

        let decision = match self.resolve_flags(&request).await {
            Ok(decision) if decision.allowed => self.enforce_quota(&request, decision, now).await,
            Ok(decision) => decision,
            Err(e) if e.is_data_error() => {
                tracing::error!(
                    feature_key,
                    error_code = e.error_code(),
                    "unreadable flag data, denying access: {}",
                    e
                );
                AccessDecision::denied(feature_key, DecisionReason::DataError)
            }
            Err(e) => {
                tracing::error!(
                    feature_key,
                    error_code = e.error_code(),
                    "flag store failed, denying access: {}",
                    e
                );
                AccessDecision::denied(feature_key, DecisionReason::StoreUnavailable)
            }
        };

        let labels = decision_labels(
            feature_key,
            &decision.reason.to_string(),
            decision.matched_scope.map(|s| s.to_string()).as_deref(),
        );
        inc(ACCESS_DECISIONS_COUNTER, &labels, 1);
        histogram(
            ACCESS_CHECK_TIME,
            &[("feature_key".to_string(), feature_key.to_string())],
            start.elapsed().as_secs_f64() * 1000.0,
        );

        tracing::info!(
            feature_key,
            user_id = ?principal.user_id,
            role = ?principal.role,
            allowed = decision.allowed,
            reason = %decision.reason,
            matched_scope = ?decision.matched_scope,
            "access decision"
        );

        decision
    }

    pub async fn check_chat_access(&self, principal: &Principal, game_id: &str) -> AccessDecision {
        self.check_access(principal, CHAT_FEATURE, &ScopeTarget::game(game_id))
            .await
    }

    pub async fn check_faq_access(&self, principal: &Principal, game_id: &str) -> AccessDecision {
        self.check_access(principal, FAQ_FEATURE, &ScopeTarget::game(game_id))
            .await
    }

    pub async fn check_game_access(&self, principal: &Principal, game_id: &str) -> AccessDecision {
        self.check_access(principal, GAME_ACCESS_FEATURE, &ScopeTarget::game(game_id))
            .await
    }

    /// Filters `candidate_game_ids` down to the games the principal may open.
    /// A store failure yields no games.
    pub async fn accessible_games(
        &self,
        principal: &Principal,
        candidate_game_ids: &[String],
    ) -> Vec<String> {
        match self
            .flag_store
            .fetch_flags(GAME_ACCESS_FEATURE, self.environment)
            .await
        {
            Ok(records) => flag_resolver::accessible_games(
                &records,
                self.environment,
                principal,
                candidate_game_ids.iter().map(String::as_str),
            ),
            Err(e) => {
                tracing::error!("flag store failed while listing accessible games: {}", e);
                Vec::new()
            }
        }
    }

    /// Appends a usage event in the service environment. Failures are logged and
    /// swallowed so that analytics never fails the calling request.
    pub async fn record_usage(
        &self,
        user_id: &str,
        event_type: EventType,
        game_id: Option<String>,
        feature_key: Option<String>,
        extra_info: Option<serde_json::Value>,
    ) {
        let event = UsageEvent {
            user_id: user_id.to_string(),
            event_type,
            environment: self.environment,
            game_id,
            feature_key,
            extra_info,
            timestamp: Utc::now(),
        };

        match self.usage_store.record_event(&event).await {
            Ok(()) => inc(
                USAGE_EVENTS_RECORDED_COUNTER,
                &[("event_type".to_string(), event_type.to_string())],
                1,
            ),
            Err(e) => {
                inc(USAGE_STORE_ERRORS_COUNTER, &[("op".to_string(), "record".to_string())], 1);
                tracing::warn!(user_id, %event_type, "failed to record usage event: {}", e);
            }
        }
    }

    /// Aggregates the user's events over the last `days` days, which must be in
    /// `1..=MAX_STATS_DAYS`.
    pub async fn user_stats(&self, user_id: &str, days: u32) -> Result<UsageStats, FlagError> {
        let days = validate_days(days)?;
        let now = Utc::now();
        let events = self
            .usage_store
            .list_events(user_id, self.environment, period_start(now, days))
            .await
            .inspect_err(|_| {
                inc(USAGE_STORE_ERRORS_COUNTER, &[("op".to_string(), "stats".to_string())], 1)
            })?;
        Ok(aggregate(user_id, days, &events, now))
    }

    async fn resolve_flags(&self, request: &AccessRequest) -> Result<AccessDecision, FlagError> {
        let records = self
            .flag_store
            .fetch_flags(&request.feature_key, request.environment)
            .await?;
        Ok(flag_resolver::resolve(&records, request))
    }

    async fn enforce_quota(
        &self,
        request: &AccessRequest,
        decision: AccessDecision,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let Some(raw_limit) = decision.daily_limit_value() else {
            return decision;
        };

        let daily_limit = match parse_daily_limit(raw_limit) {
            Ok(limit) => limit,
            Err(e) => {
                tracing::error!(feature_key = %request.feature_key, "{}", e);
                return decision.deny_with(DecisionReason::DataError);
            }
        };

        let Some(user_id) = request.principal.user_id.clone() else {
            tracing::warn!(
                feature_key = %request.feature_key,
                "daily limit set but no user to count against, denying"
            );
            return decision.deny_with(DecisionReason::DataError);
        };

        let event_type = EventType::qualifying_for(&request.feature_key);
        let query = UsageQuery {
            user_id,
            environment: request.environment,
            since: day_start(now),
            event_type,
            feature_key: event_type
                .is_none()
                .then(|| request.feature_key.clone()),
            game_id: request.target.game_id.clone(),
        };

        let daily_used = match self.usage_store.count_events(&query).await {
            Ok(count) => count,
            Err(e) => {
                inc(USAGE_STORE_ERRORS_COUNTER, &[("op".to_string(), "count".to_string())], 1);
                tracing::error!(
                    feature_key = %request.feature_key,
                    "usage store failed, denying access: {}",
                    e
                );
                return decision.deny_with(DecisionReason::StoreUnavailable);
            }
        };

        let quota = evaluate_daily_limit(daily_limit, daily_used, now);
        inc(
            QUOTA_CHECKS_COUNTER,
            &[
                ("feature_key".to_string(), request.feature_key.clone()),
                ("has_quota".to_string(), quota.has_quota().to_string()),
            ],
            1,
        );

        if quota.has_quota() {
            decision.with_quota(quota)
        } else {
            decision.quota_exceeded(quota)
        }
    }
}
