use std::cmp::Ordering;

use crate::flags::flag_decision::{AccessDecision, DecisionReason};
use crate::flags::flag_models::{Environment, FlagRecord, ScopeType};
use crate::flags::flag_request::{AccessRequest, Principal, ScopeTarget};

pub const GAME_ACCESS_FEATURE: &str = "game_access";

/// Scope levels in evaluation order, most specific first. The first level with a
/// matching rule decides the request.
pub const SCOPE_PRECEDENCE: [ScopeType; 4] = [
    ScopeType::User,
    ScopeType::Game,
    ScopeType::Section,
    ScopeType::Global,
];

/// Resolves the effective rule for `request` out of `records`.
///
/// Fails closed. Malformed candidates deny instead of being skipped. The winning
/// record's metadata is copied verbatim, never merged across levels.
pub fn resolve(records: &[FlagRecord], request: &AccessRequest) -> AccessDecision {
    if request.feature_key.trim().is_empty() {
        tracing::warn!("access requested for an empty feature key");
        return AccessDecision::denied(&request.feature_key, DecisionReason::DataError);
    }

    let candidates: Vec<&FlagRecord> = records
        .iter()
        .filter(|record| record.feature_key == request.feature_key)
        .filter(|record| record.environment == request.environment)
        .filter(|record| role_applies(record, request.role()))
        .collect();

    if let Some(malformed) = candidates.iter().find(|record| !record.is_well_formed()) {
        tracing::error!(
            flag_id = ?malformed.id,
            feature_key = %request.feature_key,
            scope_type = %malformed.scope_type,
            "malformed feature flag, denying"
        );
        return AccessDecision::denied(&request.feature_key, DecisionReason::DataError);
    }

    for scope in SCOPE_PRECEDENCE {
        let Some(target) = request.target_for(scope) else {
            continue;
        };

        let winner = candidates
            .iter()
            .copied()
            .filter(|record| record.scope_type == scope && record.scope_id.as_deref() == target)
            .min_by(|a, b| precedence(a, b));

        if let Some(record) = winner {
            return AccessDecision::from_record(record);
        }
    }

    AccessDecision::denied(&request.feature_key, DecisionReason::NoMatchingRule)
}

/// Returns the candidate game ids the principal may open, each resolved on its own.
pub fn accessible_games<'a>(
    records: &[FlagRecord],
    environment: Environment,
    principal: &Principal,
    candidate_game_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    candidate_game_ids
        .into_iter()
        .filter(|game_id| {
            let request = AccessRequest::new(
                GAME_ACCESS_FEATURE,
                environment,
                principal.clone(),
                ScopeTarget::game(*game_id),
            );
            resolve(records, &request).allowed
        })
        .map(str::to_string)
        .collect()
}

fn role_applies(record: &FlagRecord, role: Option<&str>) -> bool {
    match record.role.as_deref() {
        None => true,
        Some(record_role) => Some(record_role) == role,
    }
}

// Role-specific before wildcard, then disabled before enabled, then lowest id.
fn precedence(a: &FlagRecord, b: &FlagRecord) -> Ordering {
    b.is_role_specific()
        .cmp(&a.is_role_specific())
        .then_with(|| a.enabled.cmp(&b.enabled))
        .then_with(|| match (a.id, b.id) {
            (Some(a_id), Some(b_id)) => a_id.cmp(&b_id),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}
