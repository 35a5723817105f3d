use serde::{Deserialize, Serialize};

use crate::flags::flag_models::{Environment, ScopeType};

/// The requesting entity whose access is being evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Principal {
    #[serde(default)]
    pub user_id: Option<String>,
    /// `None` is the lowest-privilege default and only matches wildcard rules.
    #[serde(default)]
    pub role: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role: Some(role.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Optional scope identifiers a request can match against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScopeTarget {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

impl ScopeTarget {
    pub fn game(game_id: impl Into<String>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            section_id: None,
        }
    }

    pub fn section(section_id: impl Into<String>) -> Self {
        Self {
            game_id: None,
            section_id: Some(section_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub feature_key: String,
    pub environment: Environment,
    pub principal: Principal,
    pub target: ScopeTarget,
}

impl AccessRequest {
    pub fn new(
        feature_key: impl Into<String>,
        environment: Environment,
        principal: Principal,
        target: ScopeTarget,
    ) -> Self {
        Self {
            feature_key: feature_key.into(),
            environment,
            principal,
            target,
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.principal.role.as_deref()
    }

    /// The identifier a rule at `scope` must carry to apply to this request.
    /// `Some(None)` means the scope applies unqualified (global); `None` means the
    /// request carries no target for that scope and the level is skipped.
    pub fn target_for(&self, scope: ScopeType) -> Option<Option<&str>> {
        match scope {
            ScopeType::Global => Some(None),
            ScopeType::User => self.principal.user_id.as_deref().map(Some),
            ScopeType::Game => self.target.game_id.as_deref().map(Some),
            ScopeType::Section => self.target.section_id.as_deref().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for() {
        let request = AccessRequest::new(
            "chat",
            Environment::Prod,
            Principal::new("u1", "basic"),
            ScopeTarget::game("g1"),
        );

        assert_eq!(request.target_for(ScopeType::Global), Some(None));
        assert_eq!(request.target_for(ScopeType::User), Some(Some("u1")));
        assert_eq!(request.target_for(ScopeType::Game), Some(Some("g1")));
        assert_eq!(request.target_for(ScopeType::Section), None);
        assert_eq!(request.role(), Some("basic"));
    }

    #[test]
    fn test_anonymous_principal_has_no_targets() {
        let request = AccessRequest::new(
            "faq",
            Environment::Dev,
            Principal::anonymous(),
            ScopeTarget::default(),
        );
        assert_eq!(request.target_for(ScopeType::User), None);
        assert_eq!(request.role(), None);
    }
}
