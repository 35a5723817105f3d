use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::api::errors::FlagError;

/// Deployment environment a flag rule belongs to. Rules never cross environments.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Dev, Environment::Prod];
}

/// Breadth at which a rule applies: global < section < game < user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeType {
    Global,
    Section,
    Game,
    User,
}

impl ScopeType {
    /// Only the global scope is unqualified; every other scope names a target.
    pub fn requires_scope_id(&self) -> bool {
        !matches!(self, ScopeType::Global)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlagRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub scope_type: ScopeType,
    #[serde(default)]
    pub scope_id: Option<String>,
    pub feature_key: String,
    #[serde(default)]
    pub role: Option<String>,
    pub environment: Environment,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl FlagRecord {
    /// A record is well-formed when `scope_id` is present exactly when the scope needs one.
    pub fn is_well_formed(&self) -> bool {
        let has_scope_id = self
            .scope_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        has_scope_id == self.scope_type.requires_scope_id()
    }

    pub fn is_role_specific(&self) -> bool {
        self.role.is_some()
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct FlagRecordRow {
    pub id: i64,
    pub scope_type: String,
    pub scope_id: Option<String>,
    pub feature_key: String,
    pub role: Option<String>,
    pub environment: String,
    pub enabled: bool,
    pub metadata: Option<Value>,
}

impl TryFrom<FlagRecordRow> for FlagRecord {
    type Error = FlagError;

    fn try_from(row: FlagRecordRow) -> Result<Self, Self::Error> {
        let scope_type = row.scope_type.parse::<ScopeType>().map_err(|_| {
            FlagError::UnknownEnumValue("scope_type".to_string(), row.scope_type.clone())
        })?;
        let environment = row.environment.parse::<Environment>().map_err(|_| {
            FlagError::UnknownEnumValue("environment".to_string(), row.environment.clone())
        })?;
        let metadata = match row.metadata {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                tracing::error!(
                    flag_id = row.id,
                    "feature flag metadata is not an object: {}",
                    other
                );
                return Err(FlagError::DataParsingError);
            }
        };

        Ok(FlagRecord {
            id: Some(row.id),
            scope_type,
            scope_id: row.scope_id,
            feature_key: row.feature_key,
            role: row.role,
            environment,
            enabled: row.enabled,
            metadata,
        })
    }
}
