use axum::body::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::api::errors::FlagError;
use crate::flags::flag_request::{Principal, ScopeTarget};
use crate::usage::usage_models::EventType;

/// Body of `POST /access`. The environment is never taken from the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessCheckBody {
    pub feature_key: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

impl AccessCheckBody {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id.clone(),
            role: self.role.clone(),
        }
    }

    pub fn target(&self) -> ScopeTarget {
        ScopeTarget {
            game_id: self.game_id.clone(),
            section_id: self.section_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UsageEventBody {
    pub user_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub feature_key: Option<String>,
    #[serde(default)]
    pub extra_info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsageStatsParams {
    pub user_id: String,
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InvalidateBody {
    #[serde(default)]
    pub feature_key: Option<String>,
}

/// Decodes a JSON request body, rejecting anything that is not UTF-8 JSON of the expected shape.
pub fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, FlagError> {
    let payload = std::str::from_utf8(body).map_err(|e| {
        tracing::debug!("failed to decode body: {}", e);
        FlagError::RequestDecodingError(String::from("invalid body encoding"))
    })?;

    serde_json::from_str::<T>(payload).map_err(|e| {
        tracing::debug!("failed to parse JSON: {}", e);
        FlagError::RequestParsingError(e)
    })
}
