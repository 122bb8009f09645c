use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use derive_more::{Display, From, Into};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::users::UserId;

/// Opaque session identifier carried in the session cookie.
///
/// Generated from 32 random bytes; the value itself carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::rng().random();
        Self(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Profile document returned by the provider's profile endpoint.
///
/// Kept as the raw JSON object so nothing the provider sent is lost on the way
/// to the principal. Accessors only read well-known keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderProfile(Map<String, Value>);

impl ProviderProfile {
    /// Provider-side account id. Numeric ids are rendered as strings.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Human-readable name; Spotify sends `display_name`, others `name`.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["display_name", "displayName", "name"]
            .iter()
            .find_map(|key| self.0.get(*key).and_then(Value::as_str))
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ProviderProfile {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for ProviderProfile {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::Protocol(format!(
                "profile must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The authenticated identity attached to a session.
///
/// Only a [`Verifier`](crate::verify::Verifier) hands these out to the route
/// layer; the fields are public so custom verifiers can build their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Internal user record this identity resolved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub profile: ProviderProfile,
}

impl Principal {
    /// Compare only the identity-bearing fields.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.id == other.id
            && self.display_name == other.display_name
            && self.user_id == other.user_id
    }
}
