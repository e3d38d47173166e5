//! The identity returned by login and `/auth/me/`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Current user. `id` and `email` are surfaced; everything else the backend
/// sends (role, permissions, names) is kept unexamined in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The backend sends numeric primary keys; some deployments use UUIDs.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}
