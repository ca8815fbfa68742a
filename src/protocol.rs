//! Wire types for the SCUM administration API.
//!
//! Field names follow the backend's camelCase JSON. Poll responses are decoded
//! leniently: missing or `null` fields fall back to empty values so that the
//! renderer always receives a complete shape.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

// ── Endpoints ───────────────────────────────────────────────────────

/// Login endpoint, relative to the API base URL.
pub const LOGIN_PATH: &str = "/auth/login";

/// Registration endpoint, relative to the API base URL.
pub const REGISTER_PATH: &str = "/auth/register";

/// Server status endpoint (bearer token required).
pub const STATUS_PATH: &str = "/status";

/// Vehicle inventory endpoint (bearer token required).
pub const VEHICLES_PATH: &str = "/vehicles";

// ── Identity ────────────────────────────────────────────────────────

/// Role attached to an operator account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular operator.
    #[default]
    User,
    /// Administrator.
    Admin,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role `{other}` (expected `user` or `admin`)")),
        }
    }
}

/// Identity of the authenticated operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub email: String,
    pub role: Role,
}

// ── Auth payloads ───────────────────────────────────────────────────

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Successful login/registration response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Error body returned by the backend on a non-success response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

// ── Status ──────────────────────────────────────────────────────────

/// A connected player as reported by `/status`.
///
/// The backend does not pin down the shape of player entries, so they are
/// carried as raw JSON.
pub type PlayerRef = serde_json::Value;

/// Snapshot of `/status`, replaced wholesale on every successful poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub connected_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin_connected_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<PlayerRef>,
}

// ── Vehicles ────────────────────────────────────────────────────────

/// Condition of a vehicle.
///
/// The backend reports either a fractional ratio in `[0, 1]` or a textual
/// label. Disambiguation happens here, once, during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VehicleState {
    /// Fractional condition, `0.0` (wrecked) to `1.0` (pristine).
    Ratio(f64),
    /// Free-form state label.
    Label(String),
}

/// World coordinates of a vehicle. Every axis is optional.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Location {
    /// The present axes, in x, y, z order.
    pub fn axes(&self) -> impl Iterator<Item = f64> {
        [self.x, self.y, self.z].into_iter().flatten()
    }
}

/// One entry of the vehicle inventory.
///
/// Text fields accept any JSON scalar. A `state` that is neither a number nor
/// a string decodes as no state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleRecord {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "scalar_as_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub owner: String,
    #[serde(
        default,
        deserialize_with = "state_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<VehicleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Body of `/vehicles`.
///
/// Records that cannot be decoded are skipped with a warning; the rest of the
/// list is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehiclesResponse {
    #[serde(default, deserialize_with = "skip_undecodable_records")]
    pub vehicles: Vec<VehicleRecord>,
}

/// Deserialize `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strings verbatim, numbers and booleans in their JSON text, `null` as empty.
fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!("expected a scalar, found {other}"))),
    }
}

fn state_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<VehicleState>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map(VehicleState::Ratio),
        Value::String(s) => Some(VehicleState::Label(s)),
        Value::Null => None,
        other => {
            warn!("ignoring vehicle state of unexpected shape: {other}");
            None
        }
    })
}

fn skip_undecodable_records<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<VehicleRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<VehicleRecord>(record) {
            Ok(vehicle) => Some(vehicle),
            Err(e) => {
                warn!("skipping undecodable vehicle record: {e}");
                None
            }
        })
        .collect())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_state_numeric_decodes_as_ratio() {
        let v: VehicleRecord =
            serde_json::from_str(r#"{"id":"v1","type":"car","owner":"p1","state":0.42}"#).unwrap();
        assert_eq!(v.state, Some(VehicleState::Ratio(0.42)));
        assert_eq!(v.kind, "car");
    }

    #[test]
    fn vehicle_state_integer_decodes_as_ratio() {
        let v: VehicleRecord = serde_json::from_str(r#"{"id":"v1","state":1}"#).unwrap();
        assert_eq!(v.state, Some(VehicleState::Ratio(1.0)));
    }

    #[test]
    fn vehicle_state_string_decodes_as_label() {
        let v: VehicleRecord = serde_json::from_str(r#"{"id":"v1","state":"destroyed"}"#).unwrap();
        assert_eq!(v.state, Some(VehicleState::Label("destroyed".into())));
    }

    #[test]
    fn vehicle_missing_fields_default_to_empty() {
        let v: VehicleRecord = serde_json::from_str(r#"{"id":"v9","owner":null}"#).unwrap();
        assert_eq!(v.id, "v9");
        assert_eq!(v.kind, "");
        assert_eq!(v.owner, "");
        assert!(v.state.is_none());
        assert!(v.location.is_none());
    }

    #[test]
    fn vehicle_scalar_fields_are_stringified() {
        let v: VehicleRecord =
            serde_json::from_str(r#"{"id":17,"type":"car","owner":76561198000000001}"#).unwrap();
        assert_eq!(v.id, "17");
        assert_eq!(v.owner, "76561198000000001");
    }

    #[test]
    fn vehicle_state_of_other_shape_is_none() {
        let v: VehicleRecord = serde_json::from_str(r#"{"id":"v1","state":true}"#).unwrap();
        assert!(v.state.is_none());
        let v: VehicleRecord = serde_json::from_str(r#"{"id":"v1","state":{"hp":3}}"#).unwrap();
        assert!(v.state.is_none());
    }

    #[test]
    fn vehicles_response_skips_undecodable_records() {
        let json = r#"{"vehicles":[
            {"id":"v1","state":0.5},
            {"id":["nested"]},
            {"id":"v3","location":"somewhere"},
            {"id":"v4","state":"parked"}
        ]}"#;
        let resp: VehiclesResponse = serde_json::from_str(json).unwrap();
        let ids: Vec<_> = resp.vehicles.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v4"]);
    }

    #[test]
    fn location_null_axes_are_absent() {
        let loc: Location = serde_json::from_str(r#"{"x":1,"y":null}"#).unwrap();
        assert_eq!(loc.axes().collect::<Vec<_>>(), vec![1.0]);
    }

    #[test]
    fn vehicles_response_missing_or_null_list_is_empty() {
        let empty: VehiclesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.vehicles.is_empty());
        let null: VehiclesResponse = serde_json::from_str(r#"{"vehicles":null}"#).unwrap();
        assert!(null.vehicles.is_empty());
    }

    #[test]
    fn status_missing_fields_default_to_zero() {
        let s: StatusSnapshot = serde_json::from_str(r#"{"connectedCount":3}"#).unwrap();
        assert_eq!(s.connected_count, 3);
        assert_eq!(s.admin_connected_count, 0);
        assert!(s.players.is_empty());
    }

    #[test]
    fn status_negative_count_is_rejected() {
        assert!(serde_json::from_str::<StatusSnapshot>(r#"{"connectedCount":-1}"#).is_err());
    }

    #[test]
    fn register_request_serializes_role_lowercase() {
        let body = serde_json::to_value(RegisterRequest {
            email: "a@b.com".into(),
            password: "x".into(),
            role: Role::Admin,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"email":"a@b.com","password":"x","role":"admin"})
        );
    }

    #[test]
    fn login_request_has_no_role() {
        let body = serde_json::to_value(LoginRequest {
            email: "a@b.com".into(),
            password: "x".into(),
        })
        .unwrap();
        assert!(body.get("role").is_none());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" user ".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_role_fails_auth_response_decode() {
        let json = r#"{"token":"T","user":{"email":"a@b.com","role":"superuser"}}"#;
        assert!(serde_json::from_str::<AuthResponse>(json).is_err());
    }
}
