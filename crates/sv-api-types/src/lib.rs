use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Backend ids arrive as numbers or strings (numeric or UUID); kept as sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl PartialEq<u64> for UserId {
    fn eq(&self, other: &u64) -> bool {
        match self {
            Self::Number(n) => n == other,
            Self::Text(s) => s.trim().parse::<u64>().is_ok_and(|n| n == *other),
        }
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub email_verified_at: Option<String>,
    /// Fields the dashboard does not interpret (balances, avatar, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Light,
    Dark,
    System,
}

impl ColorMode {
    /// Parse an untrusted mode value; anything unrecognised is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" | "auto" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyPosition {
    #[default]
    Before,
    After,
}

impl CurrencyPosition {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "before" | "prefix" => Some(Self::Before),
            "after" | "suffix" => Some(Self::After),
            _ => None,
        }
    }
}

/// `data` object of `GET /v1/settings/public`. Every field is optional and
/// blank or wrongly-typed values read as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PublicSettings {
    #[serde(default, deserialize_with = "lenient_string")]
    pub platform_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub platform_tagline: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub primary_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub success_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub warning_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub danger_color: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub border_radius: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency_position: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub theme_mode: Option<String>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<PublicSettings>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SettingsResponse {
    pub fn into_settings(self) -> Result<PublicSettings, ApiError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Ok(PublicSettings::default()),
            (false, _) => Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "settings request rejected".to_owned()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

// ── Native bridge messages ──

/// Wire shape shared by both directions: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("message has no string `type` field")]
    MissingType,
    #[error("payload for {kind} does not match its shape: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("SET_TOKEN carried an empty token")]
    EmptyToken,
}

impl NativeMessage {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.filter(|p| !p.is_null()),
        }
    }

    /// Accept a decoded JSON value; anything without a string `type` is rejected.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut object) = value else {
            return Err(MessageError::MissingType);
        };
        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(MessageError::MissingType),
        };
        Ok(Self::new(kind, object.remove("payload")))
    }

    pub fn parse_str(raw: &str) -> Result<Self, MessageError> {
        let value = serde_json::from_str(raw).map_err(MessageError::Malformed)?;
        Self::from_value(value)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    NetworkStatus {
        online: bool,
    },
    Navigation {
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    AuthStateChange {
        is_authenticated: bool,
        user: Option<User>,
    },
    ShowLoading {
        show: bool,
    },
    ShowAlert {
        title: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentSuccess {
        reference: String,
        new_balance: Option<f64>,
    },
    PaymentFailed {
        reference: String,
        message: String,
    },
    PaymentError {
        message: String,
    },
}

impl OutboundMessage {
    pub fn to_native(&self) -> Result<NativeMessage, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SetTokenPayload {
    token: String,
    #[serde(default, deserialize_with = "lenient_user")]
    user: Option<User>,
}

/// A user record the page cannot read must not cost the token handoff.
fn lenient_user<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<User>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Clone, Deserialize)]
struct NavigatePayload {
    path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SetToken { token: String, user: Option<User> },
    Logout,
    Navigate { path: String },
    Refresh,
    /// Forward-compatible fallback for tags this build does not know.
    Other { kind: String, payload: Option<Value> },
}

impl InboundMessage {
    pub fn kind(&self) -> &str {
        match self {
            Self::SetToken { .. } => "SET_TOKEN",
            Self::Logout => "LOGOUT",
            Self::Navigate { .. } => "NAVIGATE",
            Self::Refresh => "REFRESH",
            Self::Other { kind, .. } => kind,
        }
    }
}

impl TryFrom<NativeMessage> for InboundMessage {
    type Error = MessageError;

    fn try_from(message: NativeMessage) -> Result<Self, Self::Error> {
        let NativeMessage { kind, payload } = message;
        match kind.as_str() {
            "SET_TOKEN" => {
                let body: SetTokenPayload = typed_payload(&kind, payload)?;
                if body.token.trim().is_empty() {
                    return Err(MessageError::EmptyToken);
                }
                Ok(Self::SetToken {
                    token: body.token.trim().to_owned(),
                    user: body.user,
                })
            }
            "LOGOUT" => Ok(Self::Logout),
            "NAVIGATE" => {
                let body: NavigatePayload = typed_payload(&kind, payload)?;
                Ok(Self::Navigate { path: body.path })
            }
            "REFRESH" => Ok(Self::Refresh),
            _ => Ok(Self::Other { kind, payload }),
        }
    }
}

fn typed_payload<T: for<'de> Deserialize<'de>>(
    kind: &str,
    payload: Option<Value>,
) -> Result<T, MessageError> {
    serde_json::from_value(payload.unwrap_or(Value::Null)).map_err(|source| {
        MessageError::InvalidPayload {
            kind: kind.to_owned(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_messages_use_type_and_camel_case_payload() {
        let message = OutboundMessage::AuthStateChange {
            is_authenticated: true,
            user: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"type": "AUTH_STATE_CHANGE", "payload": {"isAuthenticated": true, "user": null}})
        );

        let native = OutboundMessage::PaymentSuccess {
            reference: "ref-1".into(),
            new_balance: Some(2500.0),
        }
        .to_native()
        .unwrap();
        assert_eq!(native.kind, "PAYMENT_SUCCESS");
        assert_eq!(native.payload, Some(json!({"reference": "ref-1", "newBalance": 2500.0})));
    }

    #[test]
    fn inbound_set_token_with_and_without_user() {
        let native = NativeMessage::parse_str(r#"{"type":"SET_TOKEN","payload":{"token":"abc"}}"#).unwrap();
        let message = InboundMessage::try_from(native).unwrap();
        assert_eq!(
            message,
            InboundMessage::SetToken {
                token: "abc".into(),
                user: None
            }
        );

        let native = NativeMessage::from_value(json!({
            "type": "SET_TOKEN",
            "payload": {"token": "t", "user": {"id": "7", "email": "a@b.c", "role": "admin", "wallet": 10}}
        }))
        .unwrap();
        let InboundMessage::SetToken { user: Some(user), .. } = InboundMessage::try_from(native).unwrap() else {
            panic!("expected SET_TOKEN with user");
        };
        assert_eq!(user.id, 7);
        assert_eq!(user.role, "admin");
        assert_eq!(user.extra.get("wallet"), Some(&json!(10)));
    }

    #[test]
    fn set_token_survives_unreadable_user() {
        let native = NativeMessage::from_value(json!({
            "type": "SET_TOKEN",
            "payload": {"token": "abc", "user": {"email": "a@b.c"}}
        }))
        .unwrap();
        assert_eq!(
            InboundMessage::try_from(native).unwrap(),
            InboundMessage::SetToken {
                token: "abc".into(),
                user: None
            }
        );

        let native = NativeMessage::from_value(json!({
            "type": "SET_TOKEN",
            "payload": {"token": "abc", "user": {"id": "9b2f-uuid", "email": "a@b.c"}}
        }))
        .unwrap();
        let InboundMessage::SetToken { user: Some(user), .. } = InboundMessage::try_from(native).unwrap() else {
            panic!("expected SET_TOKEN with user");
        };
        assert_eq!(user.id, UserId::from("9b2f-uuid"));
    }

    #[test]
    fn user_id_keeps_its_wire_shape() {
        let numeric: User = serde_json::from_value(json!({"id": 12})).unwrap();
        assert_eq!(serde_json::to_value(&numeric).unwrap()["id"], json!(12));

        let uuid: User = serde_json::from_value(json!({"id": "0c9d-44"})).unwrap();
        assert_eq!(uuid.id.to_string(), "0c9d-44");
        assert_eq!(serde_json::to_value(&uuid).unwrap()["id"], json!("0c9d-44"));
    }

    #[test]
    fn inbound_rejects_bad_shapes() {
        assert!(matches!(NativeMessage::parse_str("not-json"), Err(MessageError::Malformed(_))));
        assert!(matches!(NativeMessage::parse_str(r#"{"type":5}"#), Err(MessageError::MissingType)));
        assert!(matches!(NativeMessage::parse_str("[1,2]"), Err(MessageError::MissingType)));

        let native = NativeMessage::parse_str(r#"{"type":"NAVIGATE","payload":{"to":"/x"}}"#).unwrap();
        assert!(matches!(
            InboundMessage::try_from(native),
            Err(MessageError::InvalidPayload { .. })
        ));

        let native = NativeMessage::parse_str(r#"{"type":"SET_TOKEN","payload":{"token":"  "}}"#).unwrap();
        assert!(matches!(InboundMessage::try_from(native), Err(MessageError::EmptyToken)));
    }

    #[test]
    fn unknown_tags_pass_through() {
        let native = NativeMessage::parse_str(r#"{"type":"THEME_CHANGED","payload":{"dark":true}}"#).unwrap();
        let message = InboundMessage::try_from(native).unwrap();
        assert_eq!(message.kind(), "THEME_CHANGED");
        assert_eq!(
            message,
            InboundMessage::Other {
                kind: "THEME_CHANGED".into(),
                payload: Some(json!({"dark": true}))
            }
        );
    }

    #[test]
    fn public_settings_tolerate_partial_and_mistyped_fields() {
        let response: SettingsResponse = serde_json::from_value(json!({
            "success": true,
            "data": {
                "platform_name": "Acme",
                "primary_color": "",
                "border_radius": 8,
                "theme_mode": null,
                "currency_symbol": ["$"],
                "unrelated": "ignored"
            }
        }))
        .unwrap();
        let settings = response.into_settings().unwrap();
        assert_eq!(settings.platform_name.as_deref(), Some("Acme"));
        assert_eq!(settings.primary_color, None);
        assert_eq!(settings.border_radius.as_deref(), Some("8"));
        assert_eq!(settings.theme_mode, None);
        assert_eq!(settings.currency_symbol, None);
    }

    #[test]
    fn unsuccessful_settings_response_is_rejected() {
        let response = SettingsResponse {
            success: false,
            data: None,
            message: Some("maintenance".into()),
        };
        assert_eq!(
            response.into_settings(),
            Err(ApiError::Rejected("maintenance".into()))
        );
    }

    #[test]
    fn mode_and_position_parse_leniently() {
        assert_eq!(ColorMode::parse(" Dark "), Some(ColorMode::Dark));
        assert_eq!(ColorMode::parse("auto"), Some(ColorMode::System));
        assert_eq!(ColorMode::parse("sepia"), None);
        assert_eq!(CurrencyPosition::parse("after"), Some(CurrencyPosition::After));
        assert_eq!(CurrencyPosition::parse("left"), None);
    }
}
