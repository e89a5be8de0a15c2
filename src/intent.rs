//! Wire messages exchanged with the host
//!
//! Client -> host:
//! - `{"key": "<secret>"}` once, right after the socket opens
//! - `{"type": "<command type>", "data": {...params}}` for tile activations
//! - `{"type": "mouse_move" | "mouse_scroll" | "mouse_click", "data": {...}}`
//!
//! Host -> client: `{"type": "handshake_success"}` or `{"type": "auth_failed"}`.

use crate::tile::{CommandParams, MediaAction};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Trackpad button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

/// Pointer intents produced by the gesture engine and the click buttons
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PointerIntent {
    MouseMove { dx: f64, dy: f64 },
    MouseScroll { dy: f64 },
    MouseClick { button: MouseButton },
}

/// A fully formed outgoing command
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Pointer(PointerIntent),
    Tile(CommandParams),
}

impl Intent {
    /// Message type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Pointer(PointerIntent::MouseMove { .. }) => "mouse_move",
            Intent::Pointer(PointerIntent::MouseScroll { .. }) => "mouse_scroll",
            Intent::Pointer(PointerIntent::MouseClick { .. }) => "mouse_click",
            Intent::Tile(params) => params.command_type().as_str(),
        }
    }

    /// JSON text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<PointerIntent> for Intent {
    fn from(intent: PointerIntent) -> Self {
        Intent::Pointer(intent)
    }
}

impl Serialize for Intent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Intent::Pointer(pointer) => pointer.serialize(serializer),
            Intent::Tile(params) => {
                let mut message = serializer.serialize_struct("Intent", 2)?;
                message.serialize_field("type", params.command_type().as_str())?;
                message.serialize_field("data", &ParamsData::from(params))?;
                message.end()
            }
        }
    }
}

/// Borrowed view of a tile's params without the type tag
#[derive(Serialize)]
#[serde(untagged)]
enum ParamsData<'a> {
    Key { key: &'a str },
    Keys { keys: &'a [String] },
    Text { text: &'a str },
    Action { action: MediaAction },
    Url { url: &'a str },
    Command { command: &'a str },
    Script { script: &'a str },
}

impl<'a> From<&'a CommandParams> for ParamsData<'a> {
    fn from(params: &'a CommandParams) -> Self {
        match params {
            CommandParams::KeyPress { key } => ParamsData::Key { key },
            CommandParams::KeyCombo { keys } => ParamsData::Keys { keys },
            CommandParams::Text { text } => ParamsData::Text { text },
            CommandParams::MediaControl { action } => ParamsData::Action { action: *action },
            CommandParams::Website { url } => ParamsData::Url { url },
            CommandParams::Shell { command } => ParamsData::Command { command },
            CommandParams::Macro { script } => ParamsData::Script { script },
        }
    }
}

/// Authentication message, sent once per connection
#[derive(Serialize)]
pub struct AuthMessage<'a> {
    pub key: &'a str,
}

/// Messages the host sends back
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    HandshakeSuccess,
    AuthFailed {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl HostMessage {
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(intent: Intent) -> serde_json::Value {
        serde_json::from_str(&intent.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_pointer_messages() {
        assert_eq!(
            to_json(PointerIntent::MouseMove { dx: 5.0, dy: -3.0 }.into()),
            json!({ "type": "mouse_move", "data": { "dx": 5.0, "dy": -3.0 } })
        );
        assert_eq!(
            to_json(PointerIntent::MouseScroll { dy: 2.5 }.into()),
            json!({ "type": "mouse_scroll", "data": { "dy": 2.5 } })
        );
        assert_eq!(
            to_json(PointerIntent::MouseClick { button: MouseButton::Right }.into()),
            json!({ "type": "mouse_click", "data": { "button": "right" } })
        );
    }

    #[test]
    fn test_tile_messages() {
        assert_eq!(
            to_json(Intent::Tile(CommandParams::KeyCombo {
                keys: vec!["ctrl".into(), "alt".into(), "delete".into()],
            })),
            json!({ "type": "key_combo", "data": { "keys": ["ctrl", "alt", "delete"] } })
        );
        assert_eq!(
            to_json(Intent::Tile(CommandParams::MediaControl { action: MediaAction::VolumeUp })),
            json!({ "type": "media_control", "data": { "action": "volume_up" } })
        );
        assert_eq!(
            to_json(Intent::Tile(CommandParams::Macro { script: "WAIT 1".into() })),
            json!({ "type": "macro", "data": { "script": "WAIT 1" } })
        );
    }

    #[test]
    fn test_auth_message() {
        let text = serde_json::to_string(&AuthMessage { key: "s3cret" }).unwrap();
        assert_eq!(text, r#"{"key":"s3cret"}"#);
    }

    #[test]
    fn test_host_messages() {
        assert_eq!(
            HostMessage::decode(r#"{"type":"handshake_success"}"#).unwrap(),
            HostMessage::HandshakeSuccess
        );
        assert_eq!(
            HostMessage::decode(r#"{"type":"auth_failed","reason":"Invalid key"}"#).unwrap(),
            HostMessage::AuthFailed { reason: Some("Invalid key".into()) }
        );
        assert_eq!(
            HostMessage::decode(r#"{"type":"something_new"}"#).unwrap(),
            HostMessage::Unknown
        );
        assert!(HostMessage::decode("not json").is_err());
    }
}
