//! Bus Protocol Types
//!
//! Wire shape, keyed by a numeric `type` discriminant:
//!
//! ```text
//! Event:    { type:0, name, data?, channelId? }
//! Request:  { type:1, id, name, data?, channelId? }
//! Response: { type:2, id, status:0|1, content, channelId? }
//! ```
//!
//! Serde cannot tag by integer, so every message goes through the flat
//! `WireMessage` record and is validated on the way in.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

use crate::error::ProtocolError;

/// Request ID - unique per issuing bus while pending
pub type RequestId = String;

/// Message kind discriminant as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Event = 0,
    Action = 1,
    Response = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0,
    Error = 1,
}

/// Logical partition used to multiplex conversations over shared transports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    /// Any JSON number, integer or not
    Number(Number),
    Text(String),
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Number(n) => write!(f, "{}", n),
            ChannelId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ChannelId {
    fn from(n: i64) -> Self {
        ChannelId::Number(n.into())
    }
}

impl From<Number> for ChannelId {
    fn from(n: Number) -> Self {
        ChannelId::Number(n)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        ChannelId::Text(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        ChannelId::Text(s)
    }
}

/// Fire-and-forget notification
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub name: String,
    pub data: Option<Value>,
    pub channel_id: Option<ChannelId>,
}

/// Request expecting exactly one response with the same id
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub id: RequestId,
    pub name: String,
    pub data: Option<Value>,
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    pub id: RequestId,
    pub status: ResponseStatus,
    pub content: Value,
    pub channel_id: Option<ChannelId>,
}

/// Unified bus message (event, request or response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub enum Message {
    Event(EventMessage),
    Request(RequestMessage),
    Response(ResponseMessage),
}

impl Message {
    pub fn event(name: impl Into<String>, data: Option<Value>) -> Self {
        Message::Event(EventMessage {
            name: name.into(),
            data,
            channel_id: None,
        })
    }

    pub fn request(id: impl Into<RequestId>, name: impl Into<String>, data: Option<Value>) -> Self {
        Message::Request(RequestMessage {
            id: id.into(),
            name: name.into(),
            data,
            channel_id: None,
        })
    }

    pub fn success(id: impl Into<RequestId>, content: Value) -> Self {
        Self::response(id, ResponseStatus::Success, content)
    }

    pub fn failure(id: impl Into<RequestId>, reason: impl Into<String>) -> Self {
        Self::response(id, ResponseStatus::Error, Value::String(reason.into()))
    }

    fn response(id: impl Into<RequestId>, status: ResponseStatus, content: Value) -> Self {
        Message::Response(ResponseMessage {
            id: id.into(),
            status,
            content,
            channel_id: None,
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Event(_) => MessageType::Event,
            Message::Request(_) => MessageType::Action,
            Message::Response(_) => MessageType::Response,
        }
    }

    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Message::Event(m) => m.channel_id.as_ref(),
            Message::Request(m) => m.channel_id.as_ref(),
            Message::Response(m) => m.channel_id.as_ref(),
        }
    }

    /// Replace the channel tag (`None` clears it)
    pub fn with_channel_id(mut self, channel_id: Option<ChannelId>) -> Self {
        match &mut self {
            Message::Event(m) => m.channel_id = channel_id,
            Message::Request(m) => m.channel_id = channel_id,
            Message::Response(m) => m.channel_id = channel_id,
        }
        self
    }

    /// Validate an untrusted payload
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_value(value)?;
        Message::try_from(wire)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Flat on-the-wire record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    // Older peers spell it `chanelId`
    #[serde(
        rename = "channelId",
        alias = "chanelId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    channel_id: Option<ChannelId>,
}

impl TryFrom<WireMessage> for Message {
    type Error = ProtocolError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        match wire.kind {
            0 => Ok(Message::Event(EventMessage {
                name: wire.name.ok_or(ProtocolError::MissingField("name"))?,
                data: wire.data,
                channel_id: wire.channel_id,
            })),
            1 => Ok(Message::Request(RequestMessage {
                id: wire.id.ok_or(ProtocolError::MissingField("id"))?,
                name: wire.name.ok_or(ProtocolError::MissingField("name"))?,
                data: wire.data,
                channel_id: wire.channel_id,
            })),
            2 => {
                let id = wire.id.ok_or(ProtocolError::MissingField("id"))?;
                // Anything but an exact 0 counts as a failure
                let status = match wire.status.ok_or(ProtocolError::MissingField("status"))? {
                    n if n.as_u64() == Some(0) => ResponseStatus::Success,
                    _ => ResponseStatus::Error,
                };
                Ok(Message::Response(ResponseMessage {
                    id,
                    status,
                    content: wire.content.unwrap_or(Value::Null),
                    channel_id: wire.channel_id,
                }))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Event(m) => WireMessage {
                kind: MessageType::Event as u64,
                name: Some(m.name),
                data: m.data,
                channel_id: m.channel_id,
                ..Default::default()
            },
            Message::Request(m) => WireMessage {
                kind: MessageType::Action as u64,
                id: Some(m.id),
                name: Some(m.name),
                data: m.data,
                channel_id: m.channel_id,
                ..Default::default()
            },
            Message::Response(m) => WireMessage {
                kind: MessageType::Response as u64,
                id: Some(m.id),
                status: Some(Number::from(m.status as u8)),
                content: Some(m.content),
                channel_id: m.channel_id,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let message = Message::event("ping", Some(json!({ "n": 1 })))
            .with_channel_id(Some(ChannelId::from("main")));

        assert_eq!(
            message.to_value().unwrap(),
            json!({ "type": 0, "name": "ping", "data": { "n": 1 }, "channelId": "main" })
        );
    }

    #[test]
    fn test_response_wire_shape_keeps_null_content() {
        let message = Message::success("bus-1-0-action-1-1", Value::Null);

        assert_eq!(
            message.to_value().unwrap(),
            json!({ "type": 2, "id": "bus-1-0-action-1-1", "status": 0, "content": null })
        );
    }

    #[test]
    fn test_parse_request() {
        let message =
            Message::from_value(json!({ "type": 1, "id": "a-1", "name": "echo", "data": 5 }))
                .unwrap();

        assert_eq!(message, Message::request("a-1", "echo", Some(json!(5))));
        assert_eq!(message.message_type(), MessageType::Action);
    }

    #[test]
    fn test_parse_legacy_channel_field() {
        let message =
            Message::from_value(json!({ "type": 0, "name": "test", "chanelId": 2 })).unwrap();

        assert_eq!(message.channel_id(), Some(&ChannelId::from(2)));
    }

    #[test]
    fn test_parse_float_channel_id() {
        let message =
            Message::from_value(json!({ "type": 0, "name": "test", "channelId": 1.5 })).unwrap();

        assert_eq!(message.channel_id().map(ToString::to_string).as_deref(), Some("1.5"));
        assert_ne!(message.channel_id(), Some(&ChannelId::from(1)));
    }

    #[test]
    fn test_unknown_numeric_status_is_an_error() {
        for status in [json!(5), json!(-1), json!(1.5)] {
            let message = Message::from_value(
                json!({ "type": 2, "id": "x", "status": status, "content": "bad" }),
            )
            .unwrap();

            assert!(matches!(
                message,
                Message::Response(ResponseMessage { status: ResponseStatus::Error, .. })
            ));
        }
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let cases = [
            json!(null),
            json!("text"),
            json!({ "name": "no type" }),
            json!({ "type": "0", "name": "string type" }),
            json!({ "type": 7, "name": "unknown" }),
            json!({ "type": 0 }),
            json!({ "type": 0, "name": 12 }),
            json!({ "type": 1, "name": "missing id" }),
            json!({ "type": 1, "id": 3, "name": "numeric id" }),
            json!({ "type": 2, "id": "x" }),
            json!({ "type": 2, "id": "x", "status": "0" }),
        ];

        for case in cases {
            assert!(Message::from_value(case.clone()).is_err(), "accepted {}", case);
        }
    }

    #[test]
    fn test_missing_field_is_reported() {
        let err = Message::from_value(json!({ "type": 1, "id": "x" })).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("name")));
    }

    #[test]
    fn test_channel_id_display() {
        assert_eq!(ChannelId::from(7).to_string(), "7");
        assert_eq!(ChannelId::from("main").to_string(), "main");
    }
}
