//! Phoenix channel frames used by Supabase Realtime.
//!
//! Every frame is a JSON object
//! `{"topic": "...", "event": "...", "payload": {...}, "ref": "..."}`.
//! Outbound frames are built with [`join_message`], [`leave_message`] and
//! [`heartbeat_message`]; inbound text is classified by [`parse_message`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic of protocol-level frames (heartbeats).
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

// ---------------------------------------------------------------------------
// Raw frame
// ---------------------------------------------------------------------------

/// A Phoenix frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn to_text(&self) -> String {
        // A struct of strings and a `Value` always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Change filters
// ---------------------------------------------------------------------------

/// Row-level change kinds. `All` (`"*"`) is only meaningful in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "*")]
    All,
}

impl ChangeEvent {
    /// Whether a filter on `self` accepts a change of kind `actual`.
    pub fn accepts(self, actual: ChangeEvent) -> bool {
        self == ChangeEvent::All || self == actual
    }
}

/// One `postgres_changes` binding of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeFilter {
    pub event: ChangeEvent,
    pub schema: String,
    pub table: String,
    /// Server-side row filter in PostgREST syntax, e.g. `session_id=eq.S1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ChangeFilter {
    /// All changes on `public.<table>`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            event: ChangeEvent::All,
            schema: "public".to_string(),
            table: table.into(),
            filter: None,
        }
    }

    pub fn on(mut self, event: ChangeEvent) -> Self {
        self.event = event;
        self
    }

    /// Restrict to rows where `column = value`.
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{column}=eq.{value}"));
        self
    }

    /// Client-side check of a received change against this binding.
    ///
    /// The server already filters, but one channel carries several bindings,
    /// so each change is routed to the bindings it actually matches.
    pub fn matches(&self, change: &PostgresChange) -> bool {
        if self.schema != change.schema
            || self.table != change.table
            || !self.event.accepts(change.event_type)
        {
            return false;
        }

        let Some((column, expected)) = self.filter.as_deref().and_then(parse_eq_filter) else {
            return true;
        };

        let row = if change.event_type == ChangeEvent::Delete {
            &change.old_record
        } else {
            &change.record
        };
        match row.get(column) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == expected,
        }
    }
}

/// Split `column=eq.value` into `(column, value)`.
fn parse_eq_filter(filter: &str) -> Option<(&str, &str)> {
    let (column, rest) = filter.split_once('=')?;
    let value = rest.strip_prefix("eq.")?;
    Some((column, value))
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// The `data` object of a `postgres_changes` frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostgresChange {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type")]
    pub event_type: ChangeEvent,
    pub commit_timestamp: Option<String>,
    /// New row image (empty for deletes).
    #[serde(default)]
    pub record: Value,
    /// Previous row image (primary key only unless REPLICA IDENTITY FULL).
    #[serde(default)]
    pub old_record: Value,
}

#[derive(Debug, Deserialize)]
struct ChangesPayload {
    data: PostgresChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to a join, leave or heartbeat we sent.
    Reply {
        topic: String,
        msg_ref: Option<String>,
        status: ReplyStatus,
        response: Value,
    },
    /// A row changed.
    Change { topic: String, change: PostgresChange },
    /// Server status of a channel (e.g. postgres_changes subscription ready).
    System {
        topic: String,
        status: String,
        message: String,
    },
    /// The server closed the channel.
    Close { topic: String },
    /// The channel crashed on the server.
    ChannelError { topic: String },
    /// Presence, broadcast and anything else we do not act on.
    Other { topic: String, event: String },
}

/// Parse a text frame into an [`InboundMessage`].
///
/// Returns `Err` for malformed JSON or a `postgres_changes` payload that
/// does not have the expected shape.
pub fn parse_message(text: &str) -> Result<InboundMessage, serde_json::Error> {
    let raw: PhoenixMessage = serde_json::from_str(text)?;
    let topic = raw.topic;

    let message = match raw.event.as_str() {
        EVENT_REPLY => {
            let status = match raw.payload.get("status").and_then(Value::as_str) {
                Some("ok") => ReplyStatus::Ok,
                _ => ReplyStatus::Error,
            };
            InboundMessage::Reply {
                topic,
                msg_ref: raw.msg_ref,
                status,
                response: raw.payload.get("response").cloned().unwrap_or(Value::Null),
            }
        }
        EVENT_POSTGRES_CHANGES => {
            let payload: ChangesPayload = serde_json::from_value(raw.payload)?;
            InboundMessage::Change {
                topic,
                change: payload.data,
            }
        }
        EVENT_SYSTEM => InboundMessage::System {
            topic,
            status: string_field(&raw.payload, "status"),
            message: string_field(&raw.payload, "message"),
        },
        EVENT_CLOSE => InboundMessage::Close { topic },
        EVENT_ERROR => InboundMessage::ChannelError { topic },
        _ => InboundMessage::Other {
            topic,
            event: raw.event,
        },
    };
    Ok(message)
}

fn string_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Join `topic` with the given `postgres_changes` bindings.
pub fn join_message(
    topic: &str,
    join_ref: &str,
    filters: &[ChangeFilter],
    access_token: Option<&str>,
) -> PhoenixMessage {
    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": filters,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    PhoenixMessage {
        topic: topic.to_string(),
        event: EVENT_JOIN.to_string(),
        payload,
        msg_ref: Some(join_ref.to_string()),
        join_ref: Some(join_ref.to_string()),
    }
}

pub fn leave_message(topic: &str, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: EVENT_LEAVE.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

pub fn heartbeat_message(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: PHOENIX_TOPIC.to_string(),
        event: EVENT_HEARTBEAT.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}
