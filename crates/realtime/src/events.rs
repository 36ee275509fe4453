//! Connection-level events from the Realtime manager.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    /// The socket opened (first connect or reconnect).
    Connected,

    /// The socket dropped. Channels are rejoined after reconnecting.
    Disconnected,

    /// The server acknowledged a channel join.
    ChannelJoined { topic: String },

    /// A join was refused or the channel crashed server-side.
    ChannelError { topic: String, message: String },
}
