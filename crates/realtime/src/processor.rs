//! Routing of inbound Realtime frames.
//!
//! [`handle_text`] classifies one text frame, forwards row changes to the
//! subscriptions whose bindings match, publishes [`RealtimeEvent`]s, and
//! tells the connection loop when it has to act (heartbeat replies and
//! channels that need a rejoin).

use crate::events::RealtimeEvent;
use crate::manager::Shared;
use crate::messages::{parse_message, InboundMessage, ReplyStatus, PHOENIX_TOPIC};

/// Follow-up work for the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// The server answered the heartbeat with this ref.
    HeartbeatAck(String),
    /// The channel died server-side but is still subscribed locally.
    Rejoin(String),
}

pub(crate) fn handle_text(text: &str, shared: &Shared) -> Option<Control> {
    let message = match parse_message(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse Realtime frame");
            return None;
        }
    };

    match message {
        InboundMessage::Reply {
            topic, msg_ref, ..
        } if topic == PHOENIX_TOPIC => msg_ref.map(Control::HeartbeatAck),

        InboundMessage::Reply {
            topic,
            msg_ref,
            status,
            response,
        } => {
            if !shared.is_join_ref(&topic, msg_ref.as_deref()) {
                // Replies to leaves and to superseded joins.
                return None;
            }
            match status {
                ReplyStatus::Ok => {
                    tracing::info!(topic = %topic, "Realtime channel joined");
                    shared.emit(RealtimeEvent::ChannelJoined { topic });
                }
                ReplyStatus::Error => {
                    let message = response
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .unwrap_or("join refused")
                        .to_string();
                    tracing::error!(topic = %topic, reason = %message, "Realtime join rejected");
                    shared.emit(RealtimeEvent::ChannelError { topic, message });
                }
            }
            None
        }

        InboundMessage::Change { topic, change } => {
            shared.dispatch(&topic, change);
            None
        }

        InboundMessage::System {
            topic,
            status,
            message,
        } => {
            if status == "ok" {
                tracing::debug!(topic = %topic, message = %message, "Realtime system message");
            } else {
                tracing::warn!(topic = %topic, status = %status, message = %message, "Realtime system error");
                shared.emit(RealtimeEvent::ChannelError { topic, message });
            }
            None
        }

        InboundMessage::Close { topic } | InboundMessage::ChannelError { topic } => {
            if !shared.is_subscribed(&topic) {
                return None;
            }
            tracing::warn!(topic = %topic, "Realtime channel closed by server, rejoining");
            shared.emit(RealtimeEvent::ChannelError {
                topic: topic.clone(),
                message: "channel closed by server".to_string(),
            });
            Some(Control::Rejoin(topic))
        }

        InboundMessage::Other { topic, event } => {
            tracing::trace!(topic = %topic, event = %event, "Ignoring Realtime frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::messages::ChangeFilter;

    fn change_frame(topic: &str, session_id: &str) -> String {
        json!({
            "topic": topic,
            "event": "postgres_changes",
            "payload": {"data": {
                "schema": "public",
                "table": "design_variations",
                "type": "INSERT",
                "commit_timestamp": null,
                "record": {"id": "v-9", "session_id": session_id},
                "old_record": {}
            }},
            "ref": null
        })
        .to_string()
    }

    #[test]
    fn change_is_forwarded_to_matching_subscription() {
        let (shared, _outbound) = Shared::for_tests();
        let (topic, mut rx) = shared.register(
            "design-session",
            vec![ChangeFilter::table("design_variations").eq("session_id", "S1")],
        );

        assert!(handle_text(&change_frame(&topic, "S1"), &shared).is_none());
        assert!(handle_text(&change_frame(&topic, "S2"), &shared).is_none());

        let received = rx.try_recv().unwrap();
        assert_eq!(received.record["id"], "v-9");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn change_for_unknown_topic_is_dropped() {
        let (shared, _outbound) = Shared::for_tests();
        let (_topic, mut rx) = shared.register("a", vec![ChangeFilter::table("design_variations")]);
        handle_text(&change_frame("realtime:other:99", "S1"), &shared);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn heartbeat_reply_is_acknowledged() {
        let (shared, _outbound) = Shared::for_tests();
        let text = r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"12"}"#;
        assert_eq!(
            handle_text(text, &shared),
            Some(Control::HeartbeatAck("12".to_string()))
        );
    }

    #[test]
    fn join_reply_emits_joined_event() {
        let (shared, _outbound) = Shared::for_tests();
        let mut events = shared.subscribe_events();
        let (topic, _rx) = shared.register("a", vec![ChangeFilter::table("t")]);
        let join_ref = shared.join_ref(&topic).unwrap();

        let text = json!({
            "topic": topic, "event": "phx_reply",
            "payload": {"status": "ok", "response": {}}, "ref": join_ref
        })
        .to_string();
        handle_text(&text, &shared);

        assert_matches!(events.try_recv().unwrap(), RealtimeEvent::ChannelJoined { topic: t } if t == topic);
    }

    #[test]
    fn rejected_join_emits_error_event() {
        let (shared, _outbound) = Shared::for_tests();
        let mut events = shared.subscribe_events();
        let (topic, _rx) = shared.register("a", vec![ChangeFilter::table("t")]);
        let join_ref = shared.join_ref(&topic).unwrap();

        let text = json!({
            "topic": topic, "event": "phx_reply",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}}, "ref": join_ref
        })
        .to_string();
        handle_text(&text, &shared);

        assert_matches!(
            events.try_recv().unwrap(),
            RealtimeEvent::ChannelError { message, .. } if message == "unauthorized"
        );
    }

    #[test]
    fn server_side_error_requests_rejoin_only_while_subscribed() {
        let (shared, _outbound) = Shared::for_tests();
        let (topic, _rx) = shared.register("a", vec![ChangeFilter::table("t")]);
        let text = json!({"topic": topic, "event": "phx_error", "payload": {}, "ref": null}).to_string();

        assert_eq!(handle_text(&text, &shared), Some(Control::Rejoin(topic.clone())));

        shared.unregister(&topic);
        assert_eq!(handle_text(&text, &shared), None);
    }

    #[test]
    fn garbage_is_ignored() {
        let (shared, _outbound) = Shared::for_tests();
        assert!(handle_text("{{{", &shared).is_none());
    }
}
