//! Inbound `message` stanza parsing: chat bodies, media payloads and the
//! delivery receipts that ride inside message stanzas.

use super::Session;
use crate::binary::Node;
use crate::codec::WireCodec;
use crate::counters::CounterKind;
use crate::error::Result;
use crate::types::events::GroupError;
use crate::types::message::{Key, MediaKind, Message, MessageKind, MessageStatus};
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;

enum Outcome {
    None,
    Received,
    StatusUpdate,
}

impl<C: WireCodec> Session<C> {
    pub(crate) fn handle_message(&mut self, node: &Node) -> Result<()> {
        let id = node.attr_or_empty("id").to_string();
        let timestamp_attr = node.attr_or_empty("t").to_string();
        let author = node.attr_or_empty("participant").to_string();
        let mut from = node.attr_or_empty("from").to_string();
        let broadcast = from.contains("@broadcast");
        if broadcast {
            // Broadcast stanzas carry the sender in `participant`.
            from = author.clone();
        }
        let mut parser = node.attr_parser();
        let offline = parser.flag("offline");

        match node.attr_or_empty("type") {
            "text" | "media" => {
                self.parse_chat_message(
                    node, &id, &timestamp_attr, &from, &author, broadcast, offline,
                )?;
            }
            "error" => {
                if from.ends_with("@g.us") {
                    let _ = self
                        .events
                        .group_error
                        .send(Arc::new(GroupError { gjid: from }));
                }
            }
            _ => {}
        }

        self.counters
            .add(CounterKind::ProtocolBytes, node.size() as u64, 0);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_chat_message(
        &mut self,
        node: &Node,
        id: &str,
        timestamp_attr: &str,
        from: &str,
        author: &str,
        broadcast: bool,
        offline: bool,
    ) -> Result<()> {
        let mut message = Message::default();
        // Live traffic is stamped on arrival; backlog keeps the server time.
        message.timestamp = if offline {
            timestamp_attr.parse().unwrap_or(0)
        } else {
            Utc::now().timestamp()
        };
        let mut outcome = Outcome::None;

        for child in &node.children {
            match child.tag.as_str() {
                "body" => {
                    message.key = Key::new(from, false, id);
                    message.data = child.payload_bytes().to_vec();
                    message.remote_resource = author.to_string();
                    message.thumb_image = String::new();
                    message.kind = MessageKind::Text;
                    message.notify_name = node.attr_or_empty("notify").to_string();
                    outcome = Outcome::Received;
                    self.send_message_received(&message, "")?;
                }
                "media" => {
                    message.key = Key::new(from, false, id);
                    message.remote_resource = author.to_string();
                    message.kind = MessageKind::Media;
                    message.set_media_kind_from_wire(child.attr_or_empty("type"));
                    self.parse_media_child(&mut message, child);
                    outcome = Outcome::Received;
                    self.send_message_received(&message, "")?;
                }
                "received" => {
                    let receipt_type = child.attr_or_empty("type").to_string();
                    let key = Key::new(from, true, id);
                    if let Some(mut pending) = self.store.get(&key) {
                        pending.status = if receipt_type == "played" {
                            MessageStatus::Played
                        } else {
                            MessageStatus::ReceivedByTarget
                        };
                        outcome = if from == "s.us" {
                            Outcome::None
                        } else {
                            Outcome::StatusUpdate
                        };
                        // Voice notes stay pending until actually played.
                        if (pending.live && receipt_type == "played") || !pending.live {
                            self.store.remove(&key);
                        }
                        message = pending;
                    }
                    if matches!(receipt_type.as_str(), "delivered" | "played" | "") {
                        let ack_type = if receipt_type.is_empty() {
                            "delivered".to_string()
                        } else {
                            receipt_type
                        };
                        self.send_delivered_receipt_ack(from, id, &ack_type)?;
                    }
                }
                _ => {}
            }
        }

        message.broadcast = broadcast;
        message.offline = offline;

        match outcome {
            Outcome::Received => {
                self.counters.add(CounterKind::MessageCount, 1, 0);
                self.counters
                    .add(CounterKind::MessageBytes, node.size() as u64, 0);
                let _ = self.events.message_received.send(Arc::new(message));
            }
            Outcome::StatusUpdate => {
                self.emit_status_update(&message.key.remote_jid, &message.key.id, message.status);
            }
            Outcome::None => {}
        }
        Ok(())
    }

    /// Fill in the media fields from a `media` child. Contact cards carry a
    /// nested vcard; everything else is attribute-driven with the thumbnail
    /// or preview bytes in the payload.
    fn parse_media_child(&self, message: &mut Message, child: &Node) {
        if message.media_kind == MediaKind::Contact {
            for card in child.children_by_tag("vcard") {
                message.media_name = card.attr_or_empty("name").to_string();
                message.data = card.payload_bytes().to_vec();
            }
            return;
        }

        message.media_url = child.attr_or_empty("url").to_string();
        if message.media_kind == MediaKind::Location {
            message.media_name = child.attr_or_empty("name").to_string();
            let mut parser = child.attr_parser();
            message.latitude = parser.optional_f64("latitude").unwrap_or(0.0);
            message.longitude = parser.optional_f64("longitude").unwrap_or(0.0);
        } else {
            message.media_name = child.attr_or_empty("file").to_string();
        }

        let mut parser = child.attr_parser();
        message.media_size = parser.optional_u64("size").unwrap_or(0);
        message.media_mime_type = child.attr_or_empty("mimetype").to_string();
        if matches!(message.media_kind, MediaKind::Video | MediaKind::Audio) {
            message.media_duration_seconds = parser.optional_u64("duration").unwrap_or(0) as u32;
        }
        if matches!(message.media_kind, MediaKind::Image | MediaKind::Video) {
            message.media_width = parser.optional_u64("width").unwrap_or(0) as u32;
            message.media_height = parser.optional_u64("height").unwrap_or(0) as u32;
        }
        message.live = child.attr_or_empty("origin") == "live";

        if child.attr_or_empty("encoding") == "raw" {
            // Raw previews are re-encoded so downstream consumers always see
            // printable data.
            message.data = base64::engine::general_purpose::STANDARD
                .encode(child.payload_bytes())
                .into_bytes();
        } else {
            message.data = child.payload_bytes().to_vec();
        }
    }
}
