//! Outgoing stanza builders.
//!
//! Every builder assembles its tree with [`NodeBuilder`], writes it through
//! the codec and bills the bytes to the right counter bucket. Correlated
//! requests carry a prefixed id from [`Session::make_id`] so the reply
//! dispatcher can recognize them.

use super::Session;
use crate::binary::{Node, NodeBuilder};
use crate::codec::WireCodec;
use crate::counters::CounterKind;
use crate::error::Result;
use crate::types::message::{MediaKind, Message, MessageKind};
use chrono::Utc;
use log::debug;

/// Undo the HTML-ish escaping UI layers apply to message text. The entity
/// replacements must run after the line break substitution, with `&amp;`
/// last so it cannot re-trigger the others.
pub(crate) fn unescape_text(text: &str) -> String {
    text.replace("<br />", "\n")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl<C: WireCodec> Session<C> {
    /// Write one stanza, bill it, and funnel transport failures into
    /// teardown so callers observe the usual disconnect sequence.
    fn write_counted(&mut self, node: &Node, kind: CounterKind) -> Result<usize> {
        match self.codec.write(node, true) {
            Ok(bytes) => {
                self.counters.add(kind, 0, bytes as u64);
                Ok(bytes)
            }
            Err(e) => {
                self.teardown();
                Err(e.into())
            }
        }
    }

    /// Wrap a message child in the full `message` stanza: optional broadcast
    /// recipient list, the payload child, then the jabber:x:event marker.
    fn message_node(&self, message: &Message, child: Node) -> Node {
        let x_node = NodeBuilder::new("x")
            .attr("xmlns", "jabber:x:event")
            .child(Node::new("server"))
            .build();

        let mut builder = NodeBuilder::new("message")
            .attr("id", &message.key.id)
            .attr("type", if child.tag == "body" { "text" } else { "media" })
            .attr("to", &message.key.remote_jid);

        if message.key.remote_jid == "broadcast" {
            let recipients = NodeBuilder::new("broadcast")
                .children(message.broadcast_jids.iter().map(|jid| {
                    NodeBuilder::new("to").attr("jid", jid).build()
                }))
                .build();
            builder = builder.child(recipients);
        }
        builder.child(child).child(x_node).build()
    }

    /// Dispatch on the message kind. Media sends must be preceded by an
    /// accepted upload request carrying the same key.
    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        match message.kind {
            MessageKind::Text => self.send_message_with_body(message),
            MessageKind::Media => self.send_message_with_media(message),
            MessageKind::MediaRequest => self.request_message_with_media(message),
        }
    }

    fn send_message_with_body(&mut self, message: &Message) -> Result<()> {
        let text = unescape_text(&message.data_string());
        // Pending until the receipt chain resolves it.
        self.store.put(message.clone());

        let body = Node::with_payload("body", text.into_bytes());
        let node = self.message_node(message, body);
        match self.codec.write(&node, true) {
            Ok(bytes) => {
                self.counters.add(CounterKind::MessageCount, 0, 1);
                self.counters
                    .add(CounterKind::MessageBytes, 0, bytes as u64);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e.into())
            }
        }
    }

    /// Ask for an upload slot. The iq id is the message id itself, which is
    /// how the `media`/`duplicate` reply finds the pending message again.
    fn request_message_with_media(&mut self, message: &Message) -> Result<()> {
        debug!(
            target: "Session/Send",
            "Requesting media upload for {}:{}",
            message.key.remote_jid, message.key.id
        );
        self.store.put(message.clone());

        let media = NodeBuilder::new("media")
            .attr("hash", message.data_string())
            .attr("type", message.media_kind.as_wire())
            .attr("size", message.media_size.to_string())
            .attr_non_empty("origin", if message.live { "live" } else { "" })
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", &message.key.id)
            .attr("type", "set")
            .attr("to", &self.config.domain)
            .attr("xmlns", "w:m")
            .child(media)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    fn send_message_with_media(&mut self, message: &Message) -> Result<()> {
        self.store.put(message.clone());

        let media = if message.media_kind == MediaKind::Contact && !message.media_name.is_empty() {
            let card = NodeBuilder::new("vcard")
                .attr("name", &message.media_name)
                .payload(message.data.clone())
                .build();
            NodeBuilder::new("media")
                .attr("type", message.media_kind.as_wire())
                .child(card)
                .build()
        } else if message.media_kind == MediaKind::Location
            && message.latitude != 0.0
            && message.longitude != 0.0
        {
            NodeBuilder::new("media")
                .attr("type", message.media_kind.as_wire())
                .attr("latitude", message.latitude.to_string())
                .attr("longitude", message.longitude.to_string())
                .payload(message.data.clone())
                .build()
        } else if !message.media_name.is_empty()
            && !message.media_url.is_empty()
            && message.media_size > 0
        {
            let mut builder = NodeBuilder::new("media")
                .attr("type", message.media_kind.as_wire())
                .attr("file", &message.media_name)
                .attr("size", message.media_size.to_string())
                .attr("url", &message.media_url)
                .attr_non_empty("origin", if message.live { "live" } else { "" });
            if matches!(message.media_kind, MediaKind::Audio | MediaKind::Video) {
                let duration = message.media_duration_seconds.to_string();
                builder = builder
                    .attr("duration", &duration)
                    .attr("seconds", &duration);
            }
            if !message.data.is_empty() {
                builder = builder.attr("encoding", "raw");
            }
            builder.payload(message.data.clone()).build()
        } else {
            // Nothing sendable in this shape.
            return Ok(());
        };

        let node = self.message_node(message, media);
        match self.codec.write(&node, true) {
            Ok(bytes) => {
                self.counters.add(CounterKind::MessageCount, 0, 1);
                self.counters
                    .add(CounterKind::MessageBytes, 0, bytes as u64);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e.into())
            }
        }
    }

    /// Acknowledge an inbound chat message with a `receipt` stanza.
    pub(crate) fn send_message_received(
        &mut self,
        message: &Message,
        receipt_type: &str,
    ) -> Result<()> {
        let resource = if message.broadcast {
            &message.remote_resource
        } else {
            &message.key.remote_jid
        };
        let node = NodeBuilder::new("receipt")
            .attr("to", resource)
            .attr("id", &message.key.id)
            .attr_non_empty("type", receipt_type)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Acknowledge a server notification. The notification's `from` becomes
    /// the ack's `to` and vice versa; `extra` is an optional embedded child
    /// (the contacts ack carries its resync trigger this way).
    pub(crate) fn send_notification_ack(
        &mut self,
        to: &str,
        id: &str,
        from: &str,
        participant: &str,
        notification_type: &str,
        extra: Option<Node>,
    ) -> Result<()> {
        let mut builder = NodeBuilder::new("ack")
            .attr("to", to)
            .attr("class", "notification")
            .attr("id", id)
            .attr("type", notification_type)
            .attr_non_empty("participant", participant)
            .attr_non_empty("from", from);
        if let Some(child) = extra {
            builder = builder.child(child);
        }
        let node = builder.build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Acknowledge a delivery receipt embedded in a `message` stanza.
    pub(crate) fn send_delivered_receipt_ack(
        &mut self,
        to: &str,
        id: &str,
        receipt_type: &str,
    ) -> Result<()> {
        let ack = NodeBuilder::new("ack")
            .attr("xmlns", "urn:xmpp:receipts")
            .attr("type", receipt_type)
            .build();
        let node = NodeBuilder::new("message")
            .attr("to", to)
            .attr("type", "chat")
            .attr("id", id)
            .child(ack)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Acknowledge a standalone `receipt` stanza.
    pub(crate) fn send_receipt_ack(&mut self, id: &str, receipt_type: &str) -> Result<()> {
        let node = NodeBuilder::new("ack")
            .attr("class", "receipt")
            .attr(
                "type",
                if receipt_type.is_empty() {
                    "delivery"
                } else {
                    receipt_type
                },
            )
            .attr("id", id)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Tell the sender their voice note was played. Clears the pending
    /// entry the played receipt will otherwise keep alive.
    pub fn send_voice_note_played(&mut self, message: &Message) -> Result<()> {
        let received = NodeBuilder::new("received")
            .attr("xmlns", "urn:xmpp:receipts")
            .attr("type", "played")
            .build();
        let node = self.message_node(message, received);
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Match phone numbers against the server's contact directory. Numbers
    /// carrying a jid suffix also get their bare "+number" form synced.
    pub fn send_sync_contacts(&mut self, numbers: &[String]) -> Result<()> {
        let id = self.make_id("sync_");

        let mut sync = NodeBuilder::new("sync")
            .attr("context", "background")
            .attr("index", "0")
            .attr("mode", "delta")
            .attr("last", "true")
            .attr("sid", Utc::now().timestamp().to_string())
            .build();
        for number in numbers {
            if let Some((bare, _)) = number.split_once('@') {
                sync.add_child(Node::with_payload("user", format!("+{bare}").into_bytes()));
                sync.add_child(Node::with_payload("user", bare.as_bytes().to_vec()));
            } else {
                sync.add_child(Node::with_payload("user", number.as_bytes().to_vec()));
            }
        }

        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.my_jid)
            .attr("xmlns", "urn:xmpp:whatsapp:sync")
            .child(sync)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Ask when a user was last seen. Group jids have no last-seen and are
    /// skipped outright.
    pub fn send_query_last_online(&mut self, jid: &str) -> Result<()> {
        if jid.contains('-') {
            return Ok(());
        }
        let id = self.make_id("last_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", jid)
            .attr("xmlns", "jabber:iq:last")
            .child(Node::new("query"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Batch-request status lines. Entries without a jid suffix are not
    /// addressable and get dropped.
    pub fn send_get_status(&mut self, jids: &[String]) -> Result<()> {
        let id = self.make_id("syncgetstatus_");
        let status = NodeBuilder::new("status")
            .children(
                jids.iter()
                    .filter(|jid| jid.contains('@'))
                    .map(|jid| NodeBuilder::new("user").attr("jid", jid).build()),
            )
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("to", &self.config.domain)
            .attr("type", "get")
            .attr("xmlns", "status")
            .child(status)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_set_status(&mut self, status: &str) -> Result<()> {
        let id = self.make_id("sendstatus_");
        let node = NodeBuilder::new("iq")
            .attr("to", &self.config.domain)
            .attr("type", "set")
            .attr("id", id)
            .attr("xmlns", "status")
            .child(Node::with_payload("status", status.as_bytes().to_vec()))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Subscribe to a user's presence changes.
    pub fn send_presence_subscription(&mut self, jid: &str) -> Result<()> {
        let node = NodeBuilder::new("presence")
            .attr("to", jid)
            .attr("type", "subscribe")
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_unsubscribe(&mut self, jid: &str) -> Result<()> {
        let node = NodeBuilder::new("presence")
            .attr("to", jid)
            .attr("type", "unsubscribe")
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_delete_from_roster(&mut self, jid: &str) -> Result<()> {
        let id = self.make_id("roster_");
        let item = NodeBuilder::new("item")
            .attr("jid", jid)
            .attr("subscription", "remove")
            .build();
        let query = NodeBuilder::new("query")
            .attr("xmlns", "jabber:iq:roster")
            .child(item)
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .child(query)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Fetch a profile picture. Sending the photo id we already hold lets
    /// the server skip the transfer when nothing changed; "abook" is a
    /// placeholder id and never forwarded.
    pub fn send_get_photo(
        &mut self,
        jid: &str,
        expected_photo_id: &str,
        large_format: bool,
    ) -> Result<()> {
        let id = self.make_id("get_picture_");
        let mut picture = NodeBuilder::new("picture")
            .attr("type", if large_format { "image" } else { "preview" });
        if !expected_photo_id.is_empty() && expected_photo_id != "abook" {
            picture = picture.attr("id", expected_photo_id);
        }
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", jid)
            .attr("xmlns", "w:profile:picture")
            .child(picture.build())
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Upload a profile or group picture; billed as profile traffic.
    pub fn send_set_photo(&mut self, jid: &str, image: &[u8], thumb: &[u8]) -> Result<()> {
        let id = self.make_id("set_picture_");
        let mut builder = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", jid)
            .attr("xmlns", "w:profile:picture")
            .child(Node::with_payload("picture", image.to_vec()));
        if !thumb.is_empty() {
            builder = builder.child(
                NodeBuilder::new("picture")
                    .attr("type", "preview")
                    .payload(thumb.to_vec())
                    .build(),
            );
        }
        let node = builder.build();
        self.write_counted(&node, CounterKind::ProfileBytes)?;
        Ok(())
    }

    /// Fetch the current photo ids for a batch of jids.
    pub fn send_get_photo_ids(&mut self, jids: &[String]) -> Result<()> {
        let id = self.make_id("get_picture_id_");
        let list = NodeBuilder::new("list")
            .children(
                jids.iter()
                    .map(|jid| NodeBuilder::new("user").attr("jid", jid).build()),
            )
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.my_jid)
            .attr("xmlns", "w:profile:picture")
            .child(list)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_composing(&mut self, jid: &str, media: &str) -> Result<()> {
        let state = NodeBuilder::new("composing")
            .attr_non_empty("media", media)
            .build();
        let node = NodeBuilder::new("chatstate")
            .attr("to", jid)
            .child(state)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_paused(&mut self, jid: &str, media: &str) -> Result<()> {
        let state = NodeBuilder::new("paused")
            .attr_non_empty("media", media)
            .build();
        let node = NodeBuilder::new("chatstate")
            .attr("to", jid)
            .child(state)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_create_group(&mut self, subject: &str) -> Result<()> {
        let id = self.make_id("create_group_");
        let group = NodeBuilder::new("group")
            .attr("action", "create")
            .attr("subject", subject)
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", "g.us")
            .attr("xmlns", "w:g")
            .child(group)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_add_participants(&mut self, gjid: &str, participants: &[String]) -> Result<()> {
        let id = self.make_id("add_group_participants_");
        self.send_verb_participants(gjid, participants, &id, "add")
    }

    pub fn send_remove_participants(&mut self, gjid: &str, participants: &[String]) -> Result<()> {
        let id = self.make_id("remove_group_participants_");
        self.send_verb_participants(gjid, participants, &id, "remove")
    }

    /// Shared shape for group membership changes. Our own jid is filtered
    /// out; the server rejects self-referential changes.
    fn send_verb_participants(
        &mut self,
        gjid: &str,
        participants: &[String],
        id: &str,
        verb: &str,
    ) -> Result<()> {
        let inner = NodeBuilder::new(verb)
            .children(
                participants
                    .iter()
                    .filter(|jid| *jid != &self.my_jid)
                    .map(|jid| NodeBuilder::new("participant").attr("jid", jid).build()),
            )
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", gjid)
            .attr("xmlns", "w:g")
            .child(inner)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_get_participants(&mut self, gjid: &str) -> Result<()> {
        let id = self.make_id("get_participants_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", gjid)
            .attr("xmlns", "w:g")
            .child(Node::new("list"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_get_group_info(&mut self, gjid: &str) -> Result<()> {
        let id = self.make_id("get_g_info_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", gjid)
            .attr("xmlns", "w:g")
            .child(Node::new("query"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Refresh the metadata of every group we participate in.
    pub fn update_group_chats(&mut self) -> Result<()> {
        let id = self.make_id("get_groups_");
        self.send_get_groups(&id, "participating")
    }

    fn send_get_groups(&mut self, id: &str, list_type: &str) -> Result<()> {
        let list = NodeBuilder::new("list").attr("type", list_type).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", "g.us")
            .attr("xmlns", "w:g")
            .child(list)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_set_group_subject(&mut self, gjid: &str, subject: &str) -> Result<()> {
        let id = self.make_id("set_group_subject_");
        let subject_node = NodeBuilder::new("subject").attr("value", subject).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", gjid)
            .attr("xmlns", "w:g")
            .child(subject_node)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_leave_group(&mut self, gjid: &str) -> Result<()> {
        let id = self.make_id("leave_group_");
        let group = NodeBuilder::new("group").attr("id", gjid).build();
        let leave = NodeBuilder::new("leave").child(group).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", "g.us")
            .attr("xmlns", "w:g")
            .child(leave)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_remove_group(&mut self, gjid: &str) -> Result<()> {
        let id = self.make_id("remove_group_");
        let group = NodeBuilder::new("group").attr("action", "delete").build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", gjid)
            .attr("xmlns", "w:g")
            .child(group)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Fetch the blocked contacts list.
    pub fn send_get_privacy_list(&mut self) -> Result<()> {
        let id = self.make_id("privacylist_");
        let list = NodeBuilder::new("list").attr("name", "default").build();
        let query = NodeBuilder::new("query").child(list).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("xmlns", "jabber:iq:privacy")
            .child(query)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Replace the blocked contacts list wholesale.
    pub fn send_set_privacy_blocked_list(&mut self, jids: &[String]) -> Result<()> {
        let id = self.make_id("privacy_");
        let list = NodeBuilder::new("list")
            .attr("name", "default")
            .children(jids.iter().enumerate().map(|(i, jid)| {
                NodeBuilder::new("item")
                    .attr("type", "jid")
                    .attr("value", jid)
                    .attr("action", "deny")
                    .attr("order", (i + 1).to_string())
                    .build()
            }))
            .build();
        let query = NodeBuilder::new("query").child(list).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("xmlns", "jabber:iq:privacy")
            .child(query)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_get_privacy_settings(&mut self) -> Result<()> {
        let id = self.make_id("privacysettings_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("to", &self.config.domain)
            .attr("type", "get")
            .attr("xmlns", "privacy")
            .child(Node::new("privacy"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_set_privacy_settings(&mut self, name: &str, value: &str) -> Result<()> {
        let id = self.make_id("setprivacy_");
        let category = NodeBuilder::new("category")
            .attr("name", name)
            .attr("value", value)
            .build();
        let privacy = NodeBuilder::new("privacy").child(category).build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("to", &self.config.domain)
            .attr("type", "set")
            .attr("xmlns", "privacy")
            .child(privacy)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Acknowledge dirty categories announced by the server.
    pub fn send_clean_dirty(&mut self, categories: &[String]) -> Result<()> {
        let id = self.make_id("clean_dirty_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", &self.config.domain)
            .attr("xmlns", "urn:xmpp:whatsapp:dirty")
            .children(
                categories
                    .iter()
                    .map(|category| NodeBuilder::new("clean").attr("type", category).build()),
            )
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_get_dirty(&mut self) -> Result<()> {
        let id = self.make_id("get_dirty_");
        let status = NodeBuilder::new("status")
            .attr("xmlns", "urn:xmpp:whatsapp:dirty")
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.config.domain)
            .child(status)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Wire-level no-op; keeps NAT mappings warm between pings.
    pub fn send_nop(&mut self) -> Result<()> {
        let node = Node::empty();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_ping(&mut self) -> Result<()> {
        let id = self.make_id("ping_");
        let ping = NodeBuilder::new("ping").attr("xmlns", "w:p").build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .child(ping)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Answer a server ping, echoing its id.
    pub(crate) fn send_pong(&mut self, id: &str) -> Result<()> {
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "result")
            .attr("to", &self.config.domain)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Change the announced display name, re-broadcasting presence with it.
    pub fn set_push_name(&mut self, push_name: &str, hide: bool) -> Result<()> {
        self.config.push_name = push_name.to_string();
        self.send_available_for_chat(hide)
    }

    pub fn send_available_for_chat(&mut self, hide: bool) -> Result<()> {
        let node = NodeBuilder::new("presence")
            .attr("name", &self.config.push_name)
            .attr("type", if hide { "unavailable" } else { "available" })
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_available(&mut self) -> Result<()> {
        let node = NodeBuilder::new("presence")
            .attr("type", "available")
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_unavailable(&mut self) -> Result<()> {
        let node = NodeBuilder::new("presence")
            .attr("type", "unavailable")
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    /// Push the client configuration; sent once right after authentication.
    pub(crate) fn send_client_config(&mut self, platform: &str) -> Result<()> {
        let id = self.make_id("config_");
        let config = NodeBuilder::new("config")
            .attr("platform", platform)
            .attr(
                "lg",
                if self.config.language.is_empty() {
                    "en"
                } else {
                    &self.config.language
                },
            )
            .attr(
                "lc",
                if self.config.country.is_empty() {
                    "US"
                } else {
                    &self.config.country
                },
            )
            .attr("clear", "1")
            .attr("preview", "1")
            .attr("default", "1")
            .attr("groups", "1")
            .attr("id", "none")
            .attr("version", "3")
            .build();
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "set")
            .attr("to", &self.config.domain)
            .attr("xmlns", "urn:xmpp:whatsapp:push")
            .child(config)
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn get_client_config(&mut self) -> Result<()> {
        let id = self.make_id("get_config_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.config.domain)
            .attr("xmlns", "urn:xmpp:whatsapp:push")
            .child(Node::new("config"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_get_server_properties(&mut self) -> Result<()> {
        let id = self.make_id("get_server_properties_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.config.domain)
            .attr("xmlns", "w")
            .child(Node::new("props"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }

    pub fn send_delete_account(&mut self) -> Result<()> {
        let id = self.make_id("del_acct_");
        let node = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("type", "get")
            .attr("to", &self.config.domain)
            .attr("xmlns", "urn:xmpp:whatsapp:account")
            .child(Node::new("remove"))
            .build();
        self.write_counted(&node, CounterKind::ProtocolBytes)?;
        Ok(())
    }
}
