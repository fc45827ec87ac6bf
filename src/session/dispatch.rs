//! Post-authentication read dispatch.
//!
//! One decoded tree in, zero or more domain events and protocol replies out.
//! Unknown stanzas are logged and dropped; malformed fields degrade to
//! defaults instead of killing the session.

use super::Session;
use crate::binary::Node;
use crate::codec::WireCodec;
use crate::counters::CounterKind;
use crate::error::Result;
use crate::types::events::{
    Available, Composing, ContactAdded, ContactStatus, GroupCreated, GroupInfoFromList,
    GroupLeft, GroupNewSubject, GroupUserChange, GroupUsers, LastOnline, OfflineMessageCount,
    Paused, PhotoDeleted, PhotoIdReceived, PhotoReceived, PushNameUpdate, StreamError,
    SyncedContact, UserStatusUpdate,
};
use crate::types::message::{Key, MediaKind, MessageStatus};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

impl<C: WireCodec> Session<C> {
    /// Route one inbound tree. Billing policy: profile picture payloads go to
    /// the profile bucket, chat messages bill themselves inside the message
    /// handler, everything else is protocol overhead.
    pub(crate) fn dispatch(&mut self, node: Node) -> Result<()> {
        let mut picture_payload = false;
        match node.tag.as_str() {
            "stream:error" => self.handle_stream_error(&node),
            "iq" => self.handle_iq(&node, &mut picture_payload)?,
            "ib" => self.handle_ib(&node)?,
            "presence" => self.handle_presence(&node),
            "chatstate" => self.handle_chatstate(&node),
            "ack" => self.handle_ack(&node),
            "receipt" => self.handle_receipt(&node)?,
            "notification" => self.handle_notification(&node)?,
            "message" => self.handle_message(&node)?,
            other => debug!(target: "Session/Dispatch", "Unhandled stanza <{other}>"),
        }
        if node.tag != "message" && !picture_payload {
            self.counters
                .add(CounterKind::ProtocolBytes, node.size() as u64, 0);
        }
        Ok(())
    }

    /// Collect the text children as diagnostics, then tear down.
    fn handle_stream_error(&mut self, node: &Node) {
        let diagnostics: Vec<String> = node
            .children_by_tag("text")
            .map(|child| child.payload_string())
            .collect();
        warn!(target: "Session/Dispatch", "Stream error: {diagnostics:?}");
        let _ = self
            .events
            .stream_error
            .send(Arc::new(StreamError { diagnostics }));
        self.teardown();
    }

    fn handle_iq(&mut self, node: &Node, picture_payload: &mut bool) -> Result<()> {
        let id = node.attr_or_empty("id").to_string();
        let from = node.attr_or_empty("from").to_string();
        let iq_type = node.attr_or_empty("type");

        if node.attr_or_empty("xmlns") == "urn:xmpp:ping" {
            return self.send_pong(&id);
        }
        match iq_type {
            "result" => self.handle_iq_result(node, &id, &from, picture_payload)?,
            "error" => self.handle_iq_error(node, &id, &from),
            other => debug!(target: "Session/Dispatch", "Unhandled iq type '{other}'"),
        }
        Ok(())
    }

    fn handle_iq_result(
        &mut self,
        node: &Node,
        id: &str,
        from: &str,
        picture_payload: &mut bool,
    ) -> Result<()> {
        let mut participants = Vec::new();
        for child in &node.children {
            match child.tag.as_str() {
                "group" => {
                    if id.starts_with("create_group_") {
                        let gjid = format!("{}@g.us", child.attr_or_empty("id"));
                        let _ = self
                            .events
                            .group_created
                            .send(Arc::new(GroupCreated { gjid: gjid.clone() }));
                        self.send_get_group_info(&gjid)?;
                    } else {
                        let _ =
                            self.events
                                .group_info_from_list
                                .send(Arc::new(GroupInfoFromList {
                                    request_id: id.to_string(),
                                    gjid: format!("{}@g.us", child.attr_or_empty("id")),
                                    owner: child.attr_or_empty("owner").to_string(),
                                    subject: child.attr_or_empty("subject").to_string(),
                                    creation: child.attr_or_empty("creation").to_string(),
                                    subject_owner: child.attr_or_empty("s_o").to_string(),
                                    subject_timestamp: child.attr_or_empty("s_t").to_string(),
                                }));
                    }
                }
                "leave" => {
                    for group in child.children_by_tag("group") {
                        let _ = self.events.group_left.send(Arc::new(GroupLeft {
                            gjid: group.attr_or_empty("id").to_string(),
                        }));
                    }
                }
                "query" => {
                    if id.starts_with("last_") {
                        // jabber:iq:last carries "seconds ago".
                        let mut parser = child.attr_parser();
                        let seconds = parser.optional_i64("seconds").unwrap_or(0);
                        let _ = self.events.last_online.send(Arc::new(LastOnline {
                            jid: from.to_string(),
                            timestamp: chrono::Utc::now().timestamp() - seconds,
                        }));
                    } else if id.starts_with("privacylist_") {
                        let jids: Vec<String> = child
                            .children_by_tag("list")
                            .flat_map(|list| list.children_by_tag("item"))
                            .map(|item| item.attr_or_empty("value").to_string())
                            .filter(|jid| !jid.is_empty())
                            .collect();
                        if !jids.is_empty() {
                            let _ = self.events.privacy_list_received.send(Arc::new(jids));
                        }
                    }
                }
                "privacy" => {
                    if id.starts_with("privacysettings_") {
                        let settings: HashMap<String, String> = child
                            .children_by_tag("category")
                            .map(|category| {
                                (
                                    category.attr_or_empty("name").to_string(),
                                    category.attr_or_empty("value").to_string(),
                                )
                            })
                            .collect();
                        let _ = self.events.privacy_settings_received.send(Arc::new(settings));
                    }
                }
                "media" | "duplicate" => {
                    // Upload slot granted, or the media is already on the
                    // server and the upload can be skipped.
                    let key = Key::new(self.config.domain.clone(), true, id);
                    if let Some(mut message) = self.store.get(&key) {
                        self.store.remove(&key);
                        message.media_url = child.attr_or_empty("url").to_string();
                        if child.tag == "media" {
                            message.status = MessageStatus::Uploading;
                        } else {
                            message.status = MessageStatus::Uploaded;
                            message.media_mime_type =
                                child.attr_or_empty("mimetype").to_string();
                            let mut parser = child.attr_parser();
                            if matches!(message.media_kind, MediaKind::Video | MediaKind::Audio) {
                                message.media_duration_seconds =
                                    parser.optional_u64("duration").unwrap_or(0) as u32;
                            }
                            // Dimensions apply to visual media only, matching
                            // the inbound media parser.
                            if matches!(message.media_kind, MediaKind::Image | MediaKind::Video) {
                                if let (Some(w), Some(h)) =
                                    (parser.optional_u64("width"), parser.optional_u64("height"))
                                {
                                    message.media_width = w as u32;
                                    message.media_height = h as u32;
                                }
                            }
                        }
                        let _ = self.events.media_upload_accepted.send(Arc::new(message));
                    }
                }
                "picture" => {
                    let data = child.payload_bytes();
                    if data.is_empty() {
                        // Empty body means a preview-only cache hit; ask for
                        // the full-size picture instead.
                        let jid = from.to_string();
                        self.send_get_photo(&jid, "", true)?;
                    } else {
                        let _ = self.events.photo_received.send(Arc::new(PhotoReceived {
                            from: from.to_string(),
                            data: data.to_vec(),
                            photo_id: child.attr_or_empty("id").to_string(),
                            large_format: child.attr_or_empty("type") == "image",
                        }));
                    }
                    self.counters
                        .add(CounterKind::ProfileBytes, node.size() as u64, 0);
                    *picture_payload = true;
                }
                "sync" => self.handle_sync_result(child)?,
                "status" => {
                    let contacts: Vec<ContactStatus> = child
                        .children_by_tag("user")
                        .map(|user| {
                            let message = user.payload_string();
                            let hidden = message.is_empty() && user.attr_or_empty("code") == "401";
                            ContactStatus {
                                jid: user.attr_or_empty("jid").to_string(),
                                timestamp: user.attr_or_empty("t").to_string(),
                                message,
                                hidden,
                            }
                        })
                        .collect();
                    let _ = self.events.contacts_status.send(Arc::new(contacts));
                }
                "participant" => {
                    if id.starts_with("get_participants_") {
                        let jid = child.attr_or_empty("jid");
                        if !jid.is_empty() {
                            participants.push(jid.to_string());
                        }
                    }
                }
                other => debug!(target: "Session/Dispatch", "Unhandled iq result child <{other}>"),
            }
        }

        if !participants.is_empty() {
            let _ = self.events.group_users.send(Arc::new(GroupUsers {
                gjid: from.to_string(),
                jids: participants,
            }));
        }
        if id.starts_with("privacy_") {
            // A privacy list update was acknowledged; refresh our copy.
            self.send_get_privacy_list()?;
        }
        Ok(())
    }

    /// Contact sync outcome: each `full`/`in` list carries matched users,
    /// and their statuses get requested in one batch right away.
    fn handle_sync_result(&mut self, sync: &Node) -> Result<()> {
        for list in &sync.children {
            if list.tag != "full" && list.tag != "in" {
                continue;
            }
            let contacts: Vec<SyncedContact> = list
                .children_by_tag("user")
                .map(|user| SyncedContact {
                    jid: user.attr_or_empty("jid").to_string(),
                    phone: user.payload_string(),
                })
                .collect();
            let jids: Vec<String> = contacts.iter().map(|c| c.jid.clone()).collect();
            self.send_get_status(&jids)?;
            let _ = self.events.contacts_synced.send(Arc::new(contacts));
        }
        let _ = self.events.sync_finished.send(());
        Ok(())
    }

    /// Application-level iq errors. The request-id prefix tells us what was
    /// asked; error codes become domain sentinels, never session failures.
    fn handle_iq_error(&mut self, node: &Node, id: &str, from: &str) {
        if id.starts_with("privacylist_") {
            // No blocked list on the server yet.
            let _ = self.events.privacy_list_received.send(Arc::new(Vec::new()));
            return;
        }
        if id.starts_with("get_picture_") {
            for error in node.children_by_tag("error") {
                let photo_id = match error.attr_or_empty("code") {
                    "401" => "hidden",
                    "404" => "empty",
                    _ => continue,
                };
                let _ = self.events.photo_received.send(Arc::new(PhotoReceived {
                    from: from.to_string(),
                    data: Vec::new(),
                    photo_id: photo_id.to_string(),
                    large_format: true,
                }));
            }
            return;
        }
        if id.starts_with("last_") {
            for error in node.children_by_tag("error") {
                let timestamp = match error.attr_or_empty("code") {
                    // Peer hides last-seen.
                    "405" => -1,
                    // We are blocked.
                    "401" => -2,
                    _ => continue,
                };
                let _ = self.events.last_online.send(Arc::new(LastOnline {
                    jid: from.to_string(),
                    timestamp,
                }));
            }
            return;
        }
        debug!(target: "Session/Dispatch", "Unhandled iq error for id '{id}'");
    }

    /// In-band server bookkeeping: dirty categories to acknowledge and the
    /// offline message backlog count.
    fn handle_ib(&mut self, node: &Node) -> Result<()> {
        for child in &node.children {
            match child.tag.as_str() {
                "dirty" => {
                    let category = child.attr_or_empty("type").to_string();
                    self.send_clean_dirty(&[category])?;
                }
                "offline" => {
                    let mut parser = child.attr_parser();
                    let count = parser.optional_u64("count").unwrap_or(0) as u32;
                    let _ = self
                        .events
                        .offline_message_count
                        .send(Arc::new(OfflineMessageCount { count }));
                }
                other => debug!(target: "Session/Dispatch", "Unhandled ib child <{other}>"),
            }
        }
        Ok(())
    }

    /// Contact availability. Group presences (jids with a '-') are noise
    /// here and get dropped.
    fn handle_presence(&mut self, node: &Node) {
        let from = node.attr_or_empty("from");
        if from.is_empty() || from.contains('-') {
            return;
        }
        let online = match node.attr_or_empty("type") {
            "" | "available" => true,
            "unavailable" => false,
            _ => return,
        };
        let _ = self.events.available.send(Arc::new(Available {
            jid: from.to_string(),
            online,
        }));
    }

    fn handle_chatstate(&mut self, node: &Node) {
        let from = node.attr_or_empty("from").to_string();
        for child in &node.children {
            match child.tag.as_str() {
                "composing" => {
                    // media is "audio" while the peer records a voice note.
                    let _ = self.events.composing.send(Arc::new(Composing {
                        jid: from.clone(),
                        media: child.attr_or_empty("media").to_string(),
                    }));
                }
                "paused" => {
                    let _ = self.events.paused.send(Arc::new(Paused { jid: from.clone() }));
                }
                _ => {}
            }
        }
    }

    /// Server ack for an outgoing message: it reached the server, not yet
    /// the target.
    fn handle_ack(&mut self, node: &Node) {
        if node.attr_or_empty("class") != "message" {
            return;
        }
        self.emit_status_update(
            node.attr_or_empty("from"),
            node.attr_or_empty("id"),
            MessageStatus::ReceivedByServer,
        );
    }

    /// Delivery/read receipt for an outgoing message. Broadcast receipts
    /// credit the individual participant; the server's own "s.us" echoes are
    /// suppressed. Delivered and played receipts are acked back.
    fn handle_receipt(&mut self, node: &Node) -> Result<()> {
        let from = node.attr_or_empty("from");
        let id = node.attr_or_empty("id");
        let receipt_type = node.attr_or_empty("type");
        let participant = node.attr_or_empty("participant");

        let status = if receipt_type == "played" {
            MessageStatus::Played
        } else {
            MessageStatus::ReceivedByTarget
        };
        if from.contains("broadcast") {
            self.emit_status_update(participant, id, status);
        } else if !from.contains("s.us") {
            self.emit_status_update(from, id, status);
        }

        if matches!(receipt_type, "delivered" | "played" | "") {
            let id = id.to_string();
            let receipt_type = receipt_type.to_string();
            self.send_receipt_ack(&id, &receipt_type)?;
        }
        Ok(())
    }

    pub(crate) fn emit_status_update(&self, jid: &str, id: &str, status: MessageStatus) {
        let _ = self
            .events
            .message_status_update
            .send(Arc::new(crate::types::events::MessageStatusUpdate {
                jid: jid.to_string(),
                id: id.to_string(),
                status,
            }));
    }

    /// Server-pushed notifications. All types are acknowledged; picture
    /// notifications ack after processing, the rest before, and the contacts
    /// ack embeds the outbound resync trigger.
    fn handle_notification(&mut self, node: &Node) -> Result<()> {
        let notification_type = node.attr_or_empty("type").to_string();
        let from = node.attr_or_empty("from").to_string();
        let to = node.attr_or_empty("to").to_string();
        let participant = node.attr_or_empty("participant").to_string();
        let id = node.attr_or_empty("id").to_string();
        let notify = node.attr_or_empty("notify").to_string();
        let timestamp = node.attr_or_empty("t").to_string();
        let mut parser = node.attr_parser();
        let offline = parser.flag("offline");

        // Push names ride along on most notifications. For group traffic the
        // name belongs to the participant, not the group jid.
        if !notify.is_empty() {
            let jid = if from.contains('-') {
                participant.clone()
            } else {
                from.clone()
            };
            if !jid.is_empty() {
                let _ = self.events.push_name_update.send(Arc::new(PushNameUpdate {
                    jid,
                    push_name: notify.clone(),
                }));
            }
        }

        match notification_type.as_str() {
            "picture" => {
                for child in &node.children {
                    match child.tag.as_str() {
                        "set" => {
                            let photo_id = child.attr_or_empty("id").to_string();
                            if !photo_id.is_empty() {
                                let _ =
                                    self.events.photo_id_received.send(Arc::new(PhotoIdReceived {
                                        jid: from.clone(),
                                        alias: notify.clone(),
                                        author: child.attr_or_empty("author").to_string(),
                                        timestamp: timestamp.clone(),
                                        photo_id,
                                        notification_id: id.clone(),
                                        offline,
                                    }));
                            }
                        }
                        "delete" => {
                            let _ = self.events.photo_deleted.send(Arc::new(PhotoDeleted {
                                jid: from.clone(),
                                alias: notify.clone(),
                                author: child.attr_or_empty("author").to_string(),
                                timestamp: timestamp.clone(),
                                notification_id: id.clone(),
                                offline,
                            }));
                        }
                        _ => {}
                    }
                }
                self.send_notification_ack(&from, &id, &to, &participant, &notification_type, None)?;
            }
            "contacts" => {
                for add in node.children_by_tag("add") {
                    let jid = add.attr_or_empty("jid");
                    if !jid.is_empty() {
                        let _ = self.events.contact_added.send(Arc::new(ContactAdded {
                            jid: jid.to_string(),
                        }));
                    }
                }
                // The ack doubles as the outbound resync request.
                let sync = crate::binary::NodeBuilder::new("sync")
                    .attr("contacts", "out")
                    .build();
                self.send_notification_ack(
                    &from,
                    &id,
                    &to,
                    &participant,
                    &notification_type,
                    Some(sync),
                )?;
            }
            "subject" => {
                self.send_notification_ack(&from, &id, &to, &participant, &notification_type, None)?;
                for body in node.children_by_tag("body") {
                    let _ = self.events.group_new_subject.send(Arc::new(GroupNewSubject {
                        gjid: from.clone(),
                        author: participant.clone(),
                        author_name: notify.clone(),
                        subject: body.payload_string(),
                        timestamp: timestamp.clone(),
                        notification_id: id.clone(),
                        offline,
                    }));
                }
            }
            "status" => {
                self.send_notification_ack(&from, &id, &to, &participant, &notification_type, None)?;
                for set in node.children_by_tag("set") {
                    let _ = self.events.user_status_update.send(Arc::new(UserStatusUpdate {
                        jid: from.clone(),
                        message: set.payload_string(),
                        timestamp: timestamp.parse().unwrap_or(0),
                    }));
                }
            }
            "web" => {
                self.send_notification_ack(&from, &id, &to, &participant, &notification_type, None)?;
            }
            "participant" => {
                self.send_notification_ack(&from, &id, &to, &participant, &notification_type, None)?;
                for child in &node.children {
                    let jid = child.attr_or_empty("jid").to_string();
                    match child.tag.as_str() {
                        "add" => {
                            if jid == self.my_jid {
                                // We were added; fetch the group's metadata.
                                let gjid = from.clone();
                                self.send_get_group_info(&gjid)?;
                            } else if !jid.is_empty() {
                                let _ = self.events.group_add_user.send(Arc::new(GroupUserChange {
                                    gjid: from.clone(),
                                    jid,
                                    timestamp: timestamp.clone(),
                                    notification_id: id.clone(),
                                    offline,
                                }));
                            }
                        }
                        "remove" => {
                            if !jid.is_empty() {
                                let _ =
                                    self.events.group_remove_user.send(Arc::new(GroupUserChange {
                                        gjid: from.clone(),
                                        jid,
                                        timestamp: timestamp.clone(),
                                        notification_id: id.clone(),
                                        offline,
                                    }));
                            }
                        }
                        _ => {}
                    }
                }
            }
            other => {
                debug!(target: "Session/Dispatch", "Unhandled notification type '{other}'");
            }
        }
        Ok(())
    }
}
