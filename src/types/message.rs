use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one message in one conversation direction. Equality is purely
/// structural; the triple is globally unique per direction/id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Key {
    pub remote_jid: String,
    pub from_me: bool,
    pub id: String,
}

impl Key {
    pub fn new(remote_jid: impl Into<String>, from_me: bool, id: impl Into<String>) -> Self {
        Self {
            remote_jid: remote_jid.into(),
            from_me,
            id: id.into(),
        }
    }
}

/// Delivery lifecycle of a message. Outgoing messages walk forward through
/// these states; the store drops them once a terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum MessageStatus {
    #[default]
    Unsent,
    Uploading,
    Uploaded,
    ReceivedByServer,
    ReceivedByTarget,
    Played,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Text,
    Media,
    /// Upload-slot request preceding an actual media send.
    MediaRequest,
}

/// Media subtype carried in the `type` attribute of a `media` child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Contact,
    Location,
    System,
}

impl MediaKind {
    /// Wire-string mapping. Unknown inputs fall back to `Text`, which
    /// round-trips as "undefined"; both quirks are protocol-observable.
    pub fn from_wire(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "image" => MediaKind::Image,
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            "vcard" => MediaKind::Contact,
            "location" => MediaKind::Location,
            "system" => MediaKind::System,
            _ => MediaKind::Text,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Contact => "vcard",
            MediaKind::Location => "location",
            MediaKind::System => "system",
            MediaKind::Text => "undefined",
        }
    }
}

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// One chat message, local or remote. Flat on purpose: the media fields are
/// only meaningful for `kind == Media`, mirroring how the wire carries them
/// as optional attributes of a single `media` child.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub key: Key,
    pub kind: MessageKind,
    pub status: MessageStatus,

    /// Body text for text messages, caption/thumbnail or vcard payload for
    /// media, base64 preview for `encoding=raw` payloads.
    pub data: Vec<u8>,
    pub thumb_image: String,
    pub timestamp: i64,
    pub notify_name: String,
    /// Effective author for group/broadcast traffic.
    pub remote_resource: String,

    pub media_kind: MediaKind,
    pub media_url: String,
    pub media_name: String,
    pub media_mime_type: String,
    pub media_size: u64,
    pub media_duration_seconds: u32,
    pub media_width: u32,
    pub media_height: u32,
    pub latitude: f64,
    pub longitude: f64,

    /// Voice note. Live messages stay in the pending store until played.
    pub live: bool,
    pub broadcast: bool,
    pub offline: bool,
    pub broadcast_jids: Vec<String>,
}

impl Message {
    pub fn with_key(key: Key) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    /// A locally composed outgoing message with a fresh generated id.
    pub fn outgoing(remote_jid: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let timestamp = chrono::Utc::now().timestamp();
        Self {
            key: Key::new(remote_jid, true, Self::generate_id(timestamp)),
            timestamp,
            data: data.into(),
            ..Default::default()
        }
    }

    fn generate_id(timestamp: i64) -> String {
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{timestamp}-{seq}")
    }

    pub fn set_media_kind_from_wire(&mut self, value: &str) {
        self.media_kind = MediaKind::from_wire(value);
    }

    pub fn data_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_equality_is_structural() {
        let a = Key::new("123@s.whatsapp.net", false, "m1");
        let b = Key::new(String::from("123@s.whatsapp.net"), false, "m1");
        assert_eq!(a, b);
        assert_ne!(a, Key::new("123@s.whatsapp.net", true, "m1"));
        assert_ne!(a, Key::new("123@s.whatsapp.net", false, "m2"));
    }

    #[test]
    fn outgoing_ids_are_unique() {
        let a = Message::outgoing("123@s.whatsapp.net", b"x".to_vec());
        let b = Message::outgoing("123@s.whatsapp.net", b"x".to_vec());
        assert_ne!(a.key.id, b.key.id);
        assert!(a.key.from_me);
    }

    #[test]
    fn media_kind_wire_mapping() {
        assert_eq!(MediaKind::from_wire("VCARD"), MediaKind::Contact);
        assert_eq!(MediaKind::from_wire("gif"), MediaKind::Text);
        assert_eq!(MediaKind::Text.as_wire(), "undefined");
        assert_eq!(MediaKind::Contact.as_wire(), "vcard");
    }
}
