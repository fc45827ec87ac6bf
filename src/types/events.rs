use crate::types::message::{Message, MessageStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of each broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Handshake completed; the account attributes from the `success` node plus
/// the seed to pass to the next session's login.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub creation: String,
    pub expiration: String,
    pub kind: String,
    pub status: String,
    pub next_challenge: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AccountExpired {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct StreamError {
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessageStatusUpdate {
    pub jid: String,
    pub id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone)]
pub struct Composing {
    pub jid: String,
    pub media: String,
}

#[derive(Debug, Clone)]
pub struct Paused {
    pub jid: String,
}

#[derive(Debug, Clone)]
pub struct PushNameUpdate {
    pub jid: String,
    pub push_name: String,
}

#[derive(Debug, Clone)]
pub struct Available {
    pub jid: String,
    pub online: bool,
}

/// Last-seen timestamp. Negative values are privacy sentinels: -1 when the
/// peer hides last-seen, -2 when this account is blocked.
#[derive(Debug, Clone)]
pub struct LastOnline {
    pub jid: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct UserStatusUpdate {
    pub jid: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct ContactAdded {
    pub jid: String,
}

#[derive(Debug, Clone)]
pub struct SyncedContact {
    pub jid: String,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct ContactStatus {
    pub jid: String,
    pub timestamp: String,
    pub message: String,
    /// Status withheld by the peer's privacy settings (code 401).
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub struct PhotoIdReceived {
    pub jid: String,
    pub alias: String,
    pub author: String,
    pub timestamp: String,
    pub photo_id: String,
    pub notification_id: String,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct PhotoDeleted {
    pub jid: String,
    pub alias: String,
    pub author: String,
    pub timestamp: String,
    pub notification_id: String,
    pub offline: bool,
}

/// Profile picture payload. `photo_id` may be the sentinel "hidden" (401)
/// or "empty" (404) with no data attached.
#[derive(Debug, Clone)]
pub struct PhotoReceived {
    pub from: String,
    pub data: Vec<u8>,
    pub photo_id: String,
    pub large_format: bool,
}

#[derive(Debug, Clone)]
pub struct GroupCreated {
    pub gjid: String,
}

#[derive(Debug, Clone)]
pub struct GroupInfoFromList {
    pub request_id: String,
    pub gjid: String,
    pub owner: String,
    pub subject: String,
    pub creation: String,
    pub subject_owner: String,
    pub subject_timestamp: String,
}

#[derive(Debug, Clone)]
pub struct GroupNewSubject {
    pub gjid: String,
    pub author: String,
    pub author_name: String,
    pub subject: String,
    pub timestamp: String,
    pub notification_id: String,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct GroupUserChange {
    pub gjid: String,
    pub jid: String,
    pub timestamp: String,
    pub notification_id: String,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct GroupLeft {
    pub gjid: String,
}

#[derive(Debug, Clone)]
pub struct GroupUsers {
    pub gjid: String,
    pub jids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GroupError {
    pub gjid: String,
}

#[derive(Debug, Clone)]
pub struct OfflineMessageCount {
    pub count: u32,
}

// Macro to generate EventBus fields and constructor.
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with one broadcast channel per domain event.
        /// Senders are synchronous, so the single-threaded session publishes
        /// directly from dispatch; subscribers receive on their own terms.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection lifecycle
    (connected, ()),
    (disconnected, ()),
    (auth_success, Arc<AuthSuccess>),
    (auth_failed, ()),
    (account_expired, Arc<AccountExpired>),
    (stream_error, Arc<StreamError>),

    // Messages
    (message_received, Arc<Message>),
    (message_status_update, Arc<MessageStatusUpdate>),
    (media_upload_accepted, Arc<Message>),

    // Typing indicators
    (composing, Arc<Composing>),
    (paused, Arc<Paused>),

    // Users
    (push_name_update, Arc<PushNameUpdate>),
    (available, Arc<Available>),
    (last_online, Arc<LastOnline>),
    (user_status_update, Arc<UserStatusUpdate>),

    // Contacts
    (contact_added, Arc<ContactAdded>),
    (contacts_synced, Arc<Vec<SyncedContact>>),
    (contacts_status, Arc<Vec<ContactStatus>>),
    (sync_finished, ()),

    // Profile pictures
    (photo_id_received, Arc<PhotoIdReceived>),
    (photo_deleted, Arc<PhotoDeleted>),
    (photo_received, Arc<PhotoReceived>),

    // Groups
    (group_created, Arc<GroupCreated>),
    (group_info_from_list, Arc<GroupInfoFromList>),
    (group_new_subject, Arc<GroupNewSubject>),
    (group_add_user, Arc<GroupUserChange>),
    (group_remove_user, Arc<GroupUserChange>),
    (group_left, Arc<GroupLeft>),
    (group_users, Arc<GroupUsers>),
    (group_error, Arc<GroupError>),

    // Privacy
    (privacy_list_received, Arc<Vec<String>>),
    (privacy_settings_received, Arc<HashMap<String, String>>),

    // Stream bookkeeping
    (offline_message_count, Arc<OfflineMessageCount>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
