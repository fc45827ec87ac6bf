use funxmpp_session::binary::{Node, NodeBuilder};
use funxmpp_session::codec::{CodecError, WireCodec};
use funxmpp_session::counters::{CounterKind, TrafficCounters};
use funxmpp_session::crypto::{CipherSuite, KeystreamCipher, SessionKeys};
use funxmpp_session::error::SessionError;
use funxmpp_session::session::{Session, SessionConfig, SessionState};
use funxmpp_session::store::PendingStore;
use funxmpp_session::types::message::{Key, MediaKind, Message, MessageKind, MessageStatus};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CodecState {
    inbound: VecDeque<Node>,
    written: Vec<(Node, bool)>,
    stream_started: bool,
    crypto: bool,
    input_cipher: bool,
    output_cipher: bool,
    closed: bool,
}

/// Scripted codec double: inbound trees come from a queue, outbound trees
/// are recorded verbatim together with their traffic flag.
#[derive(Clone, Default)]
struct MockCodec {
    state: Arc<Mutex<CodecState>>,
}

/// Deterministic stand-in for the serialized size of a tree.
fn encoded_len(node: &Node) -> usize {
    let mut len = 8 + node.tag.len();
    for (k, v) in node.attrs.iter() {
        len += k.len() + v.len() + 2;
    }
    len += node.payload.as_ref().map_or(0, |p| p.len());
    for child in &node.children {
        len += encoded_len(child);
    }
    len
}

impl MockCodec {
    fn push_inbound(&self, node: Node) {
        self.state.lock().unwrap().inbound.push_back(node);
    }

    fn written(&self) -> Vec<(Node, bool)> {
        self.state.lock().unwrap().written.clone()
    }

    fn crypto_enabled(&self) -> bool {
        self.state.lock().unwrap().crypto
    }

    fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl WireCodec for MockCodec {
    fn write_stream_start(&mut self, _domain: &str, _resource: &str) -> Result<usize, CodecError> {
        self.state.lock().unwrap().stream_started = true;
        Ok(16)
    }

    fn write(&mut self, node: &Node, counts_as_traffic: bool) -> Result<usize, CodecError> {
        let mut state = self.state.lock().unwrap();
        state.written.push((node.clone(), counts_as_traffic));
        Ok(encoded_len(node))
    }

    fn read_stream_start(&mut self) -> Result<usize, CodecError> {
        Ok(8)
    }

    fn next_tree(&mut self) -> Result<Option<Node>, CodecError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.inbound.pop_front().map(|mut node| {
            let size = encoded_len(&node);
            node.set_size(size);
            node
        }))
    }

    fn has_data(&self) -> bool {
        !self.state.lock().unwrap().inbound.is_empty()
    }

    fn set_input_cipher(&mut self, _cipher: Box<dyn KeystreamCipher>) {
        self.state.lock().unwrap().input_cipher = true;
    }

    fn set_output_cipher(&mut self, _cipher: Box<dyn KeystreamCipher>) {
        self.state.lock().unwrap().output_cipher = true;
    }

    fn set_crypto(&mut self, enabled: bool) {
        self.state.lock().unwrap().crypto = enabled;
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

struct NullCipher;

impl KeystreamCipher for NullCipher {
    fn encode(&mut self, _buf: &mut [u8], _offset: usize, _header_len: usize, _body_len: usize) {}
}

struct MockSuite;

impl CipherSuite for MockSuite {
    fn derive_keys(&self, _password: &[u8], _nonce: &[u8]) -> Result<SessionKeys, SessionError> {
        Ok(SessionKeys {
            keys: [vec![1; 20], vec![2; 20], vec![3; 20], vec![4; 20]],
        })
    }

    fn cipher(&self, _key: &[u8], _mac_key: &[u8]) -> Box<dyn KeystreamCipher> {
        Box::new(NullCipher)
    }
}

struct Harness {
    session: Session<MockCodec>,
    codec: MockCodec,
    counters: Arc<TrafficCounters>,
    store: Arc<PendingStore>,
}

fn harness(next_challenge: Vec<u8>) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let codec = MockCodec::default();
    let counters = Arc::new(TrafficCounters::new());
    let store = Arc::new(PendingStore::new());
    let config = SessionConfig {
        domain: "s.whatsapp.net".to_string(),
        resource: "S40-2.4.22-443".to_string(),
        user: "56955551234".to_string(),
        push_name: "tester".to_string(),
        password: b"secret".to_vec(),
        language: "en".to_string(),
        country: "US".to_string(),
        mcc: "730".to_string(),
        mnc: "5".to_string(),
        version: "2.11.1".to_string(),
        next_challenge,
    };
    let session = Session::new(
        config,
        codec.clone(),
        Box::new(MockSuite),
        store.clone(),
        counters.clone(),
    );
    Harness {
        session,
        codec,
        counters,
        store,
    }
}

fn success_node(challenge: &[u8]) -> Node {
    NodeBuilder::new("success")
        .attr("status", "active")
        .attr("kind", "free")
        .attr("creation", "1357000000")
        .attr("expiration", "1388536000")
        .payload(challenge.to_vec())
        .build()
}

/// Seeded login straight to success, leaving the session authenticated.
fn authenticated() -> Harness {
    let mut h = harness(vec![7, 7, 7]);
    h.codec.push_inbound(success_node(&[8, 8, 8]));
    h.session.start().expect("login");
    assert_eq!(h.session.state(), SessionState::Authenticated);
    h
}

fn find_written<'a>(written: &'a [(Node, bool)], tag: &str) -> Option<&'a Node> {
    written.iter().map(|(n, _)| n).find(|n| n.tag == tag)
}

#[test]
fn fresh_login_negotiates_challenge() {
    let mut h = harness(Vec::new());
    let events = h.session.events();
    let mut connected = events.connected.subscribe();
    let mut auth_success = events.auth_success.subscribe();

    h.codec.push_inbound(Node::new("stream:features"));
    h.codec.push_inbound(Node::with_payload("challenge", vec![9, 9, 9]));
    h.codec.push_inbound(success_node(&[1, 2, 3]));

    h.session.start().expect("login");

    assert_eq!(h.session.state(), SessionState::Authenticated);
    assert!(connected.try_recv().is_ok());
    let auth = auth_success.try_recv().expect("auth event");
    assert_eq!(auth.status, "active");
    assert_eq!(auth.next_challenge, vec![1, 2, 3]);
    assert_eq!(h.session.next_challenge(), &[1, 2, 3]);

    let written = h.codec.written();
    // Handshake order: features, auth, response, then the config iq.
    assert_eq!(written[0].0.tag, "stream:features");
    assert!(!written[0].1);
    let auth_node = &written[1].0;
    assert_eq!(auth_node.tag, "auth");
    assert_eq!(auth_node.attr("mechanism"), Some("WAUTH-2"));
    assert_eq!(auth_node.attr("user"), Some("56955551234"));
    // No seed, so the auth node goes out without a blob.
    assert!(auth_node.payload.is_none());
    let response = &written[2].0;
    assert_eq!(response.tag, "response");
    assert!(!response.payload_bytes().is_empty());
    assert_eq!(written[3].0.tag, "iq");
    assert!(written[3].0.get_child("config").is_some());

    assert!(h.codec.crypto_enabled());
    assert!(h.counters.received(CounterKind::ProtocolBytes) > 0);
    assert!(h.counters.sent(CounterKind::ProtocolBytes) > 0);
}

#[test]
fn seeded_login_sends_blob_and_skips_challenge() {
    let mut h = harness(vec![7, 7, 7]);
    h.codec.push_inbound(success_node(&[8, 8, 8]));

    h.session.start().expect("login");

    assert_eq!(h.session.state(), SessionState::Authenticated);
    let written = h.codec.written();
    let auth_node = find_written(&written, "auth").expect("auth written");
    assert!(!auth_node.payload_bytes().is_empty());
    assert!(find_written(&written, "response").is_none());
    assert!(h.codec.crypto_enabled());
    assert_eq!(h.session.next_challenge(), &[8, 8, 8]);
}

#[test]
fn expired_account_is_terminal() {
    let mut h = harness(vec![7, 7, 7]);
    let events = h.session.events();
    let mut expired = events.account_expired.subscribe();
    let mut disconnected = events.disconnected.subscribe();

    let node = NodeBuilder::new("success").attr("status", "expired").build();
    h.codec.push_inbound(node);

    let err = h.session.start().expect_err("expired login fails");
    assert!(matches!(err, SessionError::AccountExpired));
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(h.codec.closed());
    assert_eq!(expired.try_recv().expect("expired event").reason, "Login");
    assert!(disconnected.try_recv().is_ok());
}

#[test]
fn unexpected_handshake_node_fails_auth() {
    let mut h = harness(vec![7, 7, 7]);
    let events = h.session.events();
    let mut auth_failed = events.auth_failed.subscribe();
    let mut disconnected = events.disconnected.subscribe();

    h.codec.push_inbound(Node::new("failure"));

    let err = h.session.start().expect_err("login fails");
    assert!(matches!(err, SessionError::AuthFailed(_)));
    assert!(auth_failed.try_recv().is_ok());
    assert!(disconnected.try_recv().is_ok());
    assert_eq!(h.session.state(), SessionState::Disconnected);
}

#[test]
fn liveness_threshold_is_905_seconds() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut disconnected = events.disconnected.subscribe();

    let base = h.session.last_activity();
    h.session.check_activity_at(base + 900);
    assert_eq!(h.session.state(), SessionState::Authenticated);
    assert!(disconnected.try_recv().is_err());

    h.session.check_activity_at(base + 906);
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(disconnected.try_recv().is_ok());
}

#[test]
fn inbound_text_message_emits_event_and_receipt() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut received = events.message_received.subscribe();

    let body = Node::with_payload("body", b"hola".to_vec());
    let node = NodeBuilder::new("message")
        .attr("id", "msg-1")
        .attr("from", "56911112222@s.whatsapp.net")
        .attr("t", "1357001234")
        .attr("type", "text")
        .attr("notify", "Alice")
        .child(body)
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let message = received.try_recv().expect("message event");
    assert_eq!(message.key.remote_jid, "56911112222@s.whatsapp.net");
    assert!(!message.key.from_me);
    assert_eq!(message.data, b"hola".to_vec());
    assert_eq!(message.notify_name, "Alice");
    assert_eq!(message.kind, MessageKind::Text);

    let written = h.codec.written();
    let receipt = find_written(&written, "receipt").expect("receipt written");
    assert_eq!(receipt.attr("to"), Some("56911112222@s.whatsapp.net"));
    assert_eq!(receipt.attr("id"), Some("msg-1"));

    assert_eq!(h.counters.received(CounterKind::MessageCount), 1);
    assert!(h.counters.received(CounterKind::MessageBytes) > 0);
}

#[test]
fn offline_message_keeps_server_timestamp() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut received = events.message_received.subscribe();

    let node = NodeBuilder::new("message")
        .attr("id", "msg-2")
        .attr("from", "56911112222@s.whatsapp.net")
        .attr("t", "1357001234")
        .attr("offline", "1")
        .attr("type", "text")
        .child(Node::with_payload("body", b"backlog".to_vec()))
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let message = received.try_recv().expect("message event");
    assert!(message.offline);
    assert_eq!(message.timestamp, 1357001234);
}

#[test]
fn delivery_receipt_resolves_pending_message() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut updates = events.message_status_update.subscribe();

    let outgoing = Message::outgoing("56911112222@s.whatsapp.net", b"hi".to_vec());
    let key = outgoing.key.clone();
    h.session.send_message(&outgoing).expect("send");
    assert!(h.store.contains(&key));

    let node = NodeBuilder::new("message")
        .attr("id", &key.id)
        .attr("from", "56911112222@s.whatsapp.net")
        .attr("type", "text")
        .child(Node::new("received"))
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let update = updates.try_recv().expect("status update");
    assert_eq!(update.jid, "56911112222@s.whatsapp.net");
    assert_eq!(update.id, key.id);
    assert_eq!(update.status, MessageStatus::ReceivedByTarget);
    assert!(!h.store.contains(&key));

    // An untyped receipt is acked as "delivered".
    let written = h.codec.written();
    let ack_message = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.tag == "message" && n.get_child("ack").is_some())
        .expect("delivered ack");
    let ack = ack_message.get_child("ack").unwrap();
    assert_eq!(ack.attr("xmlns"), Some("urn:xmpp:receipts"));
    assert_eq!(ack.attr("type"), Some("delivered"));
}

#[test]
fn voice_note_stays_pending_until_played() {
    let mut h = authenticated();

    let mut note = Message::outgoing("56911112222@s.whatsapp.net", Vec::new());
    note.kind = MessageKind::Media;
    note.live = true;
    let key = note.key.clone();
    h.store.put(note);

    let receipt = |receipt_type: &str| {
        NodeBuilder::new("message")
            .attr("id", &key.id)
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "media")
            .child(
                NodeBuilder::new("received")
                    .attr_non_empty("type", receipt_type)
                    .build(),
            )
            .build()
    };

    h.codec.push_inbound(receipt(""));
    h.session.on_readable().expect("dispatch");
    // Delivered but not played, the voice note stays pending.
    assert!(h.store.contains(&key));

    h.codec.push_inbound(receipt("played"));
    h.session.on_readable().expect("dispatch");
    assert!(!h.store.contains(&key));
}

#[test]
fn broadcast_receipt_credits_participant() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut updates = events.message_status_update.subscribe();

    let node = NodeBuilder::new("receipt")
        .attr("from", "1357000000@broadcast")
        .attr("id", "msg-9")
        .attr("type", "played")
        .attr("participant", "56911112222@s.whatsapp.net")
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let update = updates.try_recv().expect("status update");
    assert_eq!(update.jid, "56911112222@s.whatsapp.net");
    assert_eq!(update.status, MessageStatus::Played);

    let written = h.codec.written();
    let ack = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.tag == "ack" && n.attr("class") == Some("receipt"))
        .expect("receipt ack");
    assert_eq!(ack.attr("type"), Some("played"));
    assert_eq!(ack.attr("id"), Some("msg-9"));
}

#[test]
fn last_online_error_codes_become_sentinels() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut last_online = events.last_online.subscribe();

    let error_iq = |code: &str| {
        NodeBuilder::new("iq")
            .attr("id", "last_1")
            .attr("type", "error")
            .attr("from", "56911112222@s.whatsapp.net")
            .child(NodeBuilder::new("error").attr("code", code).build())
            .build()
    };

    h.codec.push_inbound(error_iq("405"));
    h.codec.push_inbound(error_iq("401"));
    h.session.on_readable().expect("dispatch");

    assert_eq!(last_online.try_recv().expect("hidden").timestamp, -1);
    assert_eq!(last_online.try_recv().expect("blocked").timestamp, -2);
}

#[test]
fn photo_errors_become_hidden_and_empty_sentinels() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut photos = events.photo_received.subscribe();

    let error_iq = |code: &str| {
        NodeBuilder::new("iq")
            .attr("id", "get_picture_3")
            .attr("type", "error")
            .attr("from", "56911112222@s.whatsapp.net")
            .child(NodeBuilder::new("error").attr("code", code).build())
            .build()
    };

    h.codec.push_inbound(error_iq("401"));
    h.codec.push_inbound(error_iq("404"));
    h.session.on_readable().expect("dispatch");

    let hidden = photos.try_recv().expect("hidden");
    assert_eq!(hidden.photo_id, "hidden");
    assert!(hidden.data.is_empty());
    assert_eq!(photos.try_recv().expect("empty").photo_id, "empty");
}

#[test]
fn server_ping_is_answered_with_pong() {
    let mut h = authenticated();

    let node = NodeBuilder::new("iq")
        .attr("id", "ping-44")
        .attr("type", "get")
        .attr("xmlns", "urn:xmpp:ping")
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let written = h.codec.written();
    let pong = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.tag == "iq" && n.attr("type") == Some("result"))
        .expect("pong");
    assert_eq!(pong.attr("id"), Some("ping-44"));
    assert_eq!(pong.attr("to"), Some("s.whatsapp.net"));
}

#[test]
fn contacts_notification_acks_with_resync_trigger() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut added = events.contact_added.subscribe();

    let node = NodeBuilder::new("notification")
        .attr("id", "n-1")
        .attr("type", "contacts")
        .attr("from", "56911112222@s.whatsapp.net")
        .child(
            NodeBuilder::new("add")
                .attr("jid", "56933334444@s.whatsapp.net")
                .build(),
        )
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    assert_eq!(
        added.try_recv().expect("contact added").jid,
        "56933334444@s.whatsapp.net"
    );

    let written = h.codec.written();
    let ack = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.tag == "ack" && n.attr("class") == Some("notification"))
        .expect("notification ack");
    assert_eq!(ack.attr("to"), Some("56911112222@s.whatsapp.net"));
    assert_eq!(ack.attr("id"), Some("n-1"));
    let sync = ack.get_child("sync").expect("resync trigger");
    assert_eq!(sync.attr("contacts"), Some("out"));
}

#[test]
fn stream_error_tears_down_with_one_disconnect() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut stream_errors = events.stream_error.subscribe();
    let mut disconnected = events.disconnected.subscribe();

    let node = NodeBuilder::new("stream:error")
        .child(Node::with_payload("text", b"conflict".to_vec()))
        .build();
    h.codec.push_inbound(node);
    h.session.on_readable().expect("dispatch");

    let error = stream_errors.try_recv().expect("stream error event");
    assert_eq!(error.diagnostics, vec!["conflict".to_string()]);
    assert!(disconnected.try_recv().is_ok());
    assert!(disconnected.try_recv().is_err());
    assert_eq!(h.session.state(), SessionState::Disconnected);

    // Explicit disconnect after teardown is a no-op.
    h.session.disconnect();
    assert!(disconnected.try_recv().is_err());
}

#[test]
fn teardown_mid_drain_stops_dispatch() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut received = events.message_received.subscribe();
    let mut disconnected = events.disconnected.subscribe();

    // A stream error with another tree already buffered behind it.
    h.codec.push_inbound(
        NodeBuilder::new("stream:error")
            .child(Node::with_payload("text", b"conflict".to_vec()))
            .build(),
    );
    h.codec.push_inbound(
        NodeBuilder::new("message")
            .attr("id", "late-1")
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "text")
            .child(Node::with_payload("body", b"late".to_vec()))
            .build(),
    );

    let written_before = h.codec.written().len();
    h.session.on_readable().expect("drain");

    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(disconnected.try_recv().is_ok());
    // The late tree is never dispatched: no event after `disconnected` and
    // no receipt written through the closed codec.
    assert!(received.try_recv().is_err());
    assert_eq!(h.codec.written().len(), written_before);
}

#[test]
fn inbound_raw_image_preview_is_base64_reencoded() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut received = events.message_received.subscribe();

    let media = NodeBuilder::new("media")
        .attr("type", "image")
        .attr("url", "https://mms.example.net/img.jpg")
        .attr("file", "img.jpg")
        .attr("size", "2048")
        .attr("mimetype", "image/jpeg")
        .attr("width", "640")
        .attr("height", "480")
        .attr("encoding", "raw")
        .payload(vec![0xff, 0xd8, 0xff])
        .build();
    h.codec.push_inbound(
        NodeBuilder::new("message")
            .attr("id", "msg-7")
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "media")
            .child(media)
            .build(),
    );
    h.session.on_readable().expect("dispatch");

    let message = received.try_recv().expect("message event");
    assert_eq!(message.kind, MessageKind::Media);
    assert_eq!(message.media_kind, MediaKind::Image);
    assert_eq!(message.media_url, "https://mms.example.net/img.jpg");
    assert_eq!(message.media_name, "img.jpg");
    assert_eq!(message.media_size, 2048);
    assert_eq!(message.media_mime_type, "image/jpeg");
    assert_eq!(message.media_width, 640);
    assert_eq!(message.media_height, 480);
    assert!(!message.live);
    // Raw preview bytes come back printable.
    assert_eq!(message.data, b"/9j/".to_vec());
}

#[test]
fn inbound_media_shapes_carry_their_fields() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut received = events.message_received.subscribe();

    let location = NodeBuilder::new("media")
        .attr("type", "location")
        .attr("name", "Plaza de Armas")
        .attr("latitude", "-33.4378")
        .attr("longitude", "-70.6504")
        .build();
    h.codec.push_inbound(
        NodeBuilder::new("message")
            .attr("id", "msg-8")
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "media")
            .child(location)
            .build(),
    );

    let vcard = NodeBuilder::new("vcard")
        .attr("name", "Bob")
        .payload(b"BEGIN:VCARD".to_vec())
        .build();
    let contact = NodeBuilder::new("media").attr("type", "vcard").child(vcard).build();
    h.codec.push_inbound(
        NodeBuilder::new("message")
            .attr("id", "msg-9")
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "media")
            .child(contact)
            .build(),
    );

    let voice = NodeBuilder::new("media")
        .attr("type", "audio")
        .attr("url", "https://mms.example.net/note.ogg")
        .attr("file", "note.ogg")
        .attr("size", "512")
        .attr("mimetype", "audio/ogg")
        .attr("duration", "7")
        .attr("origin", "live")
        .build();
    h.codec.push_inbound(
        NodeBuilder::new("message")
            .attr("id", "msg-10")
            .attr("from", "56911112222@s.whatsapp.net")
            .attr("type", "media")
            .child(voice)
            .build(),
    );
    h.session.on_readable().expect("dispatch");

    let location = received.try_recv().expect("location event");
    assert_eq!(location.media_kind, MediaKind::Location);
    assert_eq!(location.media_name, "Plaza de Armas");
    assert!((location.latitude + 33.4378).abs() < 1e-9);
    assert!((location.longitude + 70.6504).abs() < 1e-9);

    let contact = received.try_recv().expect("contact event");
    assert_eq!(contact.media_kind, MediaKind::Contact);
    assert_eq!(contact.media_name, "Bob");
    assert_eq!(contact.data, b"BEGIN:VCARD".to_vec());

    let voice = received.try_recv().expect("voice note event");
    assert_eq!(voice.media_kind, MediaKind::Audio);
    assert_eq!(voice.media_duration_seconds, 7);
    assert!(voice.live);
}

#[test]
fn upload_replies_resolve_pending_media() {
    let mut h = authenticated();
    let events = h.session.events();
    let mut accepted = events.media_upload_accepted.subscribe();

    // The server already has this video; the duplicate reply fills in the
    // canonical url and metadata.
    let mut video = Message::with_key(Key::new("s.whatsapp.net", true, "up-1"));
    video.kind = MessageKind::Media;
    video.media_kind = MediaKind::Video;
    h.store.put(video);

    let duplicate = NodeBuilder::new("duplicate")
        .attr("url", "https://mms.example.net/clip.mp4")
        .attr("mimetype", "video/mp4")
        .attr("duration", "12")
        .attr("width", "320")
        .attr("height", "240")
        .build();
    h.codec.push_inbound(
        NodeBuilder::new("iq")
            .attr("id", "up-1")
            .attr("type", "result")
            .attr("from", "s.whatsapp.net")
            .child(duplicate)
            .build(),
    );
    h.session.on_readable().expect("dispatch");

    let resolved = accepted.try_recv().expect("upload resolution");
    assert_eq!(resolved.status, MessageStatus::Uploaded);
    assert_eq!(resolved.media_url, "https://mms.example.net/clip.mp4");
    assert_eq!(resolved.media_mime_type, "video/mp4");
    assert_eq!(resolved.media_duration_seconds, 12);
    assert_eq!(resolved.media_width, 320);
    assert_eq!(resolved.media_height, 240);
    assert!(!h.store.contains(&Key::new("s.whatsapp.net", true, "up-1")));

    // A fresh slot grant leaves the message waiting for the actual upload.
    let mut image = Message::with_key(Key::new("s.whatsapp.net", true, "up-2"));
    image.kind = MessageKind::Media;
    image.media_kind = MediaKind::Image;
    h.store.put(image);
    h.codec.push_inbound(
        NodeBuilder::new("iq")
            .attr("id", "up-2")
            .attr("type", "result")
            .attr("from", "s.whatsapp.net")
            .child(
                NodeBuilder::new("media")
                    .attr("url", "https://mms.example.net/slot")
                    .build(),
            )
            .build(),
    );
    h.session.on_readable().expect("dispatch");

    let granted = accepted.try_recv().expect("upload slot");
    assert_eq!(granted.status, MessageStatus::Uploading);
    assert_eq!(granted.media_url, "https://mms.example.net/slot");
}

#[test]
fn outgoing_text_is_stored_escaped_and_counted() {
    let mut h = authenticated();

    let message = Message::outgoing("broadcast", b"1 &lt; 2<br />ok".to_vec());
    let mut message = message;
    message.broadcast_jids = vec![
        "56911112222@s.whatsapp.net".to_string(),
        "56933334444@s.whatsapp.net".to_string(),
    ];
    h.session.send_message(&message).expect("send");

    assert!(h.store.contains(&message.key));
    let written = h.codec.written();
    let stanza = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.tag == "message" && n.get_child("body").is_some())
        .expect("message stanza");
    assert_eq!(stanza.attr("type"), Some("text"));
    assert_eq!(
        stanza.get_child("body").unwrap().payload_bytes(),
        b"1 < 2\nok"
    );
    // Broadcast recipients are expanded into the stanza.
    let recipients = stanza.get_child("broadcast").expect("broadcast list");
    assert_eq!(recipients.children_by_tag("to").count(), 2);
    // The jabber:x:event marker closes the stanza.
    assert!(stanza.get_child("x").is_some());

    assert_eq!(h.counters.sent(CounterKind::MessageCount), 1);
    assert!(h.counters.sent(CounterKind::MessageBytes) > 0);
}

#[test]
fn request_ids_carry_prefix_and_hex_counter() {
    let mut h = authenticated();
    h.session.send_ping().expect("ping");
    h.session.send_get_privacy_list().expect("privacy");

    let written = h.codec.written();
    let ping_iq = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.get_child("ping").is_some())
        .expect("ping iq");
    let ping_id = ping_iq.attr("id").unwrap();
    assert!(ping_id.starts_with("ping_"));
    let privacy_iq = written
        .iter()
        .map(|(n, _)| n)
        .find(|n| n.get_child("query").is_some())
        .expect("privacy iq");
    assert!(privacy_iq.attr("id").unwrap().starts_with("privacylist_"));

    // Counters are session-wide, so the suffixes keep increasing.
    let ping_seq = u64::from_str_radix(ping_id.trim_start_matches("ping_"), 16).unwrap();
    let privacy_seq = u64::from_str_radix(
        privacy_iq.attr("id").unwrap().trim_start_matches("privacylist_"),
        16,
    )
    .unwrap();
    assert!(privacy_seq > ping_seq);
}
