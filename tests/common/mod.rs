// ABOUTME: Shared test doubles for the integration tests
// ABOUTME: StubApi fakes the REST collaborator; ScriptedTransport fakes the realtime channel

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use webex_bridge::api::{
    AttachmentActionRecord, MembershipOutcome, MembershipRecord, MessageRecord, OutgoingMessage,
    PersonRecord, RoomRecord, TeamsApi,
};
use webex_bridge::device::DEVICES_URL;
use webex_bridge::session::{RealtimeConnection, RealtimeTransport};
use webex_bridge::BridgeError;

pub const STUB_WS_URL: &str = "wss://stub.realtime.example/ws";

/// Install a test-writer subscriber once per process so bridge logs show up
/// under `--nocapture` and honor `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("webex_bridge=debug")
        }))
        .with_test_writer()
        .try_init();
}

// =============================================================================
// REST collaborator stub
// =============================================================================

#[derive(Default)]
pub struct StubApi {
    rooms: Mutex<Vec<RoomRecord>>,
    messages: Mutex<HashMap<String, MessageRecord>>,
    actions: Mutex<HashMap<String, AttachmentActionRecord>>,
    devices: Mutex<Vec<serde_json::Value>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    device_posts: AtomicUsize,
    fail_device_posts: AtomicBool,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_room(&self, id: &str, title: &str) {
        self.rooms.lock().unwrap().push(RoomRecord {
            id: id.to_string(),
            title: Some(title.to_string()),
            room_type: Some("group".to_string()),
            created: Some(Utc::now()),
        });
    }

    pub fn add_message(&self, record: MessageRecord) {
        self.messages.lock().unwrap().insert(record.id.clone(), record);
    }

    pub fn add_attachment_action(&self, id: &str, inputs: serde_json::Value) {
        self.actions.lock().unwrap().insert(
            id.to_string(),
            AttachmentActionRecord {
                id: id.to_string(),
                kind: Some("submit".to_string()),
                inputs,
                ..Default::default()
            },
        );
    }

    pub fn fail_device_posts(&self) {
        self.fail_device_posts.store(true, Ordering::SeqCst);
    }

    pub fn device_posts(&self) -> usize {
        self.device_posts.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl TeamsApi for StubApi {
    async fn me(&self) -> Result<PersonRecord> {
        Ok(PersonRecord {
            id: "bot-1".to_string(),
            emails: vec!["bot@example.com".to_string()],
            display_name: Some("Help Bot".to_string()),
            ..Default::default()
        })
    }

    async fn list_people(
        &self,
        _email: Option<&str>,
        _display_name: Option<&str>,
    ) -> Result<Vec<PersonRecord>> {
        Ok(Vec::new())
    }

    async fn get_person(&self, _id: &str) -> Result<Option<PersonRecord>> {
        Ok(None)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>> {
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn get_room(&self, id: &str) -> Result<Option<RoomRecord>> {
        Ok(self.rooms.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn create_room(&self, title: &str) -> Result<RoomRecord> {
        let record = RoomRecord {
            id: format!("room-{title}"),
            title: Some(title.to_string()),
            room_type: Some("group".to_string()),
            created: Some(Utc::now()),
        };
        self.rooms.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete_room(&self, id: &str) -> Result<()> {
        self.rooms.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn list_memberships(&self, _room_id: &str) -> Result<Vec<MembershipRecord>> {
        Ok(Vec::new())
    }

    async fn create_membership(
        &self,
        room_id: &str,
        person_id: &str,
    ) -> Result<MembershipOutcome> {
        Ok(MembershipOutcome::Joined(MembershipRecord {
            id: "membership-1".to_string(),
            room_id: room_id.to_string(),
            person_id: Some(person_id.to_string()),
            person_email: None,
        }))
    }

    async fn get_message(&self, id: &str) -> Result<MessageRecord> {
        self.messages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("message {id} not found"))
    }

    async fn create_message(&self, message: OutgoingMessage) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: "sent-message".to_string(),
            room_id: message.room_id.clone().unwrap_or_default(),
            text: message.text.clone(),
            ..Default::default()
        };
        self.sent.lock().unwrap().push(message);
        Ok(record)
    }

    async fn delete_message(&self, id: &str) -> Result<()> {
        self.messages.lock().unwrap().remove(id);
        Ok(())
    }

    async fn get_attachment_action(&self, id: &str) -> Result<AttachmentActionRecord> {
        self.actions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("attachment action {id} not found"))
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        if url != DEVICES_URL {
            bail!("unexpected GET {url}");
        }
        Ok(serde_json::json!({
            "devices": self.devices.lock().unwrap().clone(),
        }))
    }

    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        if url != DEVICES_URL {
            bail!("unexpected POST {url}");
        }
        if self.fail_device_posts.load(Ordering::SeqCst) {
            bail!("device registration rejected");
        }
        self.device_posts.fetch_add(1, Ordering::SeqCst);
        let mut response = body;
        response["url"] = serde_json::json!("https://wdm/devices/self");
        response["webSocketUrl"] = serde_json::json!(STUB_WS_URL);
        self.devices.lock().unwrap().push(response.clone());
        Ok(response)
    }

    async fn delete_url(&self, url: &str) -> Result<()> {
        self.devices
            .lock()
            .unwrap()
            .retain(|d| d["url"].as_str() != Some(url));
        Ok(())
    }
}

// =============================================================================
// Realtime transport script
// =============================================================================

#[derive(Default)]
struct TransportState {
    connect_failures: AtomicUsize,
    closing_connections: AtomicUsize,
    connects: AtomicUsize,
    frames: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<String>>,
}

/// Transport that fails the first N connects, then hands out a connection
/// that replays the queued frames and pends forever.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<TransportState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.connect_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` connections report a clean remote close once their
    /// frame queue drains, instead of staying open.
    pub fn close_next_connections(&self, count: usize) {
        self.state.closing_connections.store(count, Ordering::SeqCst);
    }

    pub fn queue_frame(&self, frame: serde_json::Value) {
        self.state.frames.lock().unwrap().push_back(frame.to_string());
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Every frame sent by the bridge, across all connections.
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RealtimeTransport for ScriptedTransport {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn RealtimeConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let failures = self.state.connect_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.state.connect_failures.store(failures - 1, Ordering::SeqCst);
            return Err(BridgeError::Transport("scripted connect failure".into()).into());
        }
        let closing = self.state.closing_connections.load(Ordering::SeqCst);
        if closing > 0 {
            self.state.closing_connections.store(closing - 1, Ordering::SeqCst);
        }
        Ok(Box::new(ScriptedConnection {
            state: Arc::clone(&self.state),
            close_when_drained: closing > 0,
        }))
    }
}

struct ScriptedConnection {
    state: Arc<TransportState>,
    close_when_drained: bool,
}

#[async_trait]
impl RealtimeConnection for ScriptedConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.state.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        let frame = self.state.frames.lock().unwrap().pop_front();
        match frame {
            Some(frame) => Ok(Some(frame)),
            None if self.close_when_drained => Ok(None),
            // Queue drained: behave like a healthy, quiet connection.
            None => std::future::pending().await,
        }
    }
}

/// Realtime frame for a "post" activity pointing at a message id.
pub fn post_frame(message_id: &str) -> serde_json::Value {
    serde_json::json!({
        "data": {
            "eventType": "conversation.activity",
            "activity": { "verb": "post", "id": message_id },
        }
    })
}

/// Realtime frame for a card action referencing its parent message.
pub fn card_action_frame(action_id: &str, parent_id: &str) -> serde_json::Value {
    serde_json::json!({
        "data": {
            "eventType": "conversation.activity",
            "activity": {
                "verb": "cardAction",
                "id": action_id,
                "parent": { "id": parent_id },
            },
        }
    })
}
