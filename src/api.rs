// ABOUTME: Boundary trait and wire records for the Webex Teams REST collaborator
// ABOUTME: The bridge core talks to the platform exclusively through TeamsApi

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Wire records
// =============================================================================

/// A person as returned by the people endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonRecord {
    pub id: String,
    pub emails: Vec<String>,
    pub display_name: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub avatar: Option<String>,
}

/// A room as returned by the rooms endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomRecord {
    pub id: String,
    pub title: Option<String>,
    pub room_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// A message as returned by the messages endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub room_type: Option<String>,
    pub person_id: Option<String>,
    pub person_email: Option<String>,
    pub text: Option<String>,
    pub markdown: Option<String>,
    pub parent_id: Option<String>,
}

/// A room membership row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MembershipRecord {
    pub id: String,
    pub room_id: String,
    pub person_id: Option<String>,
    pub person_email: Option<String>,
}

/// A submitted card action (button press / form submission).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentActionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message_id: Option<String>,
    pub room_id: Option<String>,
    pub person_id: Option<String>,
    pub inputs: serde_json::Value,
}

/// Outbound message payload for `create_message`.
///
/// Exactly one of `room_id` / `to_person_id` should be set. The attachment
/// and file fields exist because they are part of the wire shape; building
/// card layouts is the caller's business.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_person_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl OutgoingMessage {
    pub fn to_room(room_id: impl Into<String>) -> Self {
        Self {
            room_id: Some(room_id.into()),
            ..Default::default()
        }
    }

    pub fn to_person(person_id: impl Into<String>) -> Self {
        Self {
            to_person_id: Some(person_id.into()),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    /// Thread the message under a parent message id.
    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach a card payload (pre-built JSON).
    pub fn attachment(mut self, card: serde_json::Value) -> Self {
        self.attachments.push(card);
        self
    }

    pub fn file(mut self, url: impl Into<String>) -> Self {
        self.files.push(url.into());
        self
    }
}

/// Result of a membership create, which the platform answers with 403/409
/// when the bot is already in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipOutcome {
    Joined(MembershipRecord),
    AlreadyMember,
}

// =============================================================================
// Collaborator trait
// =============================================================================

/// The REST collaborator the bridge depends on.
///
/// This crate does not ship an implementation; the embedding application
/// supplies one (typically a thin wrapper over its HTTP client of choice).
/// Implementations must:
///
/// - return `Ok(None)` from the `get_*` lookups on a 404, reserving `Err`
///   for transport/auth failures,
/// - map 403/409 on `create_membership` to `MembershipOutcome::AlreadyMember`,
/// - treat `delete_url` on an already-deleted resource as success.
///
/// The generic verb methods exist for the device-registration endpoints,
/// which live outside the regular API surface; they must send the same
/// bearer credential as the typed methods.
#[async_trait]
pub trait TeamsApi: Send + Sync {
    /// The bot's own person record.
    async fn me(&self) -> Result<PersonRecord>;

    /// List people filtered by email and/or display name.
    async fn list_people(
        &self,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<Vec<PersonRecord>>;

    async fn get_person(&self, id: &str) -> Result<Option<PersonRecord>>;

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>>;
    async fn get_room(&self, id: &str) -> Result<Option<RoomRecord>>;
    async fn create_room(&self, title: &str) -> Result<RoomRecord>;
    async fn delete_room(&self, id: &str) -> Result<()>;

    async fn list_memberships(&self, room_id: &str) -> Result<Vec<MembershipRecord>>;
    async fn create_membership(&self, room_id: &str, person_id: &str)
        -> Result<MembershipOutcome>;

    async fn get_message(&self, id: &str) -> Result<MessageRecord>;
    async fn create_message(&self, message: OutgoingMessage) -> Result<MessageRecord>;
    async fn delete_message(&self, id: &str) -> Result<()>;

    async fn get_attachment_action(&self, id: &str) -> Result<AttachmentActionRecord>;

    /// Authenticated GET against an absolute URL, returning raw JSON.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value>;

    /// Authenticated POST of a JSON body against an absolute URL.
    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value>;

    /// Authenticated DELETE against an absolute URL. Idempotent.
    async fn delete_url(&self, url: &str) -> Result<()>;
}
