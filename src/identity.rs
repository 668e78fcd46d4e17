// ABOUTME: Identity model wrapping platform person/room records as comparable value types
// ABOUTME: Every identifier reduces to a canonical string used for equality and serialization

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::api::{MembershipOutcome, MessageRecord, OutgoingMessage, PersonRecord, RoomRecord, TeamsApi};
use crate::error::BridgeError;

/// Something with a stable canonical string representation.
///
/// Two identifiers of the same kind are equal iff their canonical strings
/// match, and the canonical string is what survives a save/reload cycle:
/// rebuilding from it (plus one network round trip to re-fetch the record)
/// must reproduce an equal identifier.
pub trait Identifier {
    fn canonical_string(&self) -> String;
}

// =============================================================================
// Person
// =============================================================================

/// A platform person, lazily backed by its full record.
///
/// The canonical string is the primary email (first in the email list), or
/// empty when the record carries none.
#[derive(Debug, Clone, Default)]
pub struct Person {
    record: PersonRecord,
}

impl Person {
    pub fn from_record(record: PersonRecord) -> Self {
        Self { record }
    }

    /// An unresolved person known only by email. Resolve it with
    /// [`Person::resolve_by_email`] before relying on any other attribute.
    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            record: PersonRecord {
                emails: vec![email.into()],
                ..Default::default()
            },
        }
    }

    /// Wrap the loose id/email attributes that ride along on message and
    /// membership rows.
    pub fn from_parts(id: Option<String>, email: Option<String>) -> Self {
        Self {
            record: PersonRecord {
                id: id.unwrap_or_default(),
                emails: email.into_iter().collect(),
                ..Default::default()
            },
        }
    }

    /// Resolve the first person the platform returns for an email query.
    pub async fn resolve_by_email(api: &dyn TeamsApi, email: &str) -> Result<Self> {
        let matches = api
            .list_people(Some(email), None)
            .await
            .map_err(|_| BridgeError::PersonNotFound {
                query: email.to_string(),
            })?;
        let record = matches
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::PersonNotFound {
                query: email.to_string(),
            })?;
        Ok(Self { record })
    }

    /// Resolve the first person the platform returns for a display-name query.
    pub async fn resolve_by_name(api: &dyn TeamsApi, name: &str) -> Result<Self> {
        let matches = api
            .list_people(None, Some(name))
            .await
            .map_err(|_| BridgeError::PersonNotFound {
                query: name.to_string(),
            })?;
        let record = matches
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::PersonNotFound {
                query: name.to_string(),
            })?;
        Ok(Self { record })
    }

    /// Resolve a person by opaque platform id.
    pub async fn resolve_by_id(api: &dyn TeamsApi, id: &str) -> Result<Self> {
        let record = api
            .get_person(id)
            .await
            .map_err(|_| BridgeError::PersonNotFound {
                query: id.to_string(),
            })?
            .ok_or_else(|| BridgeError::PersonNotFound {
                query: id.to_string(),
            })?;
        Ok(Self { record })
    }

    /// Rebuild a full person from its canonical string (one email lookup).
    pub async fn from_canonical_string(api: &dyn TeamsApi, canonical: &str) -> Result<Self> {
        Self::resolve_by_email(api, canonical).await
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn emails(&self) -> &[String] {
        &self.record.emails
    }

    /// Primary email: first in the list, if any.
    pub fn email(&self) -> Option<&str> {
        self.record.emails.first().map(|s| s.as_str())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.record.display_name.as_deref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.record.created
    }

    pub fn avatar(&self) -> Option<&str> {
        self.record.avatar.as_deref()
    }

    pub fn record(&self) -> &PersonRecord {
        &self.record
    }
}

impl Identifier for Person {
    fn canonical_string(&self) -> String {
        self.email().unwrap_or_default().to_string()
    }
}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_string() == other.canonical_string()
    }
}

impl Eq for Person {}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

impl Serialize for Person {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical_string())
    }
}

impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let canonical = String::deserialize(deserializer)?;
        if canonical.is_empty() {
            Ok(Self::default())
        } else {
            Ok(Self::from_email(canonical))
        }
    }
}

// =============================================================================
// Room
// =============================================================================

/// A platform room, addressed by id or by title.
///
/// Looking up a room that does not exist is not an error: the result is an
/// "empty" room whose `exists()` is false but which still remembers the id
/// or title it was asked for. After any successful construction at least one
/// of id/title is known.
#[derive(Debug, Clone, Default)]
pub struct Room {
    id: Option<String>,
    title: Option<String>,
    room_type: Option<String>,
    created: Option<DateTime<Utc>>,
}

impl Room {
    fn from_record(record: RoomRecord) -> Self {
        Self {
            id: Some(record.id),
            title: record.title,
            room_type: record.room_type,
            created: record.created,
        }
    }

    /// Construct from exactly one of id/title. Supplying both or neither is
    /// a configuration error; a room that does not exist is not.
    pub async fn open(api: &dyn TeamsApi, id: Option<&str>, title: Option<&str>) -> Result<Self> {
        match (id, title) {
            (Some(_), Some(_)) => {
                Err(BridgeError::Configuration("room id and title are mutually exclusive".into())
                    .into())
            }
            (None, None) => {
                Err(BridgeError::Configuration("room id or title is required".into()).into())
            }
            (Some(id), None) => Self::by_id(api, id).await,
            (None, Some(title)) => Self::by_title(api, title).await,
        }
    }

    /// Fetch a room by id. Not-found (and lookup failures, which the
    /// platform does not distinguish reliably) collapse to the empty room.
    pub async fn by_id(api: &dyn TeamsApi, id: &str) -> Result<Self> {
        match api.get_room(id).await {
            Ok(Some(record)) => Ok(Self::from_record(record)),
            Ok(None) => Ok(Self {
                id: Some(id.to_string()),
                ..Default::default()
            }),
            Err(e) => {
                tracing::warn!(room_id = id, error = %e, "Room lookup failed, treating as non-existent");
                Ok(Self {
                    id: Some(id.to_string()),
                    ..Default::default()
                })
            }
        }
    }

    /// Find a room by exact title, adopting the first match.
    pub async fn by_title(api: &dyn TeamsApi, title: &str) -> Result<Self> {
        let rooms = api.list_rooms().await?;
        match rooms.into_iter().find(|r| r.title.as_deref() == Some(title)) {
            Some(record) => Ok(Self::from_record(record)),
            None => Ok(Self {
                title: Some(title.to_string()),
                ..Default::default()
            }),
        }
    }

    /// Resolve a room from a string that may be an id or a title.
    pub async fn query(api: &dyn TeamsApi, id_or_title: &str) -> Result<Self> {
        let room = Self::by_id(api, id_or_title).await?;
        if room.exists() {
            Ok(room)
        } else {
            Self::by_title(api, id_or_title).await
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn room_type(&self) -> Option<&str> {
        self.room_type.as_deref()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// A room exists when the platform has handed us its record.
    pub fn exists(&self) -> bool {
        self.created.is_some()
    }

    /// Create the room if it does not already exist, and post a welcome
    /// message into it.
    pub async fn create(&mut self, api: &dyn TeamsApi) -> Result<()> {
        if self.exists() {
            tracing::debug!(room = %self, "Room already exists, create is a no-op");
            return Ok(());
        }
        let title = self.title.clone().ok_or_else(|| {
            BridgeError::Configuration("cannot create a room without a title".into())
        })?;
        let record = api.create_room(&title).await?;
        api.create_message(OutgoingMessage::to_room(&record.id).text("Welcome to the room!"))
            .await?;
        tracing::debug!(title = %title, room_id = %record.id, "Created room");
        *self = Self::from_record(record);
        Ok(())
    }

    /// Delete the room, then reload by title so this object reflects that
    /// the room no longer exists.
    pub async fn destroy(&mut self, api: &dyn TeamsApi) -> Result<()> {
        if let Some(id) = self.id.clone() {
            api.delete_room(&id).await?;
        }
        tracing::debug!(room = %self, "Deleted room");
        if let Some(title) = self.title.clone() {
            *self = Self::by_title(api, &title).await?;
        } else {
            self.created = None;
        }
        Ok(())
    }

    /// Add a person to the room. Already being a member is fine.
    pub async fn join(&self, api: &dyn TeamsApi, person_id: &str) -> Result<()> {
        let id = self.id.as_deref().ok_or_else(|| {
            BridgeError::RoomDoesNotExist(self.canonical_string())
        })?;
        match api.create_membership(id, person_id).await? {
            MembershipOutcome::Joined(_) => {
                tracing::debug!(room = %self, person_id, "Joined room");
            }
            MembershipOutcome::AlreadyMember => {
                tracing::debug!(room = %self, person_id, "Already a member of room");
            }
        }
        Ok(())
    }

    /// Everyone currently in the room.
    pub async fn occupants(&self, api: &dyn TeamsApi) -> Result<Vec<RoomOccupant>> {
        if !self.exists() {
            return Err(BridgeError::RoomDoesNotExist(self.canonical_string()).into());
        }
        let id = self.id.as_deref().unwrap_or_default();
        let memberships = api.list_memberships(id).await?;
        let occupants: Vec<RoomOccupant> = memberships
            .into_iter()
            .map(|m| RoomOccupant::new(Person::from_parts(m.person_id, m.person_email), self.clone()))
            .collect();
        tracing::debug!(room = %self, count = occupants.len(), "Listed room occupants");
        Ok(occupants)
    }
}

impl Identifier for Room {
    fn canonical_string(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_default()
    }
}

impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_string() == other.canonical_string()
    }
}

impl Eq for Room {}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

impl Serialize for Room {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical_string())
    }
}

/// Decoding yields an unresolved handle carrying the canonical string as its
/// title coordinate. The canonical string does not record whether it came
/// from an id or a title, so equality survives the round trip but resolution
/// state does not; rebuild a live room with [`Room::query`], which tries the
/// string as an id first and then as a title.
impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let canonical = String::deserialize(deserializer)?;
        if canonical.is_empty() {
            Ok(Self::default())
        } else {
            Ok(Self {
                title: Some(canonical),
                ..Default::default()
            })
        }
    }
}

// =============================================================================
// RoomOccupant
// =============================================================================

/// A person bound to a room. Composition, not inheritance: the occupant
/// *holds* a person and a room rather than being either.
#[derive(Debug, Clone)]
pub struct RoomOccupant {
    person: Person,
    room: Room,
}

impl RoomOccupant {
    pub fn new(person: Person, room: Room) -> Self {
        Self { person, room }
    }

    pub fn person(&self) -> &Person {
        &self.person
    }

    pub fn room(&self) -> &Room {
        &self.room
    }
}

impl Identifier for RoomOccupant {
    fn canonical_string(&self) -> String {
        self.person.canonical_string()
    }
}

impl PartialEq for RoomOccupant {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_string() == other.canonical_string()
    }
}

impl Eq for RoomOccupant {}

impl fmt::Display for RoomOccupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

// =============================================================================
// Message
// =============================================================================

/// A fully resolved inbound message: the raw record plus the identity
/// wrappers for its sender and room.
#[derive(Debug, Clone)]
pub struct Message {
    body: String,
    sender: RoomOccupant,
    room: Room,
    parent_id: String,
    record: MessageRecord,
}

impl Message {
    /// Wrap a fetched message record, resolving its room.
    pub async fn from_record(api: &dyn TeamsApi, record: MessageRecord) -> Result<Self> {
        let room = Room::by_id(api, &record.room_id).await?;
        let person = Person::from_parts(record.person_id.clone(), record.person_email.clone());
        let sender = RoomOccupant::new(person, room.clone());
        let parent_id = record.parent_id.clone().unwrap_or_else(|| record.id.clone());
        let body = record
            .markdown
            .clone()
            .or_else(|| record.text.clone())
            .unwrap_or_default();
        Ok(Self {
            body,
            sender,
            room,
            parent_id,
            record,
        })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Raw (unformatted) text, used for command tokenization.
    pub fn text(&self) -> &str {
        self.record.text.as_deref().unwrap_or_default()
    }

    pub fn sender(&self) -> &RoomOccupant {
        &self.sender
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_id(&self) -> &str {
        &self.record.room_id
    }

    /// Parent message id for threading; falls back to the message's own id.
    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn record(&self) -> &MessageRecord {
        &self.record
    }

    pub fn is_direct(&self) -> bool {
        self.record.room_type.as_deref() == Some("direct")
    }

    pub fn is_group(&self) -> bool {
        !self.is_direct()
    }
}

/// The bot's own resolved identity, used for self-origin filtering and
/// mention stripping.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub person: Person,
    emails: HashSet<String>,
    pub display_name: String,
}

impl BotIdentity {
    pub async fn fetch(api: &dyn TeamsApi) -> Result<Self> {
        let record = api.me().await?;
        Ok(Self::from_record(record))
    }

    pub fn from_record(record: PersonRecord) -> Self {
        // Email comparison is case-insensitive against all known addresses.
        let emails = record
            .emails
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        let display_name = record.display_name.clone().unwrap_or_default();
        Self {
            person: Person::from_record(record),
            emails,
            display_name,
        }
    }

    /// True when the given email belongs to the bot itself.
    pub fn is_self(&self, email: &str) -> bool {
        self.emails.contains(&email.to_ascii_lowercase())
    }
}

// =============================================================================
// Tests
// =============================================================================
