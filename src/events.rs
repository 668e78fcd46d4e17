// ABOUTME: Inbound frame classification for the realtime event stream
// ABOUTME: Resolves activity pointers into full messages and derives command tokens

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::api::{AttachmentActionRecord, TeamsApi};
use crate::identity::{BotIdentity, Message};
use crate::metrics;

/// Event type carried by frames the bridge cares about.
const CONVERSATION_ACTIVITY: &str = "conversation.activity";

#[derive(Debug, Deserialize)]
struct Frame {
    data: FrameData,
}

#[derive(Debug, Deserialize)]
struct FrameData {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    activity: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Activity {
    verb: String,
    id: String,
    #[serde(default)]
    parent: Option<ActivityParent>,
}

#[derive(Debug, Deserialize)]
struct ActivityParent {
    id: String,
}

/// A classified inbound event, ready for routing.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// A text message, reduced to its command token.
    Command {
        token: String,
        message: Message,
        activity: serde_json::Value,
    },
    /// An interactive card submission plus the message it hangs off.
    CardAction {
        action: AttachmentActionRecord,
        parent: Message,
        activity: serde_json::Value,
    },
}

/// Classify one raw frame.
///
/// The realtime channel only delivers a pointer (the activity id); the full
/// payload is fetched out-of-band through the REST collaborator so the
/// realtime path stays cheap. Malformed or irrelevant frames yield
/// `Ok(None)`; REST resolution failures propagate so the caller can log and
/// drop the frame without tearing the loop down.
pub async fn process_frame(
    api: &dyn TeamsApi,
    identity: &BotIdentity,
    raw: &str,
) -> Result<Option<Dispatch>> {
    let frame: Frame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed realtime frame");
            metrics::record_dropped_frame("malformed");
            return Ok(None);
        }
    };

    if frame.data.event_type != CONVERSATION_ACTIVITY {
        tracing::debug!(event_type = %frame.data.event_type, "Ignoring irrelevant event type");
        metrics::record_dropped_frame("irrelevant");
        return Ok(None);
    }

    let Some(activity_value) = frame.data.activity else {
        tracing::debug!("Dropping activity frame without activity payload");
        metrics::record_dropped_frame("malformed");
        return Ok(None);
    };
    let activity: Activity = match serde_json::from_value(activity_value.clone()) {
        Ok(activity) => activity,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping frame with unparseable activity");
            metrics::record_dropped_frame("malformed");
            return Ok(None);
        }
    };

    match activity.verb.as_str() {
        "post" => {
            let record = api
                .get_message(&activity.id)
                .await
                .context("failed to fetch message for post activity")?;

            if let Some(sender) = record.person_email.as_deref() {
                if identity.is_self(sender) {
                    tracing::debug!("Ignoring message from myself");
                    metrics::record_dropped_frame("self");
                    return Ok(None);
                }
            }

            let raw_text = record.text.clone().unwrap_or_default();
            tracing::info!(
                sender = record.person_email.as_deref().unwrap_or(""),
                text = %raw_text,
                "Message received"
            );
            let message = Message::from_record(api, record).await?;
            let token = command_token(&raw_text, &identity.display_name);
            Ok(Some(Dispatch::Command {
                token,
                message,
                activity: activity_value,
            }))
        }
        "cardAction" => {
            let action = api
                .get_attachment_action(&activity.id)
                .await
                .context("failed to fetch card action payload")?;
            let parent_id = activity
                .parent
                .as_ref()
                .map(|p| p.id.clone())
                .ok_or_else(|| anyhow!("cardAction activity has no parent message id"))?;
            let parent_record = api
                .get_message(&parent_id)
                .await
                .context("failed to fetch card action parent message")?;
            let parent = Message::from_record(api, parent_record).await?;
            Ok(Some(Dispatch::CardAction {
                action,
                parent,
                activity: activity_value,
            }))
        }
        other => {
            tracing::debug!(verb = other, "Ignoring activity verb");
            metrics::record_dropped_frame("irrelevant");
            Ok(None)
        }
    }
}

/// Reduce raw message text to a command token: strip one leading mention of
/// the bot's display name (or its first name-token), lowercase, and drop
/// all whitespace.
pub fn command_token(text: &str, display_name: &str) -> String {
    let trimmed = text.trim();
    let stripped = if !display_name.is_empty() {
        if let Some(rest) = trimmed.strip_prefix(display_name) {
            rest
        } else if let Some(first) = display_name.split_whitespace().next() {
            trimmed.strip_prefix(first).unwrap_or(trimmed)
        } else {
            trimmed
        }
    } else {
        trimmed
    };
    stripped
        .split_whitespace()
        .collect::<String>()
        .to_lowercase()
}
