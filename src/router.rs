// ABOUTME: Command registry mapping lowercase tokens to handlers plus help text
// ABOUTME: Unknown tokens fall back to the built-in help listing

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::{AttachmentActionRecord, TeamsApi};
use crate::identity::Message;

/// Reserved pseudo-command under which the card-action handler registers.
pub const CARD_ACTION_TOKEN: &str = "cardaction";

/// Everything a command handler gets to work with.
#[derive(Clone)]
pub struct CommandContext {
    pub api: Arc<dyn TeamsApi>,
    pub message: Message,
    /// The raw activity payload from the realtime frame.
    pub activity: serde_json::Value,
}

/// Everything a card-action handler gets to work with.
#[derive(Clone)]
pub struct CardActionContext {
    pub api: Arc<dyn TeamsApi>,
    pub action: AttachmentActionRecord,
    pub parent: Message,
    pub activity: serde_json::Value,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext) -> Result<()>;
}

#[async_trait]
pub trait CardActionHandler: Send + Sync {
    async fn handle(&self, ctx: CardActionContext) -> Result<()>;
}

/// Where a token routes.
#[derive(Clone)]
pub enum Route {
    Handler(Arc<dyn CommandHandler>),
    /// No exact match: the built-in help listing replies in the
    /// originating room.
    Help,
}

struct RegisteredCommand {
    handler: Arc<dyn CommandHandler>,
    help: String,
}

/// Mutable registry of command handlers.
///
/// Registration is expected only during startup, before the dispatch loop
/// begins; the supervisor then shares the router read-only. Registering
/// concurrently with an active loop is unsupported (and the borrow checker
/// will not let you do it through [`crate::supervisor::Bridge`]).
#[derive(Default)]
pub struct CommandRouter {
    commands: BTreeMap<String, RegisteredCommand>,
    card_action: Option<Arc<dyn CardActionHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a token, overwriting any previous
    /// registration for the same token. Empty tokens are rejected with a
    /// warning; the reserved card-action token must go through
    /// [`CommandRouter::register_card_action`].
    pub fn register(&mut self, token: &str, handler: Arc<dyn CommandHandler>, help: &str) {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            tracing::warn!("Ignoring command registration with empty token");
            return;
        }
        if token == CARD_ACTION_TOKEN {
            tracing::warn!(
                "Ignoring registration under reserved token {CARD_ACTION_TOKEN:?}; use register_card_action"
            );
            return;
        }
        tracing::debug!(token = %token, "Registering command");
        self.commands.insert(
            token,
            RegisteredCommand {
                handler,
                help: help.to_string(),
            },
        );
    }

    /// Register the handler for interactive card submissions.
    pub fn register_card_action(&mut self, handler: Arc<dyn CardActionHandler>) {
        tracing::debug!("Registering card action handler");
        self.card_action = Some(handler);
    }

    /// Resolve a token to its handler, falling back to help.
    pub fn route(&self, token: &str) -> Route {
        match self.commands.get(token) {
            Some(registered) => Route::Handler(Arc::clone(&registered.handler)),
            None => Route::Help,
        }
    }

    /// The card-action handler, if one was registered.
    pub fn route_card_action(&self) -> Option<Arc<dyn CardActionHandler>> {
        self.card_action.as_ref().map(Arc::clone)
    }

    /// Help listing of every registered command. The card-action handler is
    /// not a user-invocable command and never appears here.
    pub fn help_text(&self) -> String {
        let mut text = String::from("Here are the available commands:\n");
        for (token, registered) in &self.commands {
            text.push_str(&format!("{} : {}\n", token, registered.help));
        }
        text
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
