// ABOUTME: Root library module for the Webex Teams realtime bridge
// ABOUTME: Wires device registration, the realtime session, and command dispatch together

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod identity;
pub mod metrics;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod supervisor;


// Convenience re-exports for embedding applications
pub use api::{OutgoingMessage, TeamsApi};
pub use config::Config;
pub use error::BridgeError;
pub use identity::{BotIdentity, Identifier, Message, Person, Room, RoomOccupant};
pub use reconnect::{BackoffConfig, RestartPolicy};
pub use router::{
    CardActionContext, CardActionHandler, CommandContext, CommandHandler, CommandRouter,
};
pub use supervisor::{Bridge, BridgeState};
