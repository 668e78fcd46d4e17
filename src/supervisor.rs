// ABOUTME: Dispatch supervisor running the register/connect/authenticate/listen loop
// ABOUTME: Restarts the whole sequence on any failure and offloads handlers to workers

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::api::{OutgoingMessage, TeamsApi};
use crate::config::DEFAULT_DEVICE_NAME;
use crate::device::DeviceRegistrar;
use crate::error::BridgeError;
use crate::events::{self, Dispatch};
use crate::identity::BotIdentity;
use crate::metrics;
use crate::reconnect::RestartPolicy;
use crate::router::{
    CardActionContext, CardActionHandler, CommandContext, CommandHandler, CommandRouter, Route,
};
use crate::session::{self, RealtimeTransport, WebSocketTransport};

/// Where the supervisor currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    RegisteringDevice,
    Connecting,
    Authenticating,
    Listening,
    Dispatching,
}

/// The bridge: owns the collaborators, the command registry, and the
/// supervisor loop.
///
/// Register all handlers before calling [`Bridge::run`]; the registry is
/// read-only while the loop is active.
pub struct Bridge {
    api: Arc<dyn TeamsApi>,
    transport: Arc<dyn RealtimeTransport>,
    token: String,
    router: CommandRouter,
    registrar: DeviceRegistrar,
    restart_policy: RestartPolicy,
    state_tx: watch::Sender<BridgeState>,
}

impl Bridge {
    pub fn new(api: Arc<dyn TeamsApi>, token: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Disconnected);
        Self {
            api,
            transport: Arc::new(WebSocketTransport),
            token: token.into(),
            router: CommandRouter::new(),
            registrar: DeviceRegistrar::new(DEFAULT_DEVICE_NAME),
            restart_policy: RestartPolicy::Immediate,
            state_tx,
        }
    }

    /// Substitute the realtime transport (tests, proxies).
    pub fn with_transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Register the device under a different name.
    pub fn with_device_name(mut self, device_name: &str) -> Self {
        self.registrar = DeviceRegistrar::new(device_name);
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Register a command handler with its help text.
    pub fn register(&mut self, token: &str, handler: Arc<dyn CommandHandler>, help: &str) {
        self.router.register(token, handler, help);
    }

    /// Register the card-action handler.
    pub fn register_card_action(&mut self, handler: Arc<dyn CardActionHandler>) {
        self.router.register_card_action(handler);
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Observe supervisor state transitions.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: BridgeState) {
        tracing::debug!(?state, "Bridge state transition");
        let _ = self.state_tx.send(state);
    }

    /// Run the supervisor until `shutdown` flips to true.
    ///
    /// Failure before the first successful listen is fatal when it is a
    /// device-registration failure - there is no service without a realtime
    /// endpoint. Every later failure restarts the loop from device
    /// registration, paced by the restart policy.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut schedule = self.restart_policy.schedule();
        let mut ever_listened = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once(&mut shutdown, &mut ever_listened).await {
                Ok(()) => break,
                Err(e) => {
                    let registration_failure = matches!(
                        e.downcast_ref::<BridgeError>(),
                        Some(BridgeError::DeviceRegistration(_))
                    );
                    if registration_failure && !ever_listened {
                        tracing::error!(error = format!("{e:#}"), "Device registration failed at startup, aborting");
                        self.set_state(BridgeState::Disconnected);
                        return Err(e);
                    }

                    // A pass that made it to listening resets the pacing.
                    if *self.state_tx.borrow() == BridgeState::Listening {
                        schedule.record_success();
                    }
                    metrics::record_restart();
                    tracing::error!(error = format!("{e:#}"), "Bridge loop failed, restarting");
                    self.set_state(BridgeState::Disconnected);

                    let Some(delay) = schedule.next_delay() else {
                        return Err(e).context("restart budget exhausted");
                    };
                    if !delay.is_zero() {
                        tracing::info!(?delay, "Waiting before reconnect");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
            }
        }

        tracing::info!("Shutdown signal received, stopping bridge");
        self.set_state(BridgeState::Disconnected);
        Ok(())
    }

    /// One pass through the state machine. Returns `Ok(())` only on
    /// shutdown; every failure (including a clean remote close) is an `Err`
    /// so the caller restarts.
    async fn run_once(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        ever_listened: &mut bool,
    ) -> Result<()> {
        self.set_state(BridgeState::RegisteringDevice);
        let identity = BotIdentity::fetch(self.api.as_ref())
            .await
            .context("failed to fetch own identity")?;
        let endpoint = self.registrar.ensure_device(self.api.as_ref()).await?;

        self.set_state(BridgeState::Connecting);
        let mut conn = self.transport.connect(&endpoint).await?;

        self.set_state(BridgeState::Authenticating);
        session::authenticate(conn.as_mut(), &self.token).await?;

        self.set_state(BridgeState::Listening);
        *ever_listened = true;
        tracing::info!(bot = %identity.display_name, "Listening for realtime activity");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                frame = conn.recv() => {
                    match frame? {
                        None => {
                            return Err(BridgeError::Transport(
                                "realtime connection closed".into(),
                            )
                            .into());
                        }
                        Some(text) => self.dispatch_frame(&identity, text).await,
                    }
                }
            }
        }
    }

    /// Classify one frame and hand it to a worker. Per-message failures are
    /// logged and dropped; they never tear down the receive loop.
    async fn dispatch_frame(&self, identity: &BotIdentity, text: String) {
        metrics::record_frame();
        match events::process_frame(self.api.as_ref(), identity, &text).await {
            Ok(Some(dispatch)) => {
                self.set_state(BridgeState::Dispatching);
                self.spawn_dispatch(dispatch);
                self.set_state(BridgeState::Listening);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = format!("{e:#}"), "Failed to resolve realtime activity");
            }
        }
    }

    /// Run the matched handler on its own worker so a slow or failing
    /// handler cannot stall frame reception. Workers are fire-and-forget;
    /// a handler that never returns leaks its worker.
    fn spawn_dispatch(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Command {
                token,
                message,
                activity,
            } => {
                metrics::record_command(&token);
                let ctx = CommandContext {
                    api: Arc::clone(&self.api),
                    message,
                    activity,
                };
                match self.router.route(&token) {
                    Route::Handler(handler) => {
                        tracing::debug!(token = %token, "Dispatching command");
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle(ctx).await {
                                tracing::error!(
                                    error = format!("{e:#}"),
                                    "Command handler failed"
                                );
                            }
                        });
                    }
                    Route::Help => {
                        tracing::debug!(token = %token, "No handler, replying with help");
                        let help = self.router.help_text();
                        tokio::spawn(async move {
                            if let Err(e) = send_help(&ctx, &help).await {
                                tracing::error!(error = format!("{e:#}"), "Help reply failed");
                            }
                        });
                    }
                }
            }
            Dispatch::CardAction {
                action,
                parent,
                activity,
            } => match self.router.route_card_action() {
                Some(handler) => {
                    metrics::record_card_action();
                    let ctx = CardActionContext {
                        api: Arc::clone(&self.api),
                        action,
                        parent,
                        activity,
                    };
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(ctx).await {
                            tracing::error!(
                                error = format!("{e:#}"),
                                "Card action handler failed"
                            );
                        }
                    });
                }
                None => {
                    tracing::debug!("No card action handler registered, dropping card action");
                }
            },
        }
    }
}

/// Built-in help: enumerate the registered commands in the originating room.
async fn send_help(ctx: &CommandContext, help: &str) -> Result<()> {
    ctx.api
        .create_message(OutgoingMessage::to_room(ctx.message.room_id()).text(help))
        .await?;
    Ok(())
}
