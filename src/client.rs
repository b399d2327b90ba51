//! Hub client facade
//!
//! `HubClient` owns one session: a state machine plus exactly one transport.
//! A single async mutex guards state transitions and every transport call, so
//! sends reach the link in call order and never race a teardown.
//!
//! Inbound frames are polled by a listener task in bounded slices, decoded,
//! and queued on a channel. A separate dispatcher task drains the queue and
//! invokes the registered handlers in arrival order, never while the session
//! lock is held.

use std::sync::{Arc, Mutex as StdMutex, RwLock};

use hub_shared::message::{decode_body, encode_body, Message, WireFormat};
use hub_shared::state_machine::{SessionEvent, SessionState, SessionStateMachine};
use hub_shared::{Alert, Command, DeviceConfig, Registration, SensorData};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{self, LinkTimeouts, Transport, TransportKind, TransportSettings};

/// Handler for alerts pushed by the hub
pub type AlertHandler = Arc<dyn Fn(&Alert) + Send + Sync>;

/// Handler for commands pushed by the hub
pub type CommandHandler = Arc<dyn Fn(&Command) + Send + Sync>;

/// Inbound events buffered ahead of the handlers
const INBOUND_QUEUE_DEPTH: usize = 100;

/// Decoded inbound message awaiting dispatch
#[derive(Debug, Clone)]
enum InboundEvent {
    Alert(Alert),
    Command(Command),
}

struct Session {
    fsm: SessionStateMachine,
    transport: Box<dyn Transport>,
}

impl Session {
    /// Record a dead link and release the transport
    async fn link_lost(&mut self, reason: String) {
        self.fsm.process_event(SessionEvent::LinkLost { reason });
        self.transport.disconnect().await;
    }
}

#[derive(Default)]
struct Handlers {
    alert: RwLock<Option<AlertHandler>>,
    command: RwLock<Option<CommandHandler>>,
}

impl Handlers {
    fn alert(&self) -> Option<AlertHandler> {
        self.alert.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn command(&self) -> Option<CommandHandler> {
        self.command.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct Shared {
    session: Mutex<Session>,
    /// Cancelled by `disconnect()`; replaced on every successful connect
    cancel: StdMutex<CancellationToken>,
    handlers: Handlers,
    format: WireFormat,
}

impl Shared {
    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace_token(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let old = std::mem::replace(
            &mut *self.cancel.lock().unwrap_or_else(|e| e.into_inner()),
            fresh.clone(),
        );
        old.cancel();
        fresh
    }
}

/// Device-side client for one hub session
pub struct HubClient {
    device: Arc<DeviceConfig>,
    kind: TransportKind,
    shared: Arc<Shared>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl HubClient {
    /// Create a client whose transport is chosen by `settings`
    pub fn new(device: DeviceConfig, settings: &TransportSettings, timeouts: LinkTimeouts) -> Self {
        let transport = transport::build(settings, &device, timeouts);
        Self::with_transport(device, transport)
    }

    /// Create a client over an already-built transport
    pub fn with_transport(device: DeviceConfig, transport: Box<dyn Transport>) -> Self {
        let kind = transport.kind();
        let format = transport.wire_format();

        Self {
            device: Arc::new(device),
            kind,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    fsm: SessionStateMachine::new(),
                    transport,
                }),
                cancel: StdMutex::new(CancellationToken::new()),
                handlers: Handlers::default(),
                format,
            }),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    pub async fn state(&self) -> SessionState {
        self.shared.session.lock().await.fsm.state()
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == SessionState::Connected
    }

    /// Reason of the most recent connect or link failure, if any
    pub async fn last_failure(&self) -> Option<String> {
        self.shared
            .session
            .lock()
            .await
            .fsm
            .last_failure()
            .map(str::to_owned)
    }

    /// Bring the session up: Disconnected/Failed -> Connecting -> Connected | Failed
    ///
    /// Connecting an already connected client is a no-op.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.device.validate()?;

        let mut session = self.shared.session.lock().await;
        if session.fsm.state() == SessionState::Connected {
            return Ok(());
        }

        session.fsm.process_event(SessionEvent::ConnectRequested);
        info!(device_id = %self.device.device_id, transport = %self.kind, "Connecting to hub");

        match session.transport.connect().await {
            Ok(()) => {
                session.fsm.process_event(SessionEvent::Established);
                let token = self.shared.replace_token();
                drop(session);

                info!(device_id = %self.device.device_id, "Session connected");
                self.spawn_inbound(token);
                Ok(())
            }
            Err(e) => {
                session.fsm.process_event(SessionEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                warn!(device_id = %self.device.device_id, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Announce this device to the hub; safe to repeat
    pub async fn register_device(&self) -> Result<(), TransportError> {
        let include_key = self.shared.format == WireFormat::Compact;
        let registration = Registration::from_config(&self.device, include_key);
        self.transmit(Message::Register(registration)).await
    }

    /// Send one telemetry batch; one attempt, no retry
    pub async fn send_telemetry(&self, data: &SensorData) -> Result<(), TransportError> {
        self.transmit(Message::Telemetry(data.clone())).await
    }

    /// Send one alert; one attempt, not deduplicated
    pub async fn send_alert(&self, alert: &Alert) -> Result<(), TransportError> {
        self.transmit(Message::Alert(alert.clone())).await
    }

    /// Install the alert handler, replacing any previous one
    pub fn set_alert_callback<F>(&self, handler: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        *self
            .shared
            .handlers
            .alert
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handler));
    }

    /// Install the command handler, replacing any previous one
    pub fn set_command_callback<F>(&self, handler: F)
    where
        F: Fn(&Command) + Send + Sync + 'static,
    {
        *self
            .shared
            .handlers
            .command
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handler));
    }

    /// Tear down the session and transport; idempotent
    ///
    /// In-flight sends and receives are cancelled first and fail with
    /// `NotConnected`, so this never waits on a stalled link.
    pub async fn disconnect(&self) {
        self.shared.current_token().cancel();

        {
            let mut session = self.shared.session.lock().await;
            let from = session.fsm.state();
            session.transport.disconnect().await;
            session.fsm.process_event(SessionEvent::DisconnectRequested);
            if from != SessionState::Disconnected {
                info!(device_id = %self.device.device_id, "Session {} -> disconnected", from);
            }
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Inbound task ended abnormally");
            }
        }
    }

    async fn transmit(&self, message: Message) -> Result<(), TransportError> {
        let token = self.shared.current_token();
        let kind = message.kind();

        let mut session = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TransportError::NotConnected),
            session = self.shared.session.lock() => session,
        };
        if !session.fsm.can_send() {
            return Err(TransportError::NotConnected);
        }

        let body = encode_body(self.shared.format, &message)?;
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::NotConnected),
            result = session.transport.send(&body) => result,
        };

        match &result {
            Ok(()) => debug!("Sent {} ({} bytes)", kind, body.len()),
            Err(e) if e.is_link_failure() => {
                warn!(error = %e, "Link failed while sending {}", kind);
                session.link_lost(e.to_string()).await;
                token.cancel();
            }
            Err(e) => debug!(error = %e, "Send of {} failed", kind),
        }
        result
    }

    fn spawn_inbound(&self, token: CancellationToken) {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let listener = tokio::spawn(listen(self.shared.clone(), token, tx));
        let dispatcher = tokio::spawn(dispatch(self.shared.clone(), rx));

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|task| !task.is_finished());
        tasks.push(listener);
        tasks.push(dispatcher);
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.shared.current_token().cancel();
    }
}

/// Poll the transport until cancelled or the link dies
async fn listen(shared: Arc<Shared>, token: CancellationToken, events: mpsc::Sender<InboundEvent>) {
    loop {
        let polled = {
            let mut session = tokio::select! {
                _ = token.cancelled() => break,
                session = shared.session.lock() => session,
            };
            if !session.fsm.can_send() {
                break;
            }

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = session.transport.receive() => result,
            };
            match result {
                Ok(polled) => polled,
                Err(e) => {
                    warn!(error = %e, "Inbound link failed");
                    session.link_lost(e.to_string()).await;
                    break;
                }
            }
        };

        let Some(body) = polled else {
            tokio::task::yield_now().await;
            continue;
        };

        let event = match decode_body(shared.format, &body) {
            Ok(Message::Alert(alert)) => InboundEvent::Alert(alert),
            Ok(Message::Command(command)) => InboundEvent::Command(command),
            Ok(other) => {
                debug!("Ignoring inbound {}", other.kind());
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed inbound frame");
                continue;
            }
        };

        let event = match events.try_send(event) {
            Ok(()) => continue,
            Err(TrySendError::Closed(_)) => break,
            Err(TrySendError::Full(event)) => event,
        };
        warn!(depth = INBOUND_QUEUE_DEPTH, "Inbound queue full, waiting on handlers");
        tokio::select! {
            _ = token.cancelled() => break,
            sent = events.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Inbound listener stopped");
}

/// Invoke handlers for queued inbound events, in arrival order
async fn dispatch(shared: Arc<Shared>, mut events: mpsc::Receiver<InboundEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            InboundEvent::Alert(alert) => match shared.handlers.alert() {
                Some(handler) => handler(&alert),
                None => debug!("No alert handler, dropping alert {}", alert.id),
            },
            InboundEvent::Command(command) => match shared.handlers.command() {
                Some(handler) => handler(&command),
                None => debug!("No command handler, dropping command {}", command.id),
            },
        }
    }
}
