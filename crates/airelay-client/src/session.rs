//! Session controller state machine.
//!
//! The `SessionController` owns the real-time transport lifecycle for one
//! logical request: it validates connect parameters, opens the transport,
//! joins the channel, tracks workflow steps, and guarantees at most one
//! terminal outcome per request. All logic runs on one logical thread;
//! transport callbacks arrive later as [`TransportEvent`]s fed in by the
//! host.
//!
//! Nothing here throws for a reachable application error: every failure mode
//! is an emitted `error` event, a step status, or a returned boolean, because
//! the consumers are UI-reactive adapters that cannot catch exceptions from
//! inside event-driven callbacks.

use airelay_core::{
    Environment, KvStore, Outcome, SessionConfig, StepId, StepPatch, StepStatus, credential,
    outcome, steps,
};
use serde_json::Value;

use crate::{
    assist::{AssistBackend, HttpAssist},
    emitter::{Emitter, Subscription},
    event::{EventKind, SessionEvent},
    store::SessionStore,
    transport::{ChannelHandle, Connector, TransportEvent, classify_join_failure},
};

/// Fixed message for transport-level failures.
pub const TRANSPORT_ERROR_MESSAGE: &str = "Realtime transport error";

/// Fallback when a failure payload carries no extractable message.
const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Display label for the callback stage while the callback is pending.
const BACKEND_WAITING_LABEL: &str = "Waiting for backend callback";

/// Display label for the callback stage when the synchronous workflow made
/// it unnecessary.
const BACKEND_NOT_NEEDED_LABEL: &str = "Backend callback not needed";

/// Nominal duration credited to steps that complete as a side effect of
/// another observation (join grant, terminal receive).
const NOMINAL_STEP_DURATION_MS: u64 = 100;

/// Connection phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No transport open. Initial and resting state.
    Disconnected,
    /// A transport open has been requested.
    Connecting,
    /// The transport is open (channel join pending or complete).
    Connected,
    /// The transport failed.
    Error,
}

/// Parameters for one connect attempt.
///
/// The two deployment variants use different shapes; the enum discriminator
/// keeps their validation paths separate (field presence alone cannot tell
/// them apart, since the bare-credential shape has no channel id at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRequest {
    /// Credential-embedding variant: a self-contained credential carrying
    /// the routing claims.
    Token {
        /// The compact three-part credential.
        credential: String,
    },

    /// Explicit variant: channel id plus a short-lived one-time credential,
    /// both treated as opaque strings.
    Channel {
        /// Channel identifier.
        channel_id: String,
        /// One-time credential.
        credential: String,
        /// Explicit transport address, overriding the configured default.
        transport_address: Option<String>,
        /// Explicit channel name to join instead of the derived one.
        channel_name: Option<String>,
    },
}

/// Read-only snapshot of session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Current connection phase.
    pub phase: ConnectionPhase,
    /// Workflow steps in display order.
    pub steps: Vec<airelay_core::WorkflowStep>,
    /// Most recent payload received on the channel.
    pub last_response: Option<Value>,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// True once a response signaled definitive workflow completion.
    pub completed: bool,
    /// True when a persisted, not-yet-terminal request exists.
    pub has_pending_request: bool,
}

impl SessionSnapshot {
    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Whether a transport open is in flight.
    pub fn is_connecting(&self) -> bool {
        self.phase == ConnectionPhase::Connecting
    }
}

/// Resolved connect parameters after per-variant validation.
struct ResolvedRequest {
    channel_id: String,
    credential: String,
    topic: String,
    url: String,
    persisted_address: Option<String>,
    persisted_name: Option<String>,
}

/// The session state machine.
///
/// Generic over the injected capabilities: time ([`Environment`]), transport
/// ([`Connector`]), and storage ([`KvStore`]). The backend-assist
/// collaborator is optional and object-safe, attached via [`with_assist`].
///
/// [`with_assist`]: SessionController::with_assist
pub struct SessionController<E: Environment, C: Connector, K: KvStore> {
    env: E,
    config: SessionConfig,
    connector: C,
    store: SessionStore<K>,
    assist: Option<Box<dyn AssistBackend>>,
    emitter: Emitter,

    phase: ConnectionPhase,
    steps: Vec<airelay_core::WorkflowStep>,
    last_response: Option<Value>,
    last_error: Option<String>,
    completed: bool,

    channel: Option<C::Handle>,
    pending_topic: Option<String>,
    heartbeat_last: Option<E::Instant>,

    /// Bumped on every accepted connect; stale assist completions are
    /// suppressed by comparing against it.
    generation: u64,
}

impl<E: Environment, C: Connector, K: KvStore> SessionController<E, C, K> {
    /// Create a controller with the given capabilities and configuration.
    ///
    /// When the configuration carries an HTTP base address, the production
    /// [`HttpAssist`] backend is constructed from it; [`with_assist`]
    /// replaces it.
    ///
    /// [`with_assist`]: SessionController::with_assist
    pub fn new(env: E, config: SessionConfig, connector: C, kv: K) -> Self {
        let store = SessionStore::new(kv, config.storage_prefix.clone());
        let assist = config
            .assist_base_url
            .as_deref()
            .map(|base| Box::new(HttpAssist::new(base)) as Box<dyn AssistBackend>);
        Self {
            env,
            config,
            connector,
            store,
            assist,
            emitter: Emitter::new(),
            phase: ConnectionPhase::Disconnected,
            steps: steps::initial(),
            last_response: None,
            last_error: None,
            completed: false,
            channel: None,
            pending_topic: None,
            heartbeat_last: None,
            generation: 0,
        }
    }

    /// Attach a backend-assist collaborator for [`reconnect_with_backend`].
    ///
    /// [`reconnect_with_backend`]: SessionController::reconnect_with_backend
    #[must_use]
    pub fn with_assist(mut self, backend: Box<dyn AssistBackend>) -> Self {
        self.assist = Some(backend);
        self
    }

    /// Whether a backend-assist path is available, from either the configured
    /// HTTP base address or an explicitly attached backend.
    pub fn assist_enabled(&self) -> bool {
        self.assist.is_some()
    }

    /// Register a listener for one event kind. Returns the deregistration
    /// handle.
    pub fn on(
        &mut self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + Send + 'static,
    ) -> Subscription {
        self.emitter.on(kind, listener)
    }

    /// Deregister a listener.
    pub fn off(&mut self, subscription: Subscription) -> bool {
        self.emitter.off(subscription)
    }

    /// Read-only snapshot of the current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            steps: self.steps.clone(),
            last_response: self.last_response.clone(),
            last_error: self.last_error.clone(),
            completed: self.completed,
            has_pending_request: self.has_pending_request(),
        }
    }

    /// True when a persisted, not-yet-terminal request exists.
    pub fn has_pending_request(&self) -> bool {
        if !self.config.persist || self.completed {
            return false;
        }
        self.store.load(self.env.wall_clock_ms(), self.config.staleness_window).is_some()
    }

    /// Start a connect attempt.
    ///
    /// A second call while one is already connecting is dropped, not
    /// deferred. Validation failures emit an `error` event and leave the
    /// transport and persisted state untouched.
    pub fn connect(&mut self, request: &ConnectRequest) {
        if self.phase == ConnectionPhase::Connecting {
            if self.config.debug {
                tracing::info!("connect dropped: attempt already in flight");
            }
            return;
        }

        let resolved = match self.resolve_request(request) {
            Ok(resolved) => resolved,
            Err(message) => {
                self.last_error = Some(message.clone());
                self.emitter.emit(&SessionEvent::Error { message });
                return;
            },
        };

        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;
        self.emitter.emit(&SessionEvent::Connecting);

        self.teardown_resources();

        self.steps = steps::initial();
        self.last_response = None;
        self.last_error = None;
        self.completed = false;

        if self.config.persist {
            self.store.save(
                &resolved.channel_id,
                &resolved.credential,
                resolved.persisted_address.as_deref(),
                resolved.persisted_name.as_deref(),
                self.env.wall_clock_ms(),
            );
        }

        self.apply_step(StepId::Queue, &StepPatch::status(StepStatus::InProgress));
        self.pending_topic = Some(resolved.topic);

        if self.config.debug {
            tracing::info!(url = %resolved.url, channel = %resolved.channel_id, "opening transport");
        }

        match self.connector.open(&resolved.url, &resolved.credential) {
            Ok(handle) => self.channel = Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "transport open failed");
                self.transport_fault();
            },
        }
    }

    /// Feed one asynchronous transport callback into the state machine.
    ///
    /// Callbacks are phase-gated: a connection torn down by a newer connect
    /// may still deliver its close, fault, or final payloads afterwards, and
    /// those must not disturb the attempt now in flight. Payloads are only
    /// accepted while connected; a close is only meaningful once the
    /// connection opened; a fault before the current open resolves is taken
    /// as that open failing.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::JoinAccepted => self.on_join_accepted(),
            TransportEvent::JoinRejected { reason } => self.on_join_rejected(reason),
            TransportEvent::Response(payload) => {
                if self.phase != ConnectionPhase::Connected {
                    tracing::debug!(phase = ?self.phase, "ignoring payload outside a connection");
                    return;
                }
                self.handle_response(payload);
            },
            TransportEvent::WorkflowFailure(payload) => {
                if self.phase != ConnectionPhase::Connected {
                    tracing::debug!(phase = ?self.phase, "ignoring error payload outside a connection");
                    return;
                }
                self.on_workflow_failure(&payload);
            },
            TransportEvent::Faulted { message } => {
                if self.phase == ConnectionPhase::Disconnected {
                    tracing::debug!("ignoring fault from a torn-down connection");
                    return;
                }
                tracing::error!(%message, "transport fault");
                self.transport_fault();
            },
            TransportEvent::Closed { reason } => {
                if !matches!(self.phase, ConnectionPhase::Connected | ConnectionPhase::Error) {
                    tracing::debug!(phase = ?self.phase, "ignoring close from a torn-down connection");
                    return;
                }
                self.phase = ConnectionPhase::Disconnected;
                self.heartbeat_last = None;
                self.emitter.emit(&SessionEvent::Disconnected { reason });
            },
        }
    }

    /// Drive time-based housekeeping (heartbeat).
    ///
    /// The host should call this periodically with the environment's current
    /// time; a heartbeat is pushed whenever a full interval has elapsed
    /// since the last one. Wall-clock jumps (backgrounded hosts) make a
    /// heartbeat fire late; accepted behavior.
    pub fn tick(&mut self, now: E::Instant) {
        let Some(last) = self.heartbeat_last else {
            return;
        };
        if now - last < self.config.heartbeat_interval {
            return;
        }
        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.push("heartbeat", &Value::Null) {
                tracing::debug!(error = %e, "heartbeat push failed");
            }
        }
        self.heartbeat_last = Some(now);
    }

    /// Tear down the transport and clear the persisted record.
    ///
    /// Idempotent, and safe to call before any connect. Does not touch the
    /// stored response, error, steps, or the `completed` flag.
    pub fn disconnect(&mut self) {
        self.teardown();
        if self.config.persist {
            self.store.clear();
        }
        self.emitter.emit(&SessionEvent::Disconnected { reason: Some("manual".to_owned()) });
    }

    /// Disconnect, then clear per-request state back to its defaults.
    pub fn reset(&mut self) {
        self.disconnect();
        self.steps = steps::initial();
        self.last_response = None;
        self.last_error = None;
    }

    /// Reset and drop every registered listener. The controller must not be
    /// reused afterwards.
    pub fn destroy(&mut self) {
        self.reset();
        self.emitter.clear();
    }

    /// Attempt to resume the persisted request after a reload.
    ///
    /// Returns false (with no transport side effects) when persistence is
    /// disabled, the session is already terminal, no usable record exists,
    /// or the record cannot be replayed. Safe to call repeatedly: after a
    /// terminal state every call is a no-op.
    pub fn reconnect(&mut self) -> bool {
        if !self.config.persist {
            return false;
        }
        if self.completed {
            self.store.clear();
            return false;
        }
        if let Some(last) = &self.last_response {
            if outcome::classify(last) == Outcome::Completed {
                self.completed = true;
                self.store.clear();
                return false;
            }
        }

        let Some(record) =
            self.store.load(self.env.wall_clock_ms(), self.config.staleness_window)
        else {
            return false;
        };

        if record.credential.is_empty() {
            // A single-use credential cannot be replayed from storage; the
            // backend-assist path exists for that.
            self.store.clear();
            return false;
        }

        self.connect(&ConnectRequest::Channel {
            channel_id: record.channel_id,
            credential: record.credential,
            transport_address: record.transport_address,
            channel_name: record.channel_name,
        });
        true
    }

    /// Resume via the backend-assist path: ask the attached backend to mint
    /// a fresh credential for the persisted channel, then connect with it.
    ///
    /// Returns false on any failure (no assist backend, no record, HTTP
    /// failure, malformed response) with no further side effects. A
    /// completion that arrives after a newer connect has started is
    /// discarded.
    pub async fn reconnect_with_backend(&mut self) -> bool {
        if !self.config.persist || self.completed {
            return false;
        }
        let Some(record) =
            self.store.load(self.env.wall_clock_ms(), self.config.staleness_window)
        else {
            return false;
        };
        let Some(backend) = self.assist.as_deref() else {
            return false;
        };

        let generation = self.generation;
        let result = backend.fresh_credential(&record.channel_id).await;

        if self.generation != generation {
            if self.config.debug {
                tracing::info!("discarding stale assist completion");
            }
            return false;
        }

        let grant = match result {
            Ok(grant) => grant,
            Err(e) => {
                tracing::error!(error = %e, "backend-assisted reconnect failed");
                return false;
            },
        };

        self.store.save(
            &grant.channel_id,
            &grant.credential,
            grant.transport_address.as_deref(),
            grant.channel_name.as_deref(),
            self.env.wall_clock_ms(),
        );
        self.connect(&ConnectRequest::Channel {
            channel_id: grant.channel_id,
            credential: grant.credential,
            transport_address: grant.transport_address,
            channel_name: grant.channel_name,
        });
        true
    }

    fn resolve_request(&self, request: &ConnectRequest) -> Result<ResolvedRequest, String> {
        match request {
            ConnectRequest::Token { credential } => {
                if credential.trim().is_empty() {
                    return Err("Credential is required".to_owned());
                }
                let claims = credential::parse(credential).map_err(|e| e.to_string())?;
                if credential::is_expired(&claims, self.env.wall_clock_ms()) {
                    return Err("Credential is expired".to_owned());
                }
                Ok(ResolvedRequest {
                    channel_id: claims.channel_id,
                    credential: credential.clone(),
                    url: self.config.transport_url.clone(),
                    persisted_address: None,
                    // Persist the derived topic so a resumed session joins
                    // the same channel name.
                    persisted_name: Some(claims.topic.clone()),
                    topic: claims.topic,
                })
            },
            ConnectRequest::Channel { channel_id, credential, transport_address, channel_name } => {
                if channel_id.trim().is_empty() || credential.trim().is_empty() {
                    return Err("Channel id and credential are required".to_owned());
                }
                let topic =
                    channel_name.clone().unwrap_or_else(|| format!("ai:{channel_id}"));
                let url =
                    transport_address.clone().unwrap_or_else(|| self.config.transport_url.clone());
                Ok(ResolvedRequest {
                    channel_id: channel_id.clone(),
                    credential: credential.clone(),
                    topic,
                    url,
                    persisted_address: transport_address.clone(),
                    persisted_name: channel_name.clone(),
                })
            },
        }
    }

    fn on_opened(&mut self) {
        if self.phase != ConnectionPhase::Connecting {
            tracing::debug!(phase = ?self.phase, "ignoring transport open outside a connect");
            return;
        }
        self.phase = ConnectionPhase::Connected;
        self.emitter.emit(&SessionEvent::Connected);

        let Some(topic) = self.pending_topic.clone() else {
            return;
        };
        let join_result = match self.channel.as_mut() {
            Some(channel) => channel.join(&topic),
            None => Ok(()),
        };
        if let Err(e) = join_result {
            tracing::error!(error = %e, "channel join request failed");
            self.transport_fault();
        }
    }

    fn on_join_accepted(&mut self) {
        self.apply_step(
            StepId::Queue,
            &StepPatch::finished(StepStatus::Success, NOMINAL_STEP_DURATION_MS),
        );
        self.apply_step(StepId::Process, &StepPatch::status(StepStatus::InProgress));
        self.apply_step(StepId::Receive, &StepPatch::status(StepStatus::InProgress));
        self.heartbeat_last = Some(self.env.now());
        self.emitter.emit(&SessionEvent::ChannelJoined);
    }

    fn on_join_rejected(&mut self, reason: String) {
        let message = classify_join_failure(&reason);
        self.last_error = Some(message.clone());
        self.apply_step(StepId::Queue, &StepPatch::failed(message.clone()));
        self.emitter.emit(&SessionEvent::Error { message });
        // Transport stays open; the caller may retry the join.
        self.emitter.emit(&SessionEvent::ChannelError { reason });
    }

    fn on_workflow_failure(&mut self, payload: &Value) {
        let message = outcome::failure_message(payload)
            .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_owned());
        self.last_error = Some(message.clone());
        self.apply_step(StepId::Process, &StepPatch::failed(message.clone()));
        if self.config.persist {
            self.store.clear();
        }
        self.emitter.emit(&SessionEvent::Error { message });
    }

    /// Handle one inbound response payload.
    ///
    /// Idempotent against duplicate terminal payloads: once `completed` is
    /// set, further payloads are dropped.
    fn handle_response(&mut self, payload: Value) {
        if self.completed {
            tracing::debug!("dropping payload after terminal outcome");
            return;
        }

        match outcome::classify(&payload) {
            Outcome::AiGenerated { duration_ms } => {
                self.apply_step(StepId::Process, &StepPatch {
                    status: Some(StepStatus::Success),
                    duration_ms,
                    ..StepPatch::default()
                });
                self.steps = steps::ensure_backend(&self.steps, BACKEND_WAITING_LABEL);
                self.apply_step(StepId::Backend, &StepPatch {
                    status: Some(StepStatus::InProgress),
                    label: Some(BACKEND_WAITING_LABEL.to_owned()),
                    ..StepPatch::default()
                });
                self.last_response = Some(payload.clone());
                // Not terminal: persisted record and transport both stay.
                self.emitter.emit(&SessionEvent::Response { payload });
            },
            Outcome::Completed => {
                self.apply_step(StepId::Process, &StepPatch::status(StepStatus::Success));
                self.apply_step(StepId::Backend, &StepPatch::status(StepStatus::Success));
                self.apply_step(
                    StepId::Receive,
                    &StepPatch::finished(StepStatus::Success, NOMINAL_STEP_DURATION_MS),
                );
                self.apply_step(StepId::Complete, &StepPatch::status(StepStatus::Success));
                self.finish_terminal(payload);
            },
            Outcome::Success { duration_ms } => {
                if self.steps.iter().any(|s| s.id == StepId::Backend) {
                    self.apply_step(StepId::Backend, &StepPatch {
                        status: Some(StepStatus::Success),
                        label: Some(BACKEND_NOT_NEEDED_LABEL.to_owned()),
                        ..StepPatch::default()
                    });
                }
                self.apply_step(StepId::Process, &StepPatch {
                    status: Some(StepStatus::Success),
                    duration_ms,
                    ..StepPatch::default()
                });
                self.apply_step(
                    StepId::Receive,
                    &StepPatch::finished(StepStatus::Success, NOMINAL_STEP_DURATION_MS),
                );
                self.apply_step(StepId::Complete, &StepPatch::status(StepStatus::Success));
                self.finish_terminal(payload);
            },
            Outcome::Failure { message } => {
                let message = message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_owned());
                self.apply_step(StepId::Process, &StepPatch::failed(message.clone()));
                self.apply_step(StepId::Receive, &StepPatch::status(StepStatus::Error));
                self.apply_step(StepId::Complete, &StepPatch::status(StepStatus::Error));
                self.last_error = Some(message);
                self.finish_terminal(payload);
            },
        }
    }

    /// Common tail of every terminal outcome: record the payload, clear the
    /// persisted record *before* emitting (so a listener-triggered reconnect
    /// cannot race a stale record), then tear the transport down.
    fn finish_terminal(&mut self, payload: Value) {
        self.last_response = Some(payload.clone());
        self.completed = true;
        if self.config.persist {
            self.store.clear();
        }
        self.emitter.emit(&SessionEvent::Response { payload });
        self.teardown();
    }

    fn transport_fault(&mut self) {
        self.phase = ConnectionPhase::Error;
        self.heartbeat_last = None;
        self.last_error = Some(TRANSPORT_ERROR_MESSAGE.to_owned());
        self.apply_step(StepId::Queue, &StepPatch::failed(TRANSPORT_ERROR_MESSAGE));
        self.emitter.emit(&SessionEvent::Error {
            message: TRANSPORT_ERROR_MESSAGE.to_owned(),
        });
    }

    /// Release transport resources and return to the resting phase. Safe to
    /// call when no transport exists.
    fn teardown(&mut self) {
        self.teardown_resources();
        self.phase = ConnectionPhase::Disconnected;
        self.pending_topic = None;
    }

    /// Release transport resources without touching the phase (used at the
    /// start of a connect, which has already moved to `Connecting`).
    fn teardown_resources(&mut self) {
        self.heartbeat_last = None;
        if let Some(mut channel) = self.channel.take() {
            // Best effort: a half-open transport may reject both.
            if let Err(e) = channel.leave() {
                tracing::debug!(error = %e, "channel leave failed during teardown");
            }
            if let Err(e) = channel.close() {
                tracing::debug!(error = %e, "transport close failed during teardown");
            }
        }
    }

    fn apply_step(&mut self, id: StepId, patch: &StepPatch) {
        let updated = steps::update(&self.steps, id, patch);
        let changed = updated.iter().find(|s| s.id == id).cloned();
        self.steps = updated;
        if let Some(step) = changed {
            self.emitter.emit(&SessionEvent::Step { step });
        }
    }
}
