//! Session lifecycle events.
//!
//! The controller surfaces its state transitions as a typed event union with
//! strong per-event tags. Listeners subscribe by [`EventKind`]; the payload
//! arrives as the matching [`SessionEvent`] variant.

use airelay_core::WorkflowStep;
use serde_json::Value;

/// Discrete lifecycle events emitted by the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transport open was requested.
    Connecting,

    /// The transport is open.
    Connected,

    /// The transport closed or was torn down.
    Disconnected {
        /// Close reason, when known ("manual" for explicit disconnects).
        reason: Option<String>,
    },

    /// A response payload arrived on the channel.
    Response {
        /// The raw payload, stored as received and never mutated.
        payload: Value,
    },

    /// A failure surfaced to application code.
    Error {
        /// Human-readable failure description.
        message: String,
    },

    /// One workflow step changed.
    Step {
        /// The step after the change.
        step: WorkflowStep,
    },

    /// The logical channel was joined.
    ChannelJoined,

    /// The channel join was rejected.
    ChannelError {
        /// Raw rejection reason from the transport.
        reason: String,
    },
}

/// Strong tag identifying each event variant, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Tag for [`SessionEvent::Connecting`].
    Connecting,
    /// Tag for [`SessionEvent::Connected`].
    Connected,
    /// Tag for [`SessionEvent::Disconnected`].
    Disconnected,
    /// Tag for [`SessionEvent::Response`].
    Response,
    /// Tag for [`SessionEvent::Error`].
    Error,
    /// Tag for [`SessionEvent::Step`].
    Step,
    /// Tag for [`SessionEvent::ChannelJoined`].
    ChannelJoined,
    /// Tag for [`SessionEvent::ChannelError`].
    ChannelError,
}

impl SessionEvent {
    /// The tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connecting => EventKind::Connecting,
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Response { .. } => EventKind::Response,
            Self::Error { .. } => EventKind::Error,
            Self::Step { .. } => EventKind::Step,
            Self::ChannelJoined => EventKind::ChannelJoined,
            Self::ChannelError { .. } => EventKind::ChannelError,
        }
    }
}
