//! Real-time transport capability.
//!
//! The wire protocol (framing, channel multiplexing, presence) belongs to a
//! pre-existing pub/sub channel library; this module only defines the seam
//! the session controller drives. A [`Connector`] requests a connection and
//! hands back a [`ChannelHandle`]; the host delivers the connection's
//! asynchronous callbacks to the controller as [`TransportEvent`]s.

use serde_json::Value;
use thiserror::Error;

/// Transport-level failures surfaced through the capability seam.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Opening the connection failed synchronously.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A channel operation (join/leave/push/close) failed.
    #[error("channel operation failed: {0}")]
    Channel(String),
}

/// Handle to one open (or opening) transport connection.
///
/// Every method must be safe to call on a connection that never finished
/// opening; teardown swallows the resulting errors.
pub trait ChannelHandle: Send {
    /// Request to join a topic. The grant or denial arrives later as a
    /// [`TransportEvent`].
    fn join(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Leave the joined topic.
    fn leave(&mut self) -> Result<(), TransportError>;

    /// Push a client message on the channel (e.g. a heartbeat).
    fn push(&mut self, event: &str, payload: &Value) -> Result<(), TransportError>;

    /// Close the underlying connection.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Capability for opening transport connections.
pub trait Connector: Send + Sync + 'static {
    /// Concrete handle type produced by this connector.
    type Handle: ChannelHandle;

    /// Request a connection to `url`, passing the credential as the
    /// authentication parameter.
    ///
    /// Returns as soon as the attempt is underway; the open/error outcome
    /// arrives later as a [`TransportEvent`].
    fn open(&self, url: &str, credential: &str) -> Result<Self::Handle, TransportError>;
}

/// Asynchronous callbacks from the transport, delivered to the controller by
/// the host.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection finished opening.
    Opened,

    /// The requested topic join was granted.
    JoinAccepted,

    /// The requested topic join was rejected.
    JoinRejected {
        /// Raw rejection reason from the service.
        reason: String,
    },

    /// A response payload arrived on the channel.
    Response(Value),

    /// An application-level error payload arrived on the channel. Does not
    /// imply the connection closed.
    WorkflowFailure(Value),

    /// The connection failed.
    Faulted {
        /// Transport-reported detail.
        message: String,
    },

    /// The connection closed.
    Closed {
        /// Close reason, when the transport reports one.
        reason: Option<String>,
    },
}

/// Fixed rejection reason for credentials lacking project access.
pub const REASON_UNAUTHORIZED: &str = "unauthorized_project_access";

/// Map a raw join-rejection reason onto the fixed set of human-readable
/// messages shown to callers.
pub fn classify_join_failure(reason: &str) -> String {
    match reason {
        REASON_UNAUTHORIZED => "Unauthorized project access".to_owned(),
        "invalid_channel_name" => "Invalid channel name format".to_owned(),
        "invalid_channel_id" => "Invalid channel identifier format".to_owned(),
        "" => "Channel join failed: unknown".to_owned(),
        other => format!("Channel join failed: {other}"),
    }
}

/// Test support: a recording connector and channel.
///
/// Public (not `cfg(test)`) so integration tests and downstream harnesses
/// can drive the controller without a real transport.
pub mod test_utils {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use serde_json::Value;

    use super::{ChannelHandle, Connector, TransportError};

    /// One recorded transport side effect.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockAction {
        /// `Connector::open` was called.
        Open {
            /// Requested address.
            url: String,
            /// Credential passed as the auth parameter.
            credential: String,
        },
        /// `ChannelHandle::join` was called.
        Join {
            /// Requested topic.
            topic: String,
        },
        /// `ChannelHandle::leave` was called.
        Leave,
        /// `ChannelHandle::push` was called.
        Push {
            /// Pushed event name.
            event: String,
        },
        /// `ChannelHandle::close` was called.
        Close,
    }

    /// Shared, cloneable log of recorded actions.
    #[derive(Debug, Clone, Default)]
    pub struct MockLog {
        inner: Arc<Mutex<Vec<MockAction>>>,
    }

    impl MockLog {
        /// Snapshot of all recorded actions, in order.
        #[allow(clippy::expect_used)]
        pub fn actions(&self) -> Vec<MockAction> {
            self.inner.lock().expect("mock log mutex poisoned").clone()
        }

        /// Count of `Open` actions.
        pub fn open_count(&self) -> usize {
            self.actions().iter().filter(|a| matches!(a, MockAction::Open { .. })).count()
        }

        /// Count of `Close` actions.
        pub fn close_count(&self) -> usize {
            self.actions().iter().filter(|a| matches!(a, MockAction::Close)).count()
        }

        /// Count of `Push` actions with the given event name.
        pub fn push_count(&self, event: &str) -> usize {
            self.actions()
                .iter()
                .filter(|a| matches!(a, MockAction::Push { event: e } if e == event))
                .count()
        }

        #[allow(clippy::expect_used)]
        fn record(&self, action: MockAction) {
            self.inner.lock().expect("mock log mutex poisoned").push(action);
        }
    }

    /// Connector that records opens and hands out [`MockChannel`]s sharing
    /// its log.
    #[derive(Clone, Default)]
    pub struct MockConnector {
        log: MockLog,
        fail_open: Arc<AtomicBool>,
    }

    impl MockConnector {
        /// New connector with an empty log.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The shared action log.
        pub fn log(&self) -> MockLog {
            self.log.clone()
        }

        /// Make subsequent `open` calls fail synchronously.
        pub fn fail_next_opens(&self, fail: bool) {
            self.fail_open.store(fail, Ordering::SeqCst);
        }
    }

    impl Connector for MockConnector {
        type Handle = MockChannel;

        fn open(&self, url: &str, credential: &str) -> Result<MockChannel, TransportError> {
            self.log.record(MockAction::Open {
                url: url.to_owned(),
                credential: credential.to_owned(),
            });
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(TransportError::Connect("mock open refused".to_owned()));
            }
            Ok(MockChannel { log: self.log.clone() })
        }
    }

    /// Channel handle recording every operation into the shared log.
    pub struct MockChannel {
        log: MockLog,
    }

    impl ChannelHandle for MockChannel {
        fn join(&mut self, topic: &str) -> Result<(), TransportError> {
            self.log.record(MockAction::Join { topic: topic.to_owned() });
            Ok(())
        }

        fn leave(&mut self) -> Result<(), TransportError> {
            self.log.record(MockAction::Leave);
            Ok(())
        }

        fn push(&mut self, event: &str, _payload: &Value) -> Result<(), TransportError> {
            self.log.record(MockAction::Push { event: event.to_owned() });
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.log.record(MockAction::Close);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reasons_map_to_fixed_messages() {
        assert_eq!(classify_join_failure("unauthorized_project_access"), "Unauthorized project access");
        assert_eq!(classify_join_failure("invalid_channel_name"), "Invalid channel name format");
        assert_eq!(classify_join_failure("invalid_channel_id"), "Invalid channel identifier format");
    }

    #[test]
    fn unknown_reasons_use_generic_fallback() {
        assert_eq!(classify_join_failure("rate_limited"), "Channel join failed: rate_limited");
        assert_eq!(classify_join_failure(""), "Channel join failed: unknown");
    }
}
