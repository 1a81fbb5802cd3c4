//! Session controller for the airelay real-time AI-response delivery
//! service.
//!
//! The [`SessionController`] is the integration surface: framework adapters
//! construct one with injected capabilities (time, transport, storage), feed
//! it transport callbacks, and subscribe to its typed events. The crate
//! contains no framework bindings and no real wire protocol; transport and
//! storage are traits the host implements.
//!
//! ```no_run
//! use airelay_client::{ConnectRequest, EventKind, SessionController};
//! use airelay_client::transport::test_utils::MockConnector;
//! use airelay_core::{MemoryKv, SessionConfig, env::SystemEnv};
//!
//! let mut session = SessionController::new(
//!     SystemEnv::new(),
//!     SessionConfig::default(),
//!     MockConnector::new(),
//!     MemoryKv::new(),
//! );
//! session.on(EventKind::Response, |event| {
//!     println!("{event:?}");
//! });
//! session.connect(&ConnectRequest::Token { credential: "h.c.s".to_owned() });
//! ```

pub mod assist;
pub mod emitter;
pub mod event;
pub mod session;
pub mod store;
pub mod transport;

pub use assist::{AssistBackend, AssistError, AssistGrant, HttpAssist};
pub use emitter::Subscription;
pub use event::{EventKind, SessionEvent};
pub use session::{ConnectRequest, ConnectionPhase, SessionController, SessionSnapshot};
pub use store::{PersistedRequest, SessionStore};
pub use transport::{ChannelHandle, Connector, TransportError, TransportEvent};
