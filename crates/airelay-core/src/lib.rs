//! Core collaborators for the airelay real-time delivery client.
//!
//! This crate holds the pure, side-effect-free leaves of the client plus the
//! capability traits that decouple the session state machine from the host
//! environment:
//!
//! - [`credential`] - inspection of the compact three-part session credential
//! - [`steps`] - ordered workflow progress stages and their pure transforms
//! - [`outcome`] - classification of inbound response payloads
//! - [`config`] - session configuration with overlay-over-defaults semantics
//! - [`env`] - time capability (monotonic + wall clock) for deterministic tests
//! - [`kv`] - injected key-value storage capability
//!
//! The session controller itself lives in `airelay-client`.

pub mod config;
pub mod credential;
pub mod env;
pub mod kv;
pub mod outcome;
pub mod steps;

pub use config::SessionConfig;
pub use credential::{CredentialClaims, CredentialError};
pub use env::Environment;
pub use kv::{KvError, KvStore, MemoryKv};
pub use outcome::Outcome;
pub use steps::{StepId, StepPatch, StepStatus, WorkflowStep};
