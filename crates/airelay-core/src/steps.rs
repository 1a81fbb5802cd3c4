//! Workflow progress steps.
//!
//! The service surfaces server-side processing as an ordered set of named
//! stages. The collection starts from a fixed template on every connect
//! attempt; the session controller mutates it by id through the pure
//! transforms in this module and re-assigns its own copy. Insertion order is
//! display order.

use serde::Serialize;

/// Stable identifier for a workflow stage.
///
/// `Backend` is not part of the initial template; it is inserted on first
/// reference when the asynchronous callback workflow is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// Request accepted and queued by the service.
    Queue,
    /// Upstream model processing.
    Process,
    /// Waiting on a server-side callback before the terminal response.
    Backend,
    /// Response streaming back to the client.
    Receive,
    /// Workflow finished.
    Complete,
}

/// Status of a single workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Currently running.
    InProgress,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Error,
}

/// One workflow stage as surfaced to application code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    /// Stable stage identifier.
    pub id: StepId,
    /// Human-readable display name.
    pub label: String,
    /// Current status.
    pub status: StepStatus,
    /// Reported stage duration, when known.
    pub duration_ms: Option<u64>,
    /// Failure detail when `status` is [`StepStatus::Error`].
    pub error: Option<String>,
}

impl WorkflowStep {
    fn pending(id: StepId, label: &str) -> Self {
        Self { id, label: label.to_owned(), status: StepStatus::Pending, duration_ms: None, error: None }
    }
}

/// Partial update applied to a single step. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    /// New status.
    pub status: Option<StepStatus>,
    /// New display name.
    pub label: Option<String>,
    /// New duration.
    pub duration_ms: Option<u64>,
    /// New failure detail.
    pub error: Option<String>,
}

impl StepPatch {
    /// Patch that only sets the status.
    #[must_use]
    pub fn status(status: StepStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    /// Patch that sets the status and a reported duration.
    #[must_use]
    pub fn finished(status: StepStatus, duration_ms: u64) -> Self {
        Self { status: Some(status), duration_ms: Some(duration_ms), ..Self::default() }
    }

    /// Patch that marks a step failed with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: Some(StepStatus::Error), error: Some(message.into()), ..Self::default() }
    }
}

/// The fixed four-stage template, all pending, in display order.
#[must_use]
pub fn initial() -> Vec<WorkflowStep> {
    vec![
        WorkflowStep::pending(StepId::Queue, "Queued"),
        WorkflowStep::pending(StepId::Process, "Processing"),
        WorkflowStep::pending(StepId::Receive, "Receiving response"),
        WorkflowStep::pending(StepId::Complete, "Complete"),
    ]
}

/// Return a new list with the matching step's fields merged from `patch`.
///
/// Pure transform: the input list is never mutated, non-matching steps are
/// carried over unchanged, and an id with no matching step leaves the list
/// equal to its input.
#[must_use]
pub fn update(steps: &[WorkflowStep], id: StepId, patch: &StepPatch) -> Vec<WorkflowStep> {
    steps
        .iter()
        .map(|step| {
            if step.id == id {
                let mut updated = step.clone();
                if let Some(status) = patch.status {
                    updated.status = status;
                }
                if let Some(label) = &patch.label {
                    updated.label = label.clone();
                }
                if let Some(duration_ms) = patch.duration_ms {
                    updated.duration_ms = Some(duration_ms);
                }
                if let Some(error) = &patch.error {
                    updated.error = Some(error.clone());
                }
                updated
            } else {
                step.clone()
            }
        })
        .collect()
}

/// Ensure a `Backend` step exists, inserting it after `Process` on first
/// reference.
///
/// Returns the list unchanged when the step is already present. Display
/// order puts the callback stage between processing and receiving, which is
/// where it sits in the actual workflow.
#[must_use]
pub fn ensure_backend(steps: &[WorkflowStep], label: &str) -> Vec<WorkflowStep> {
    if steps.iter().any(|s| s.id == StepId::Backend) {
        return steps.to_vec();
    }

    let mut out = Vec::with_capacity(steps.len() + 1);
    for step in steps {
        out.push(step.clone());
        if step.id == StepId::Process {
            out.push(WorkflowStep::pending(StepId::Backend, label));
        }
    }
    out
}
