//! Workspace root. Exists to anchor workspace-wide tooling; all functionality
//! lives in the member crates under `crates/`.
