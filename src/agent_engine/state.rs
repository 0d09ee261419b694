use serde::{Deserialize, Serialize};

use crate::surface::SurfaceKind;

/// Lifecycle states of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Stopped,
    Running,
}

/// Snapshot returned by `GET /api/agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub state: AgentState,
    pub running: bool,
    pub surface: SurfaceKind,
    pub iterations: u64,
    pub last_error: Option<String>,
}
