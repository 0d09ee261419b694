pub mod context;
pub mod engine;
pub mod history;
pub mod loop_control;
pub mod state;

pub use engine::{AgentLoop, AgentSettings};
pub use state::{AgentState, AgentStatus};
