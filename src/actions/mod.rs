pub mod schema;
pub mod types;
pub mod vocabulary;

pub use types::{
    Action, ActionFamily, AgentResponse, MouseButton, PointerAction, ScrollDirection, TouchAction,
};
pub use vocabulary::ActionVocabulary;
