pub mod chat_orchestrator;
pub mod openai_types;
pub mod thought_filter;
pub mod tools_spec;

pub use chat_orchestrator::{ChatEvent, ChatOrchestrator, ChatTurn, ChatTurnRequest};
