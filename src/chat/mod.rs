pub mod context;
pub mod orchestrator;

pub use orchestrator::{ChatError, ChatOrchestrator, ChatSettings, ChatStats, Persisted, SendReport};
