//! Command handlers for the ragent CLI.

pub mod ask;
pub mod chat;
pub mod knowledge;
pub mod output;
pub mod prompts;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use knowledge::KnowledgeCommand;
pub use prompts::PromptsCommand;
