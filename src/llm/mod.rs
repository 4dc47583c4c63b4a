//! Natural-language bridge to a chat-completion API.

pub mod assistant;
pub mod client;
pub mod prompts;

pub use assistant::{ChartSuggestion, ChartType, GeneratedSql, SqlAssistant, strip_code_fences};
pub use client::{CompletionClient, OpenAiCompletionClient};
