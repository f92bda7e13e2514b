//! LLM agent that answers chat requests by calling tool-server tools.

pub mod error;
pub mod model;
pub mod prompt;
pub mod provider;
pub mod tool_loop;
pub mod tool_registry;

pub use {
    error::{Error, Result},
    model::{ChatMessage, CompletionResponse, ToolCall},
    provider::{LlmProvider, OpenAiCompatProvider},
    tool_loop::{FALLBACK_REPLY, ToolLoopDecider},
    tool_registry::ToolSource,
};
