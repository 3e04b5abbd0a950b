//! Model and service adapters used by agents.
//!
//! [`openai`] talks to chat-completions endpoints (`OpenAI` or Azure
//! `OpenAI`) behind the [`traits::ModelAdapter`] interface, and
//! [`azure_search`] backs the `search_documents` tool with an Azure AI
//! Search index.

#![warn(missing_docs, clippy::pedantic)]

pub mod azure_search;
pub mod openai;
pub mod traits;

mod http_client;

pub use azure_search::{AzureSearchClient, AzureSearchConfig};
pub use openai::{OpenAiAdapter, OpenAiConfig};
pub use traits::{
    AdapterError, AdapterMetadata, AdapterResult, Completion, InferenceRequest, MessageRole,
    ModelAdapter, PromptMessage, ToolCall,
};
