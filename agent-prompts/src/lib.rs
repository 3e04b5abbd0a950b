//! Prompt templates used to build stage and agent prompts.

#![warn(missing_docs, clippy::pedantic)]

pub mod template;

pub use template::{PromptTemplate, TemplateBuilder, TemplateError, TemplateResult};
