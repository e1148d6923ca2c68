//! Retrieval-and-answer core
//!
//! - Prompt assembly from ranked documents
//! - Completion service client
//! - Reasoning segment removal
//! - The orchestrator tying them to the embedder and vector index

mod completion;
mod orchestrator;
mod prompt;
mod reasoning;

pub use completion::{CompletionClient, CompletionService, MockCompletionService, SYSTEM_INSTRUCTION};
pub use orchestrator::{OrchestratorSettings, QueryOutcome, QueryResponse, RetrievalOrchestrator};
pub use prompt::{build_prompt, PROMPT_CLOSING, PROMPT_INTRO};
pub use reasoning::{strip_reasoning, REASONING_END_TAG};
