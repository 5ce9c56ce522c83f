//! Chat turn pipeline for Kaï.
//!
//! Turns a chat request into a stream of events: cached replay or a fresh
//! Gemini generation, written back to the response cache and session
//! memory, then delivered in small paced chunks.

pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod prompt;

pub use dispatcher::{StreamDispatcher, TurnStream};
pub use error::ChatError;
pub use gateway::{GeminiGateway, GenerationGateway};
pub use prompt::{build_prompt, chunk_text};
