//! # StepForge Core
//!
//! Domain types, traits, and error definitions for the StepForge
//! plan-and-execute engine. This crate has **no engine logic**. It defines
//! the collaborators the engine talks to:
//!
//! - [`Tool`] / [`ToolRegistry`]: named capabilities invoked by plan steps
//! - [`Responder`]: a language-model capability `(messages) -> text`,
//!   consumed by tools, the planner and the synthesizer
//! - [`EventBus`]: pub/sub instrumentation hooks for plan execution
//!
//! Every other crate depends inward on core.

pub mod error;
pub mod event;
pub mod message;
pub mod responder;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use responder::Responder;
pub use tool::{Tool, ToolDescriptor, ToolOutput, ToolRegistry};
