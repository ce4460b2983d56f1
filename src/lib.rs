//! # Routa Core
//!
//! Routa is a multi-agent orchestration core that turns a single
//! natural-language request into verified code changes by running three
//! cooperating roles against external coding-agent subprocesses speaking a
//! JSON-RPC-style Agent Client Protocol (ACP):
//!
//! - **ROUTA** (Planner) turns a request into `@@@task` blocks.
//! - **CRAFTER** (Implementor) executes one task each.
//! - **GATE** (Verifier) checks CRAFTER output against each task's
//!   Acceptance Criteria.
//!
//! ## Architecture
//!
//! - [`store`] — pluggable Agent/Task/Conversation persistence contracts,
//!   with an in-memory reference implementation.
//! - [`events`] — publish/subscribe domain event bus with per-subscriber
//!   bounded queues.
//! - [`parser`] — the `@@@task` plan-text grammar and completion/verdict
//!   extractors.
//! - [`tools`] — the coordination tool surface agents call to delegate,
//!   report, and read/write workspace files.
//! - [`providers`] — the uniform provider interface, the ACP subprocess and
//!   tool-calling LLM backends, the capability router, and the resilient
//!   retry/circuit-breaker wrapper.
//! - [`coordinator`] — owns coordination state and role prompts.
//! - [`pipeline`] — the four Plan/Register/Execute/Verify stages.
//! - [`orchestrator`] — drives the pipeline through a bounded wave loop.
//!
//! Configuration loading, IDE/UI surfaces, HTTP/SSE transport shells, and
//! persistent storage backends are intentionally left to external
//! collaborators; see [`config`] for the typed records this crate accepts.

/// Typed configuration records accepted from an external caller.
pub mod config;
/// System-wide default values.
pub mod constants;
/// Owns coordination state, role lifecycle, and role prompts.
pub mod coordinator;
/// Error types and handling.
pub mod error;
/// Publish/subscribe domain event bus.
pub mod events;
/// Core data models: agents, tasks, messages, reports, events.
pub mod models;
/// Drives the pipeline through a bounded wave loop.
pub mod orchestrator;
/// `@@@task` plan-text grammar and completion/verdict extractors.
pub mod parser;
/// Pipeline stages: Planning, TaskRegistration, CrafterExecution, GateVerification.
pub mod pipeline;
/// Agent providers, capability router, and resilient wrapper.
pub mod providers;
/// Pluggable persistence contracts and an in-memory reference implementation.
pub mod store;
/// The coordination tool surface exposed to agents.
pub mod tools;
/// Path-escape guard for the workspace-sandboxed file tools.
pub mod validation;

pub use error::{Result, RoutaError};
